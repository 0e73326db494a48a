//! ISUPPORT (numeric 005) hints.
//!
//! Only the tokens the mode parser needs are decoded (`PREFIX`,
//! `CHANMODES`); the raw token list is kept verbatim so the relay can
//! replay it to remote clients.

/// Which mode letters take parameters, per the server's declarations.
///
/// CHANMODES groups letters into four types: A (list modes, always a
/// parameter), B (always a parameter), C (parameter only when setting),
/// D (never a parameter). PREFIX letters (membership flags) always take a
/// nick parameter.
#[derive(Debug, Clone)]
pub struct ModeHints {
    prefix_modes: Vec<char>,
    type_a: Vec<char>,
    type_b: Vec<char>,
    type_c: Vec<char>,
}

impl Default for ModeHints {
    /// RFC 1459 defaults, plus the common non-standard membership letters.
    fn default() -> ModeHints {
        ModeHints {
            prefix_modes: vec!['q', 'a', 'o', 'h', 'v'],
            type_a: vec!['b'],
            type_b: vec!['k'],
            type_c: vec!['l'],
        }
    }
}

impl ModeHints {
    pub fn takes_param(&self, letter: char, on: bool) -> bool {
        if self.prefix_modes.contains(&letter)
            || self.type_a.contains(&letter)
            || self.type_b.contains(&letter)
        {
            return true;
        }
        if self.type_c.contains(&letter) {
            return on;
        }
        false
    }

    /// Apply a `PREFIX=(qaohv)~&@%+` token value.
    pub fn apply_prefix(&mut self, value: &str) {
        let Some(rest) = value.strip_prefix('(') else {
            return;
        };
        let Some(close) = rest.find(')') else {
            return;
        };
        self.prefix_modes = rest[..close].chars().collect();
    }

    /// Apply a `CHANMODES=A,B,C,D` token value.
    pub fn apply_chanmodes(&mut self, value: &str) {
        let mut groups = value.split(',');
        if let Some(a) = groups.next() {
            self.type_a = a.chars().collect();
        }
        if let Some(b) = groups.next() {
            self.type_b = b.chars().collect();
        }
        if let Some(c) = groups.next() {
            self.type_c = c.chars().collect();
        }
        // Type D letters never take a parameter; nothing to record.
    }
}

/// Accumulated ISUPPORT state for one server connection.
#[derive(Debug, Clone, Default)]
pub struct Isupport {
    /// Raw tokens in receive order, for replay (`CHANTYPES=#`, ...).
    pub tokens: Vec<String>,
    pub hints: ModeHints,
}

impl Isupport {
    /// Feed the parameters of one 005 reply (first param is our nick, last
    /// is the "are supported by this server" trailing).
    pub fn feed(&mut self, params: &[String]) {
        let middle = if params.len() >= 2 {
            &params[1..params.len() - 1]
        } else {
            return;
        };
        for token in middle {
            self.tokens.push(token.clone());
            if let Some((key, value)) = token.split_once('=') {
                match key {
                    "PREFIX" => self.hints.apply_prefix(value),
                    "CHANMODES" => self.hints.apply_chanmodes(value),
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_005() {
        let mut isupport = Isupport::default();
        let params: Vec<String> = [
            "nick",
            "CHANTYPES=#",
            "PREFIX=(ov)@+",
            "CHANMODES=eIbq,k,flj,CFLMPQScgimnprstz",
            "are supported by this server",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        isupport.feed(&params);

        assert_eq!(isupport.tokens.len(), 3);
        // PREFIX narrowed membership letters to o/v: 'h' no longer a nick flag.
        assert!(isupport.hints.takes_param('o', true));
        assert!(!isupport.hints.takes_param('h', true));
        // 'f' is type C: param only when setting.
        assert!(isupport.hints.takes_param('f', true));
        assert!(!isupport.hints.takes_param('f', false));
        // 'e' is a list mode.
        assert!(isupport.hints.takes_param('e', false));
    }
}
