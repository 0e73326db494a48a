//! Highlight detection: a message highlights when any configured pattern
//! matches a word of the message, whole-word and case-insensitive, with `*`
//! as a wildcard. Self-sent messages never highlight (enforced by callers,
//! which know the sender).

use crate::hooks::glob_match;

fn is_word_char(c: char) -> bool {
    // Nick characters count as word characters so "joe|afk" is one word.
    c.is_alphanumeric() || "[]\\`_^{|}-".contains(c)
}

/// Words of a message, in order.
fn words(msg: &str) -> impl Iterator<Item = &str> {
    msg.split(|c| !is_word_char(c)).filter(|w| !w.is_empty())
}

pub fn is_highlight(msg: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let lower_patterns: Vec<String> = patterns.iter().map(|p| p.to_ascii_lowercase()).collect();
    for word in words(msg) {
        let word = word.to_ascii_lowercase();
        for pattern in &lower_patterns {
            if glob_match(pattern, &word) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(ps: &[&str]) -> Vec<String> {
        ps.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn whole_word_only() {
        let p = pats(&["alice"]);
        assert!(is_highlight("hey alice, ping", &p));
        assert!(is_highlight("ALICE: hi", &p));
        assert!(!is_highlight("malice everywhere", &p));
        assert!(!is_highlight("alicela", &p));
    }

    #[test]
    fn wildcards() {
        let p = pats(&["alice*"]);
        assert!(is_highlight("alice_away here?", &p));
        assert!(is_highlight("alice here?", &p));
        assert!(!is_highlight("nothing to see", &p));
    }

    #[test]
    fn several_patterns() {
        let p = pats(&["alice", "deploy*"]);
        assert!(is_highlight("deployment starting", &p));
        assert!(!is_highlight("all quiet", &p));
    }

    #[test]
    fn no_patterns_no_highlight() {
        assert!(!is_highlight("anything", &[]));
    }
}
