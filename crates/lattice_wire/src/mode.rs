//! Channel mode string parsing.
//!
//! A MODE line like `-o+lk bob 50 sekrit` is scanned right to left so each
//! flag letter can claim the trailing parameter it needs; the sign of a
//! letter is the nearest '+'/'-' to its left, defaulting to '+'. Which
//! letters take a parameter comes from the server's ISUPPORT hints
//! (`PREFIX`/`CHANMODES`); without hints a conservative RFC 1459 default is
//! used.

use crate::isupport::ModeHints;

/// Membership flags a nick can hold on a channel. `Owner` and `Admin` are
/// the non-standard `q`/`a` letters some servers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NickFlag {
    Owner,
    Admin,
    Op,
    HalfOp,
    Voice,
}

impl NickFlag {
    pub fn from_letter(c: char) -> Option<NickFlag> {
        match c {
            'q' => Some(NickFlag::Owner),
            'a' => Some(NickFlag::Admin),
            'o' => Some(NickFlag::Op),
            'h' => Some(NickFlag::HalfOp),
            'v' => Some(NickFlag::Voice),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            NickFlag::Owner => 'q',
            NickFlag::Admin => 'a',
            NickFlag::Op => 'o',
            NickFlag::HalfOp => 'h',
            NickFlag::Voice => 'v',
        }
    }

    /// NAMES-style membership prefix character.
    pub fn prefix_char(&self) -> char {
        match self {
            NickFlag::Owner => '~',
            NickFlag::Admin => '&',
            NickFlag::Op => '@',
            NickFlag::HalfOp => '%',
            NickFlag::Voice => '+',
        }
    }
}

/// One decoded mode change, in application order.
#[derive(Debug, PartialEq, Eq)]
pub enum ModeChange {
    /// `+o nick` and friends.
    NickFlag {
        flag: NickFlag,
        on: bool,
        nick: String,
    },
    /// `+k key` / `-k [key]`.
    Key { key: Option<String> },
    /// `+l 50` / `-l`.
    Limit { limit: Option<u32> },
    /// Any other letter. `param` is present only when the hints say the
    /// letter takes one in this direction.
    Other {
        letter: char,
        on: bool,
        param: Option<String>,
    },
}

/// Find the sign for the letter at `pos` by scanning left. Default '+'.
fn sign_at(modes: &[char], pos: usize) -> bool {
    for c in modes[..pos].iter().rev() {
        match c {
            '+' => return true,
            '-' => return false,
            _ => {}
        }
    }
    true
}

/// Parse a full mode argument string (`modes [params...]`) into changes.
/// Unknown letters are accepted silently; letters that want a parameter the
/// argument list cannot supply are decoded without one.
pub fn parse_channel_modes(modes_and_args: &str, hints: &ModeHints) -> Vec<ModeChange> {
    let mut words = modes_and_args.split_whitespace();
    let modes: Vec<char> = match words.next() {
        Some(m) => m.chars().collect(),
        None => return Vec::new(),
    };
    let mut args: Vec<&str> = words.collect();

    let mut changes = Vec::new();

    // Right to left: the last parameter-taking letter owns the last arg.
    for pos in (0..modes.len()).rev() {
        let letter = modes[pos];
        if matches!(letter, '+' | '-' | ':' | ' ') {
            continue;
        }
        let on = sign_at(&modes, pos);
        let param = if hints.takes_param(letter, on) {
            args.pop().map(str::to_owned)
        } else {
            None
        };

        let change = match letter {
            _ if NickFlag::from_letter(letter).is_some() && param.is_some() => {
                ModeChange::NickFlag {
                    flag: NickFlag::from_letter(letter).unwrap(),
                    on,
                    nick: param.unwrap(),
                }
            }
            'k' => ModeChange::Key {
                key: if on { param } else { None },
            },
            'l' => ModeChange::Limit {
                limit: if on {
                    param.and_then(|p| p.parse().ok())
                } else {
                    None
                },
            },
            _ => ModeChange::Other { letter, on, param },
        };
        changes.push(change);
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Vec<ModeChange> {
        parse_channel_modes(s, &ModeHints::default())
    }

    #[test]
    fn op_with_param() {
        assert_eq!(
            parse("+o bob"),
            vec![ModeChange::NickFlag {
                flag: NickFlag::Op,
                on: true,
                nick: "bob".to_owned(),
            }]
        );
    }

    #[test]
    fn mixed_signs() {
        // -o+v bob bob: 'v' (rightmost) claims the last arg.
        let changes = parse("-o+v bob bob");
        assert_eq!(
            changes,
            vec![
                ModeChange::NickFlag {
                    flag: NickFlag::Voice,
                    on: true,
                    nick: "bob".to_owned(),
                },
                ModeChange::NickFlag {
                    flag: NickFlag::Op,
                    on: false,
                    nick: "bob".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn key_and_limit() {
        assert_eq!(
            parse("+lk 50 sekrit"),
            vec![
                ModeChange::Key {
                    key: Some("sekrit".to_owned()),
                },
                ModeChange::Limit { limit: Some(50) },
            ]
        );
        assert_eq!(parse("-l"), vec![ModeChange::Limit { limit: None }]);
        assert_eq!(parse("-k oldkey"), vec![ModeChange::Key { key: None }]);
    }

    #[test]
    fn ban_mask_claims_param() {
        assert_eq!(
            parse("+b *!*@spam.example"),
            vec![ModeChange::Other {
                letter: 'b',
                on: true,
                param: Some("*!*@spam.example".to_owned()),
            }]
        );
    }

    #[test]
    fn unknown_letter_no_param() {
        // 'n' is a type-D mode: no parameter consumed.
        assert_eq!(
            parse("+nt"),
            vec![
                ModeChange::Other {
                    letter: 't',
                    on: true,
                    param: None,
                },
                ModeChange::Other {
                    letter: 'n',
                    on: true,
                    param: None,
                },
            ]
        );
    }

    #[test]
    fn default_sign_is_plus() {
        assert_eq!(
            parse("v carol"),
            vec![ModeChange::NickFlag {
                flag: NickFlag::Voice,
                on: true,
                nick: "carol".to_owned(),
            }]
        );
    }

    #[test]
    fn custom_hints() {
        // A server declaring 'j' as a type-C mode (param only when set).
        let mut hints = ModeHints::default();
        hints.apply_chanmodes("eIbq,k,flj,cgimnpst");
        let changes = parse_channel_modes("+j 5:10", &hints);
        assert_eq!(
            changes,
            vec![ModeChange::Other {
                letter: 'j',
                on: true,
                param: Some("5:10".to_owned()),
            }]
        );
        let changes = parse_channel_modes("-j", &hints);
        assert_eq!(
            changes,
            vec![ModeChange::Other {
                letter: 'j',
                on: false,
                param: None,
            }]
        );
    }
}
