//! CTCP framing (https://defs.ircdocs.horse/defs/ctcp.html). One codec used
//! by both the send and receive paths: PRIVMSG/NOTICE payloads framed by
//! 0x01 bytes carry a command word and an optional payload.

const DELIM: char = '\x01';

/// A decoded CTCP command.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Ctcp {
    Version,
    Action,
    Ping,
    Dcc,
    Other(String),
}

impl Ctcp {
    fn parse(s: &str) -> Ctcp {
        match s {
            "VERSION" => Ctcp::Version,
            "ACTION" => Ctcp::Action,
            "PING" => Ctcp::Ping,
            "DCC" => Ctcp::Dcc,
            _ => Ctcp::Other(s.to_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Ctcp::Version => "VERSION",
            Ctcp::Action => "ACTION",
            Ctcp::Ping => "PING",
            Ctcp::Dcc => "DCC",
            Ctcp::Other(s) => s,
        }
    }
}

/// Frame a CTCP command and payload for embedding in a PRIVMSG/NOTICE.
pub fn encode(command: &str, payload: &str) -> String {
    if payload.is_empty() {
        format!("{}{}{}", DELIM, command, DELIM)
    } else {
        format!("{}{} {}{}", DELIM, command, payload, DELIM)
    }
}

/// Split a PRIVMSG/NOTICE payload into an optional CTCP command and the
/// remaining payload. Parsers accept a missing closing delimiter (some
/// clients split ACTION messages badly), so `"\x01ACTION foo"` decodes the
/// same as `"\x01ACTION foo\x01"`. Non-CTCP payloads come back unchanged
/// with `None`.
pub fn decode(msg: &str) -> (Option<Ctcp>, &str) {
    let Some(mut rest) = msg.strip_prefix(DELIM) else {
        return (None, msg);
    };

    for (byte_idx, byte) in rest.as_bytes().iter().enumerate() {
        if *byte == 0x01 {
            let ctcp = Ctcp::parse(&rest[..byte_idx]);
            return (Some(ctcp), &rest[byte_idx + 1..]);
        } else if *byte == b' ' {
            let ctcp = Ctcp::parse(&rest[..byte_idx]);
            rest = &rest[byte_idx + 1..];
            if let Some(stripped) = rest.strip_suffix(DELIM) {
                rest = stripped;
            }
            return (Some(ctcp), rest);
        }
    }

    // Delimited command with no payload and no closing delimiter.
    (Some(Ctcp::parse(rest)), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let framed = encode("PING", "12345");
        assert_eq!(framed, "\x01PING 12345\x01");
        assert_eq!(decode(&framed), (Some(Ctcp::Ping), "12345"));

        let framed = encode("VERSION", "");
        assert_eq!(decode(&framed), (Some(Ctcp::Version), ""));
    }

    #[test]
    fn decode_missing_close() {
        assert_eq!(
            decode("\x01ACTION waves"),
            (Some(Ctcp::Action), "waves")
        );
        assert_eq!(decode("\x01VERSION"), (Some(Ctcp::Version), ""));
    }

    #[test]
    fn decode_plain() {
        assert_eq!(decode("hello"), (None, "hello"));
    }

    #[test]
    fn decode_unknown() {
        assert_eq!(
            decode("\x01CLIENTINFO\x01"),
            (Some(Ctcp::Other("CLIENTINFO".to_owned())), "")
        );
    }
}
