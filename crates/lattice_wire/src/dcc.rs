//! DCC advertisement codec.
//!
//! DCC offers travel inside CTCP `DCC` payloads:
//!
//! ```text
//! DCC SEND <filename> <addr> <port> [<size>]
//! DCC CHAT chat <addr> <port>
//! DCC RESUME <filename> <port> <offset>
//! DCC ACCEPT <filename> <port> <offset>
//! ```
//!
//! `<addr>` is an IPv4 address as a decimal 32-bit unsigned integer
//! (network byte order reinterpreted as a host integer). Filenames with
//! spaces arrive quoted.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DccParseError {
    #[error("unknown DCC type {0:?}")]
    UnknownType(String),
    #[error("malformed DCC offer: {0}")]
    Malformed(&'static str),
    #[error("bad number in DCC offer")]
    BadNumber(#[from] ParseIntError),
}

/// A decoded DCC offer or control message.
#[derive(Debug, PartialEq, Eq)]
pub enum DccCmd {
    Send {
        filename: String,
        addr: SocketAddr,
        /// Missing with obsolete clients that don't send a size.
        size: Option<u64>,
    },
    Chat {
        addr: SocketAddr,
    },
    Resume {
        filename: String,
        port: u16,
        offset: u64,
    },
    Accept {
        filename: String,
        port: u16,
        offset: u64,
    },
}

fn decode_addr(addr: u32, port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::from(addr)), port)
}

fn encode_addr(addr: &SocketAddr) -> u32 {
    match addr.ip() {
        IpAddr::V4(v4) => u32::from(v4),
        // DCC predates IPv6; v6 offers are not representable in this form.
        IpAddr::V6(_) => 0,
    }
}

fn unquote(name: &str) -> &str {
    name.trim_start_matches('"').trim_end_matches('"')
}

/// Split a DCC argument list into (filename, numeric tail), handling quoted
/// filenames containing spaces.
fn split_filename(args: &str) -> (String, Vec<&str>) {
    if let Some(rest) = args.strip_prefix('"') {
        if let Some(close) = rest.find('"') {
            let filename = rest[..close].to_owned();
            let tail = rest[close + 1..].split_whitespace().collect();
            return (filename, tail);
        }
    }
    let mut words = args.split_whitespace();
    let filename = words.next().unwrap_or("").to_owned();
    (unquote(&filename).to_owned(), words.collect())
}

/// Parse the payload of a CTCP `DCC` message.
pub fn parse(payload: &str) -> Result<DccCmd, DccParseError> {
    let (kind, rest) = payload
        .split_once(' ')
        .ok_or(DccParseError::Malformed("missing arguments"))?;

    match kind.to_ascii_uppercase().as_str() {
        "SEND" => {
            let (filename, tail) = split_filename(rest);
            if filename.is_empty() || tail.len() < 2 {
                return Err(DccParseError::Malformed("SEND needs filename, addr, port"));
            }
            let addr: u32 = tail[0].parse()?;
            let port: u16 = tail[1].parse()?;
            let size = match tail.get(2) {
                Some(s) => Some(s.parse::<u64>()?),
                None => None,
            };
            Ok(DccCmd::Send {
                filename,
                addr: decode_addr(addr, port),
                size,
            })
        }
        "CHAT" => {
            // "DCC CHAT chat <addr> <port>"
            let words: Vec<&str> = rest.split_whitespace().collect();
            if words.len() < 3 {
                return Err(DccParseError::Malformed("CHAT needs addr and port"));
            }
            let addr: u32 = words[1].parse()?;
            let port: u16 = words[2].parse()?;
            Ok(DccCmd::Chat {
                addr: decode_addr(addr, port),
            })
        }
        "RESUME" | "ACCEPT" => {
            let (filename, tail) = split_filename(rest);
            if filename.is_empty() || tail.len() < 2 {
                return Err(DccParseError::Malformed("need filename, port, offset"));
            }
            let port: u16 = tail[0].parse()?;
            let offset: u64 = tail[1].parse()?;
            if kind.eq_ignore_ascii_case("RESUME") {
                Ok(DccCmd::Resume {
                    filename,
                    port,
                    offset,
                })
            } else {
                Ok(DccCmd::Accept {
                    filename,
                    port,
                    offset,
                })
            }
        }
        other => Err(DccParseError::UnknownType(other.to_owned())),
    }
}

fn quote_if_needed(filename: &str) -> String {
    if filename.contains(' ') {
        format!("\"{}\"", filename)
    } else {
        filename.to_owned()
    }
}

/// Payload of a CTCP `DCC` message advertising a SEND (the caller frames
/// it with `ctcp::encode("DCC", ..)`).
pub fn send_offer(filename: &str, addr: &SocketAddr, size: u64) -> String {
    format!(
        "SEND {} {} {} {}",
        quote_if_needed(filename),
        encode_addr(addr),
        addr.port(),
        size
    )
}

/// Payload advertising a CHAT.
pub fn chat_offer(addr: &SocketAddr) -> String {
    format!("CHAT chat {} {}", encode_addr(addr), addr.port())
}

/// Payload asking the sender to resume a partial file.
pub fn resume(filename: &str, port: u16, offset: u64) -> String {
    format!("RESUME {} {} {}", quote_if_needed(filename), port, offset)
}

/// Payload confirming a resume request.
pub fn accept(filename: &str, port: u16, offset: u64) -> String {
    format!("ACCEPT {} {} {}", quote_if_needed(filename), port, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_send() {
        let cmd = parse("SEND results.txt.zip 2907707975 3078 24999").unwrap();
        assert_eq!(
            cmd,
            DccCmd::Send {
                filename: "results.txt.zip".to_owned(),
                addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(173, 80, 26, 71)), 3078),
                size: Some(24999),
            }
        );
    }

    #[test]
    fn parse_send_quoted_filename() {
        let cmd = parse("SEND \"two words.txt\" 2907707975 3078 100").unwrap();
        match cmd {
            DccCmd::Send { filename, size, .. } => {
                assert_eq!(filename, "two words.txt");
                assert_eq!(size, Some(100));
            }
            other => panic!("expected SEND, got {:?}", other),
        }
    }

    #[test]
    fn parse_send_no_size() {
        // Obsolete clients omit the size.
        let cmd = parse("SEND foo 16909060 5000").unwrap();
        match cmd {
            DccCmd::Send { size, addr, .. } => {
                assert_eq!(size, None);
                assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
            }
            other => panic!("expected SEND, got {:?}", other),
        }
    }

    #[test]
    fn parse_chat() {
        let cmd = parse("CHAT chat 2130706433 7000").unwrap();
        assert_eq!(
            cmd,
            DccCmd::Chat {
                addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 7000),
            }
        );
    }

    #[test]
    fn resume_round_trip() {
        let payload = resume("foo", 3078, 400);
        assert_eq!(payload, "RESUME foo 3078 400");
        assert_eq!(
            parse(&payload).unwrap(),
            DccCmd::Resume {
                filename: "foo".to_owned(),
                port: 3078,
                offset: 400,
            }
        );
    }

    #[test]
    fn offer_round_trip() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 4242);
        let payload = send_offer("foo", &addr, 1000);
        match parse(&payload).unwrap() {
            DccCmd::Send {
                filename,
                addr: parsed,
                size,
            } => {
                assert_eq!(filename, "foo");
                assert_eq!(parsed, addr);
                assert_eq!(size, Some(1000));
            }
            other => panic!("expected SEND, got {:?}", other),
        }
    }

    #[test]
    fn reject_garbage() {
        assert!(parse("FLING foo 1 2").is_err());
        assert!(parse("SEND").is_err());
        assert!(parse("SEND foo notanumber 1").is_err());
    }
}
