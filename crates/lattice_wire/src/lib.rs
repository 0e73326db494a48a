#![allow(clippy::write_with_newline)]

//! IRC wire protocol message parser and generators, for implementing clients
//! rather than servers. Covers the RFC 1459/2812 subset the rest of the
//! workspace dispatches on; everything else is surfaced as [`Cmd::Other`] or
//! a generic numeric [`Cmd::Reply`].

use lattice_common::{ChanName, ChanNameRef};

pub mod ctcp;
pub mod dcc;
pub mod formatting;
pub mod isupport;
pub mod mode;

pub use ctcp::Ctcp;

/// Max length of an IRC message on the wire, terminator included (RFC 2812
/// section 2.3).
pub const MAX_LINE_LEN: usize = 512;

//
// Generation
//

pub fn pass(pass: &str) -> String {
    format!("PASS {}\r\n", pass)
}

pub fn nick(nick: &str) -> String {
    format!("NICK {}\r\n", nick)
}

pub fn user(username: &str, realname: &str) -> String {
    format!("USER {} 8 * :{}\r\n", username, realname)
}

pub fn ping(arg: &str) -> String {
    format!("PING {}\r\n", arg)
}

pub fn pong(arg: &str) -> String {
    format!("PONG {}\r\n", arg)
}

pub fn join<'a, I>(chans: I) -> String
where
    I: Iterator<Item = &'a ChanNameRef>,
{
    let chans = chans.map(|c| c.display()).collect::<Vec<_>>();
    format!("JOIN {}\r\n", chans.join(","))
}

pub fn part(chan: &ChanNameRef, reason: Option<&str>) -> String {
    match reason {
        None => format!("PART {}\r\n", chan.display()),
        Some(reason) => format!("PART {} :{}\r\n", chan.display(), reason),
    }
}

pub fn quit(reason: Option<&str>) -> String {
    match reason {
        None => "QUIT\r\n".to_string(),
        Some(reason) => format!("QUIT :{}\r\n", reason),
    }
}

pub fn privmsg(target: &str, msg: &str) -> String {
    format!("PRIVMSG {} :{}\r\n", target, msg)
}

pub fn notice(target: &str, msg: &str) -> String {
    format!("NOTICE {} :{}\r\n", target, msg)
}

pub fn action(target: &str, msg: &str) -> String {
    privmsg(target, &ctcp::encode("ACTION", msg))
}

/// CTCP replies go out as NOTICE per the CTCP spec.
pub fn ctcp_reply(target: &str, command: &str, payload: &str) -> String {
    notice(target, &ctcp::encode(command, payload))
}

pub fn away(msg: Option<&str>) -> String {
    match msg {
        None => "AWAY\r\n".to_string(),
        Some(msg) => format!("AWAY :{}\r\n", msg),
    }
}

pub fn topic(chan: &ChanNameRef, topic: Option<&str>) -> String {
    match topic {
        None => format!("TOPIC {}\r\n", chan.display()),
        Some(topic) => format!("TOPIC {} :{}\r\n", chan.display(), topic),
    }
}

pub fn mode(target: &str, modes: &str) -> String {
    if modes.is_empty() {
        format!("MODE {}\r\n", target)
    } else {
        format!("MODE {} {}\r\n", target, modes)
    }
}

pub fn kick(chan: &ChanNameRef, nick: &str, reason: Option<&str>) -> String {
    match reason {
        None => format!("KICK {} {}\r\n", chan.display(), nick),
        Some(reason) => format!("KICK {} {} :{}\r\n", chan.display(), nick, reason),
    }
}

pub fn whois(nick: &str) -> String {
    format!("WHOIS {}\r\n", nick)
}

pub fn names(chan: &ChanNameRef) -> String {
    format!("NAMES {}\r\n", chan.display())
}

pub fn invite(nick: &str, chan: &ChanNameRef) -> String {
    format!("INVITE {} {}\r\n", nick, chan.display())
}

/// Truncate a complete outbound line (already ending in "\r\n") to
/// [`MAX_LINE_LEN`] bytes, keeping the terminator and not splitting a UTF-8
/// sequence. Returns whether truncation happened so callers can warn.
pub fn enforce_line_len(line: &mut String) -> bool {
    if line.len() <= MAX_LINE_LEN {
        return false;
    }
    let mut cut = MAX_LINE_LEN - 2;
    while cut > 0 && !line.is_char_boundary(cut) {
        cut -= 1;
    }
    line.truncate(cut);
    line.push_str("\r\n");
    true
}

//
// Parsing
//

/// Sender of a message ("prefix" in the RFC). The prefix grammar cannot
/// always distinguish a server from a user (e.g. a bare "localhost"), hence
/// the `Ambiguous` variant; consumers decide per context.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Pfx {
    /// Sender is a server.
    Server(String),

    /// Sender is a user.
    User {
        nick: String,
        /// `user@host` part, empty when the prefix had no '!'/'@'.
        user: String,
    },

    /// Could be either.
    Ambiguous(String),
}

impl Pfx {
    /// The nick, treating the ambiguous case as a user.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Pfx::User { nick, .. } | Pfx::Ambiguous(nick) => Some(nick),
            Pfx::Server(_) => None,
        }
    }

    /// `nick!user@host` rendering for relay replay.
    pub fn display(&self) -> String {
        match self {
            Pfx::Server(s) | Pfx::Ambiguous(s) => s.clone(),
            Pfx::User { nick, user } if user.is_empty() => nick.clone(),
            Pfx::User { nick, user } => format!("{}!{}", nick, user),
        }
    }
}

// RFC 2812 section 2.3.1
fn parse_pfx(pfx: &str) -> Pfx {
    match pfx.find(['!', '@']) {
        Some(idx) => Pfx::User {
            nick: pfx[0..idx].to_owned(),
            user: pfx[idx + 1..].to_owned(),
        },
        None => {
            // Chars that nicks can have but servernames cannot
            if pfx.contains(['[', ']', '\\', '`', '_', '^', '{', '|', '}']) {
                Pfx::User {
                    nick: pfx.to_owned(),
                    user: String::new(),
                }
            } else if pfx.contains('.') {
                // Nicks can't have '.'
                Pfx::Server(pfx.to_owned())
            } else {
                Pfx::Ambiguous(pfx.to_owned())
            }
        }
    }
}

/// Target of a PRIVMSG/NOTICE. A target starting with a channel sigil is a
/// channel, anything else is a user; host masks are not modeled.
#[derive(Debug, PartialEq, Eq)]
pub enum MsgTarget {
    Chan(ChanName),
    User(String),
}

/// A parsed IRC message.
#[derive(Debug, PartialEq, Eq)]
pub struct Msg {
    pub pfx: Option<Pfx>,
    pub cmd: Cmd,
}

impl Msg {
    /// Render back to a wire line (no terminator). Used by the relay to
    /// replay traffic to remote clients; CTCP framing is restored.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(pfx) = &self.pfx {
            out.push(':');
            out.push_str(&pfx.display());
            out.push(' ');
        }
        match &self.cmd {
            Cmd::PRIVMSG {
                target,
                msg,
                is_notice,
                ctcp,
            } => {
                let verb = if *is_notice { "NOTICE" } else { "PRIVMSG" };
                let target = match target {
                    MsgTarget::Chan(chan) => chan.display(),
                    MsgTarget::User(nick) => nick,
                };
                let payload = match ctcp {
                    Some(ctcp) => ctcp::encode(ctcp.name(), msg),
                    None => msg.clone(),
                };
                out.push_str(&format!("{} {} :{}", verb, target, payload));
            }
            Cmd::JOIN { chan } => out.push_str(&format!("JOIN {}", chan.display())),
            Cmd::PART { chan, msg } => match msg {
                None => out.push_str(&format!("PART {}", chan.display())),
                Some(msg) => out.push_str(&format!("PART {} :{}", chan.display(), msg)),
            },
            Cmd::QUIT { msg, .. } => match msg {
                None => out.push_str("QUIT"),
                Some(msg) => out.push_str(&format!("QUIT :{}", msg)),
            },
            Cmd::NICK { nick, .. } => out.push_str(&format!("NICK :{}", nick)),
            Cmd::PING { server } => out.push_str(&format!("PING {}", server)),
            Cmd::PONG { server } => out.push_str(&format!("PONG {}", server)),
            Cmd::ERROR { msg } => out.push_str(&format!("ERROR :{}", msg)),
            Cmd::TOPIC { chan, topic } => {
                out.push_str(&format!("TOPIC {} :{}", chan.display(), topic))
            }
            Cmd::MODE { target, modes } => out.push_str(&format!("MODE {} {}", target, modes)),
            Cmd::KICK { chan, nick, msg } => match msg {
                None => out.push_str(&format!("KICK {} {}", chan.display(), nick)),
                Some(msg) => out.push_str(&format!("KICK {} {} :{}", chan.display(), nick, msg)),
            },
            Cmd::Other { cmd, params } => {
                out.push_str(cmd);
                render_params(&mut out, params);
            }
            Cmd::Reply { num, params } => {
                out.push_str(&format!("{:03}", num));
                render_params(&mut out, params);
            }
        }
        out
    }
}

fn render_params(out: &mut String, params: &[String]) {
    for (idx, param) in params.iter().enumerate() {
        out.push(' ');
        if idx == params.len() - 1 && (param.contains(' ') || param.is_empty()) {
            out.push(':');
        }
        out.push_str(param);
    }
}

/// An IRC command or reply.
#[derive(Debug, PartialEq, Eq)]
pub enum Cmd {
    /// PRIVMSG or NOTICE; check `is_notice`. When the payload was CTCP
    /// framed, `ctcp` holds the decoded command and `msg` the payload.
    PRIVMSG {
        target: MsgTarget,
        msg: String,
        is_notice: bool,
        ctcp: Option<Ctcp>,
    },

    JOIN {
        chan: ChanName,
    },

    PART {
        chan: ChanName,
        msg: Option<String>,
    },

    QUIT {
        msg: Option<String>,
        /// Channels the quitting user was in. Not part of the wire message;
        /// the session state fills this in for consumers.
        chans: Vec<ChanName>,
    },

    NICK {
        nick: String,
        /// Channels of the renaming user, filled in like `QUIT::chans`.
        chans: Vec<ChanName>,
    },

    PING {
        server: String,
    },

    PONG {
        server: String,
    },

    ERROR {
        msg: String,
    },

    TOPIC {
        chan: ChanName,
        topic: String,
    },

    MODE {
        target: String,
        /// Mode string plus its parameters, space separated, exactly as
        /// received. Decoded on demand by [`mode::parse_channel_modes`].
        modes: String,
    },

    KICK {
        chan: ChanName,
        nick: String,
        msg: Option<String>,
    },

    /// Something not listed above.
    Other {
        cmd: String,
        params: Vec<String>,
    },

    /// Numeric replies are kept generic; the dispatch table routes the few
    /// it knows and the rest fall through to a server-message display.
    Reply {
        num: u16,
        params: Vec<String>,
    },
}

enum MsgType<'a> {
    Cmd(&'a str),
    Num(u16),
}

fn is_chan_sigil(c: char) -> bool {
    c == '#' || c == '&' || c == '+' || c == '!'
}

/// Pop one complete line off an inbound byte buffer. Terminators are
/// "\r\n", a lone '\n', or a lone '\r' — but a '\r' that is the last byte of
/// the buffer is *not* a terminator yet, since the matching '\n' may still
/// be in flight. Empty lines are skipped. The buffer is left untouched when
/// no complete line is available.
pub fn next_line(buf: &mut Vec<u8>) -> Option<String> {
    loop {
        let mut end: Option<(usize, usize)> = None;
        for (idx, byte) in buf.iter().enumerate() {
            match byte {
                b'\n' => {
                    end = Some((idx, 1));
                    break;
                }
                b'\r' => match buf.get(idx + 1) {
                    None => return None,
                    Some(b'\n') => {
                        end = Some((idx, 2));
                        break;
                    }
                    Some(_) => {
                        end = Some((idx, 1));
                        break;
                    }
                },
                _ => {}
            }
        }
        let (idx, term_len) = end?;
        let line = String::from_utf8_lossy(&buf[0..idx]).to_string();
        buf.drain(0..idx + term_len);
        if !line.is_empty() {
            return Some(line);
        }
    }
}

/// Try to read one IRC message off the buffer. Consumes the message bytes
/// on success; leaves the buffer unchanged when no complete line is
/// available.
pub fn parse_irc_msg(buf: &mut Vec<u8>) -> Option<Result<Msg, String>> {
    next_line(buf).map(|line| parse_one_message(&line))
}

/// Parse a single line (no terminator).
pub fn parse_one_message(mut msg: &str) -> Result<Msg, String> {
    let pfx: Option<Pfx> = if let Some(stripped) = msg.strip_prefix(':') {
        let ws_idx = stripped
            .find(' ')
            .ok_or_else(|| format!("Can't find prefix terminator (' ') in msg: {:?}", msg))?;
        let pfx = &stripped[..ws_idx];
        msg = &stripped[ws_idx + 1..];
        Some(parse_pfx(pfx))
    } else {
        None
    };

    let msg_ty: MsgType = {
        let ws_idx = msg.find(' ').unwrap_or(msg.len());
        let cmd = &msg[..ws_idx];
        if cmd.is_empty() {
            return Err(format!("Empty command in msg: {:?}", msg));
        }
        msg = msg.get(ws_idx + 1..).unwrap_or("");
        match cmd.parse::<u16>() {
            Ok(num) => MsgType::Num(num),
            Err(_) => MsgType::Cmd(cmd),
        }
    };

    let params = parse_params(msg);
    let cmd = match msg_ty {
        MsgType::Cmd("PRIVMSG") | MsgType::Cmd("NOTICE") if params.len() == 2 => {
            let is_notice = matches!(msg_ty, MsgType::Cmd("NOTICE"));
            let target = params[0];
            let target = if target.starts_with(is_chan_sigil) {
                MsgTarget::Chan(ChanName::new(target.to_owned()))
            } else {
                MsgTarget::User(target.to_owned())
            };
            let (ctcp, payload) = ctcp::decode(params[1]);
            Cmd::PRIVMSG {
                target,
                msg: payload.to_owned(),
                is_notice,
                ctcp,
            }
        }
        MsgType::Cmd("JOIN") if params.len() == 1 => Cmd::JOIN {
            chan: ChanName::new(params[0].to_owned()),
        },
        MsgType::Cmd("PART") if params.len() == 1 || params.len() == 2 => Cmd::PART {
            chan: ChanName::new(params[0].to_owned()),
            msg: params.get(1).map(|s| (*s).to_owned()),
        },
        MsgType::Cmd("QUIT") if params.len() <= 1 => Cmd::QUIT {
            msg: params.first().map(|s| (*s).to_owned()),
            chans: Vec::new(),
        },
        MsgType::Cmd("NICK") if params.len() == 1 => Cmd::NICK {
            nick: params[0].to_owned(),
            chans: Vec::new(),
        },
        MsgType::Cmd("PING") if !params.is_empty() => Cmd::PING {
            server: params[0].to_owned(),
        },
        MsgType::Cmd("PONG") if !params.is_empty() => Cmd::PONG {
            // Some servers echo "PONG <server> <token>"; the token is what
            // the lag probe matches on.
            server: params[params.len() - 1].to_owned(),
        },
        MsgType::Cmd("ERROR") if params.len() == 1 => Cmd::ERROR {
            msg: params[0].to_owned(),
        },
        MsgType::Cmd("TOPIC") if params.len() == 2 => Cmd::TOPIC {
            chan: ChanName::new(params[0].to_owned()),
            topic: params[1].to_owned(),
        },
        MsgType::Cmd("MODE") if !params.is_empty() => Cmd::MODE {
            target: params[0].to_owned(),
            modes: params[1..].join(" "),
        },
        MsgType::Cmd("KICK") if params.len() == 2 || params.len() == 3 => Cmd::KICK {
            chan: ChanName::new(params[0].to_owned()),
            nick: params[1].to_owned(),
            msg: params.get(2).map(|s| (*s).to_owned()),
        },
        MsgType::Num(n) => Cmd::Reply {
            num: n,
            params: params.into_iter().map(str::to_owned).collect(),
        },
        MsgType::Cmd(cmd) => Cmd::Other {
            cmd: cmd.to_owned(),
            params: params.into_iter().map(str::to_owned).collect(),
        },
    };

    Ok(Msg { pfx, cmd })
}

fn parse_params(chrs: &str) -> Vec<&str> {
    // params = *14( SPACE middle ) [ SPACE ":" trailing ]
    let mut params = Vec::new();
    let mut char_indices = chrs.char_indices();

    while let Some((idx, c)) = char_indices.next() {
        if c == ':' {
            params.push(&chrs[idx + 1..]);
            break;
        }

        if params.len() == 14 {
            params.push(&chrs[idx..]);
            break;
        }

        if c == ' ' {
            continue;
        }

        loop {
            match char_indices.next() {
                Some((idx_, c)) => {
                    if c == ' ' {
                        params.push(&chrs[idx..idx_]);
                        break;
                    }
                }
                None => {
                    params.push(&chrs[idx..]);
                    break;
                }
            }
        }
    }

    params
}

/// Nicks in NAMES replies may carry membership prefixes (`~&@%+`); returns
/// the bare nick.
pub fn drop_nick_prefix(nick: &str) -> &str {
    static PREFIXES: [char; 5] = ['~', '&', '@', '%', '+'];

    match nick.chars().next() {
        Some(c) if PREFIXES.contains(&c) => &nick[1..],
        _ => nick,
    }
}

#[cfg(test)]
mod tests;
