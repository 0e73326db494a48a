//! The IRC face: presents the local state as if this process were an IRC
//! server. A standard IRC client connects, authenticates with PASS, and
//! sees the numerics + synthetic JOINs that reproduce its channel state;
//! afterwards traffic flows both ways with echo suppression.

use crate::{client_tag, ClientStatus, FaceCtx, FaceState, RelayConfig};

use lattice_core::{BufferKind, SignalData};
use lattice_wire as wire;

use log::{debug, info};

/// Host name used in synthetic numerics and prefixes.
const RELAY_HOST: &str = "lattice.relay.irc";

/// Commands mirrored to other clients when one client sends them.
const RELAY_COMMANDS: [&str; 2] = ["PRIVMSG", "NOTICE"];

/// Commands from the remote that are dropped instead of forwarded.
const IGNORE_COMMANDS: [&str; 2] = ["QUIT", "PONG"];

pub struct IrcFace {
    serv: String,
    password: String,
    pass_ok: bool,
    nick: Option<String>,
    user_received: bool,
    /// Registration sequence completed.
    connected: bool,
}

impl IrcFace {
    pub fn new(config: &RelayConfig) -> IrcFace {
        IrcFace {
            serv: config.serv.clone(),
            password: config.password.clone(),
            pass_ok: config.password.is_empty(),
            nick: None,
            user_received: false,
            connected: false,
        }
    }

    fn sendf(&self, ctx: &FaceCtx, line: String) {
        ctx.registry.send(ctx.id, format!("{}\r\n", line).into_bytes());
    }

    fn numeric(&self, ctx: &FaceCtx, num: u16, rest: String) {
        let nick = self.nick.as_deref().unwrap_or("*");
        self.sendf(ctx, format!(":{} {:03} {} {}", RELAY_HOST, num, nick, rest));
    }

    /// 001-005 + luser numerics + missing MOTD, then channel replay.
    fn send_registration(&mut self, ctx: &FaceCtx) {
        let upstream_nick = ctx.upstream.nick(&self.serv);
        if let Some(nick) = &self.nick {
            if *nick != upstream_nick {
                // Align the remote with the nick the server knows us by.
                self.sendf(ctx, format!(":{}!proxy NICK :{}", nick, upstream_nick));
            }
        }
        self.nick = Some(upstream_nick.clone());

        let version = env!("CARGO_PKG_VERSION");
        self.numeric(
            ctx,
            1,
            format!(
                ":Welcome to the Internet Relay Chat Network {}!{}@proxy",
                upstream_nick, upstream_nick
            ),
        );
        self.numeric(
            ctx,
            2,
            format!(":Your host is {}, running version {}", RELAY_HOST, version),
        );
        self.numeric(ctx, 3, ":This server was created on demand".to_owned());
        self.numeric(
            ctx,
            4,
            format!("{} {} oirw abiklmnopqstv", RELAY_HOST, version),
        );

        let isupport = ctx.upstream.isupport_tokens(&self.serv);
        if !isupport.is_empty() {
            // Chunk to keep each 005 under the line limit.
            for chunk in isupport.chunks(12) {
                self.numeric(
                    ctx,
                    5,
                    format!("{} :are supported by this server", chunk.join(" ")),
                );
            }
        }

        let clients = ctx.registry.active_count();
        self.numeric(
            ctx,
            251,
            format!(":There are {} users and 0 invisible on 1 servers", clients),
        );
        self.numeric(
            ctx,
            255,
            format!(":I have {} clients, 0 services and 0 servers", clients),
        );
        self.numeric(ctx, 422, ":MOTD File is missing".to_owned());

        self.send_join_channels(ctx);
        self.hook_signals(ctx);
    }

    /// Synthetic JOIN + 353/366 for every channel we are in upstream.
    fn send_join_channels(&self, ctx: &FaceCtx) {
        let nick = self.nick.clone().unwrap_or_default();
        for chan in ctx.upstream.joined_chans(&self.serv) {
            self.sendf(
                ctx,
                format!(":{}!{}@proxy JOIN :{}", nick, nick, chan.display()),
            );
            let nicks = ctx
                .upstream
                .chan_nicks_with_prefix(&self.serv, chan.as_ref());
            for chunk in nicks.chunks(20) {
                self.numeric(
                    ctx,
                    353,
                    format!("= {} :{}", chan.display(), chunk.join(" ")),
                );
            }
            self.numeric(
                ctx,
                366,
                format!("{} :End of /NAMES list.", chan.display()),
            );
        }
    }

    /// Subscribe to the mirrored server's traffic and to its disconnect.
    fn hook_signals(&self, ctx: &FaceCtx) {
        let owner = client_tag(ctx.id);
        let id = ctx.id;
        let serv = self.serv.clone();

        // Traffic from the upstream server: replay everything but
        // PING/PONG verbatim.
        let registry = ctx.registry.clone();
        ctx.core.hook_signal(
            Some(&owner),
            0,
            &format!("{},irc_in_*", serv),
            std::rc::Rc::new(move |_core, name, data| {
                let SignalData::Str(line) = data else {
                    return;
                };
                let command = name.rsplit("irc_in_").next().unwrap_or("");
                if command.eq_ignore_ascii_case("PING") || command.eq_ignore_ascii_case("PONG") {
                    return;
                }
                registry.send(id, format!("{}\r\n", line).into_bytes());
            }),
        );

        // Traffic we send upstream: mirror PRIVMSG/NOTICE to this client,
        // unless this client originated it (echo suppression).
        let registry = ctx.registry.clone();
        let own_tag = client_tag(id);
        let nick = self.nick.clone().unwrap_or_default();
        ctx.core.hook_signal(
            Some(&owner),
            0,
            &format!("{},irc_out_*", serv),
            std::rc::Rc::new(move |_core, name, data| {
                let SignalData::Str(payload) = data else {
                    return;
                };
                let Some((tags, line)) = payload.split_once(';') else {
                    return;
                };
                if tags.split(',').any(|t| t == own_tag) {
                    return;
                }
                let command = name.rsplit("irc_out_").next().unwrap_or("");
                if !RELAY_COMMANDS
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(command))
                {
                    return;
                }
                registry.send(
                    id,
                    format!(":{}!{}@proxy {}\r\n", nick, nick, line).into_bytes(),
                );
            }),
        );

        // Upstream connection lost: tell the remote and hang up.
        let registry = ctx.registry.clone();
        let serv_clone = serv.clone();
        ctx.core.hook_signal(
            Some(&owner),
            0,
            "irc_server_disconnected",
            std::rc::Rc::new(move |_core, _name, data| {
                if let SignalData::Str(lost) = data {
                    if *lost == serv_clone {
                        registry.send(
                            id,
                            format!(":{} ERROR :upstream server disconnected\r\n", RELAY_HOST)
                                .into_bytes(),
                        );
                        registry.set_status(id, ClientStatus::Disconnected);
                    }
                }
            }),
        );
    }

    fn handle_line(&mut self, ctx: &FaceCtx, line: &str) {
        debug!("relay irc client {}: recv {:?}", ctx.id, line);
        let Ok(msg) = wire::parse_one_message(line) else {
            return;
        };

        // Pre-registration: PASS, NICK, USER.
        if !self.connected {
            match &msg.cmd {
                wire::Cmd::Other { cmd, params } if cmd == "PASS" => {
                    match params.first() {
                        Some(pass) if *pass == self.password => {
                            self.pass_ok = true;
                        }
                        _ => {
                            info!("relay irc client {}: bad password", ctx.id);
                            self.sendf(
                                ctx,
                                format!(":{} ERROR :Password incorrect", RELAY_HOST),
                            );
                            ctx.registry.set_status(ctx.id, ClientStatus::AuthFailed);
                        }
                    }
                    return;
                }
                wire::Cmd::NICK { nick, .. } => {
                    self.nick = Some(nick.clone());
                }
                wire::Cmd::Other { cmd, params } if cmd == "USER" => {
                    if !params.is_empty() {
                        self.user_received = true;
                    }
                }
                _ => {}
            }

            if self.nick.is_some() && self.user_received {
                if !self.pass_ok {
                    info!("relay irc client {}: no valid PASS before USER", ctx.id);
                    self.sendf(ctx, format!(":{} ERROR :Password required", RELAY_HOST));
                    ctx.registry.set_status(ctx.id, ClientStatus::AuthFailed);
                    return;
                }
                if !ctx.upstream.is_registered(&self.serv) {
                    self.sendf(
                        ctx,
                        format!(
                            ":{} ERROR :no connection to server \"{}\"",
                            RELAY_HOST, self.serv
                        ),
                    );
                    self.sendf(ctx, format!(":{} ERROR :Closing Link", RELAY_HOST));
                    ctx.registry.set_status(ctx.id, ClientStatus::Disconnected);
                    return;
                }
                self.connected = true;
                ctx.registry.set_status(ctx.id, ClientStatus::Connected);
                self.send_registration(ctx);
            }
            return;
        }

        // Established session.
        match &msg.cmd {
            wire::Cmd::PING { server } => {
                self.sendf(
                    ctx,
                    format!(":{} PONG {} :{}", RELAY_HOST, RELAY_HOST, server),
                );
            }
            wire::Cmd::NICK { nick, .. } => {
                // Remote nick changes are cosmetic on this side.
                self.nick = Some(nick.clone());
            }
            wire::Cmd::PRIVMSG {
                target,
                msg: text,
                is_notice,
                ctcp,
            } => {
                // CTCP payloads (ACTION and friends) keep their framing on
                // the way through the input engine.
                let routed = match ctcp {
                    Some(ctcp) => wire::ctcp::encode(ctcp.name(), text),
                    None => text.clone(),
                };
                self.route_message(ctx, target, &routed, *is_notice);
            }
            wire::Cmd::QUIT { .. } | wire::Cmd::PONG { .. } => {
                // Must not reach the upstream server.
            }
            _ => {
                if let wire::Cmd::Other { cmd, .. } = &msg.cmd {
                    if IGNORE_COMMANDS.iter().any(|c| c.eq_ignore_ascii_case(cmd)) {
                        return;
                    }
                }
                // Everything else goes upstream raw.
                ctx.upstream.send_raw(&self.serv, &msg.render());
            }
        }
    }

    /// Route a remote PRIVMSG/NOTICE into the local input engine so it is
    /// sent, displayed and mirrored with this client's origin tag.
    fn route_message(&self, ctx: &FaceCtx, target: &wire::MsgTarget, text: &str, is_notice: bool) {
        let origin = Some(ctx.id);
        let target_str = match target {
            wire::MsgTarget::Chan(chan) => chan.display().to_owned(),
            wire::MsgTarget::User(nick) => nick.clone(),
        };

        if is_notice {
            if let Some(serv_buf) = ctx.core.find_buffer("irc", &self.serv) {
                ctx.core.input(
                    serv_buf,
                    &format!("/notice {} {}", target_str, text),
                    origin,
                );
            } else {
                ctx.upstream
                    .send_raw(&self.serv, &format!("NOTICE {} :{}", target_str, text));
            }
            return;
        }

        let buf_name = format!("{}/{}", self.serv, target_str);
        match ctx.core.find_buffer("irc", &buf_name) {
            Some(buffer) => {
                ctx.core.input(buffer, text, origin);
            }
            None if matches!(target, wire::MsgTarget::User(_)) => {
                // No private buffer yet: open the conversation locally.
                if let Some(serv_buf) = ctx.core.find_buffer("irc", &self.serv) {
                    ctx.core
                        .input(serv_buf, &format!("/msg {} {}", target_str, text), origin);
                } else {
                    ctx.upstream
                        .send_raw(&self.serv, &format!("PRIVMSG {} :{}", target_str, text));
                }
            }
            None => {
                // Channel we don't have a buffer for; pass through.
                ctx.upstream
                    .send_raw(&self.serv, &format!("PRIVMSG {} :{}", target_str, text));
            }
        }
    }
}

impl FaceState for IrcFace {
    fn on_data(&mut self, ctx: &FaceCtx, buf: &mut Vec<u8>) {
        while let Some(line) = wire::next_line(buf) {
            self.handle_line(ctx, &line);
            if ctx
                .registry
                .status(ctx.id)
                .map(ClientStatus::is_terminal)
                .unwrap_or(true)
            {
                return;
            }
        }
    }

    fn on_close(&mut self, _ctx: &FaceCtx) {}
}

/// The relay surfaces its clients on a `Free` buffer; opening it is the
/// launcher's call, this helper just names it consistently.
pub fn clients_buffer(core: &lattice_core::Core) -> Option<lattice_common::BufferId> {
    match core.find_buffer("relay", "clients") {
        Some(id) => Some(id),
        None => core.buffer_new("relay", "clients", BufferKind::Free),
    }
}
