#![allow(clippy::cognitive_complexity)]

//! Session event handling: turns [`lattice_client::Event`]s into buffer
//! lines, chat-log entries and core signals (`<serv>,irc_in_<CMD>` for the
//! relay, `nicklist_changed` for sync subscribers).

use crate::buffers::{self, Printer};
use crate::App;

use lattice_common::MsgTarget;
use lattice_core::SignalData;
use lattice_wire as wire;
use lattice_wire::ctcp::Ctcp;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use log::debug;

/// The slice of a session the receive path needs; real sessions implement
/// it, tests substitute a canned one.
pub(crate) trait SessionHandle {
    fn serv_name(&self) -> &str;
    fn get_nick(&self) -> String;
    fn is_registered(&self) -> bool;
    fn send_notice(&mut self, target: &str, msg: &str);
}

impl SessionHandle for lattice_client::Client {
    fn serv_name(&self) -> &str {
        self.name()
    }

    fn get_nick(&self) -> String {
        self.get_nick()
    }

    fn is_registered(&self) -> bool {
        self.is_registered()
    }

    fn send_notice(&mut self, target: &str, msg: &str) {
        self.notice(target, msg);
    }
}

pub(crate) async fn task(
    rcv_ev: mpsc::Receiver<lattice_client::Event>,
    app: App,
    client: Box<dyn SessionHandle>,
) {
    let mut rcv_ev = ReceiverStream::new(rcv_ev);
    let mut client = client;
    while let Some(ev) = rcv_ev.next().await {
        handle_conn_ev(&app, &mut *client, ev);
    }
}

fn handle_conn_ev(app: &App, client: &mut dyn SessionHandle, ev: lattice_client::Event) {
    use lattice_client::Event::*;
    let printer = Printer::new(app);
    let serv = client.serv_name().to_owned();
    match ev {
        StateChange(state) => {
            use lattice_client::ConnState;
            match state {
                ConnState::Resolving => {
                    printer.add_client_msg(
                        "Resolving host...",
                        &MsgTarget::Server { serv: &serv },
                    );
                }
                ConnState::ReconnectWait => {
                    printer.add_client_msg(
                        "Will try to reconnect shortly...",
                        &MsgTarget::AllServBuffers { serv: &serv },
                    );
                }
                ConnState::Disconnected => {
                    app.core
                        .emit_signal("irc_server_disconnected", SignalData::Str(serv.clone()));
                }
                _ => {}
            }
        }
        Connecting(addr) => {
            printer.add_client_msg(
                &format!("Connecting to {}", addr),
                &MsgTarget::Server { serv: &serv },
            );
        }
        Registered => {
            printer.add_client_msg("Connected.", &MsgTarget::AllServBuffers { serv: &serv });
        }
        Disconnected { reason } => {
            printer.add_err_msg(
                &format!("Disconnected: {}", reason),
                OffsetDateTime::now_utc(),
                &MsgTarget::AllServBuffers { serv: &serv },
            );
        }
        CantResolveAddr => {
            printer.add_err_msg(
                "Can't resolve address",
                OffsetDateTime::now_utc(),
                &MsgTarget::Server { serv: &serv },
            );
        }
        AllNicksInUse => {
            printer.add_err_msg(
                "All nicks in use",
                OffsetDateTime::now_utc(),
                &MsgTarget::Server { serv: &serv },
            );
        }
        NickChange { new_nick } => {
            printer.add_client_msg(
                &format!("Your nick is now {}", new_nick),
                &MsgTarget::Server { serv: &serv },
            );
        }
        Lag { ms } => {
            debug!("{}: lag {} ms", serv, ms);
        }
        WireError(err) => {
            printer.add_err_msg(
                &format!("Protocol error: {}", err),
                OffsetDateTime::now_utc(),
                &MsgTarget::Server { serv: &serv },
            );
        }
        Msg(msg) => {
            handle_irc_msg(app, client, &serv, msg);
        }
        Dcc(ev) => {
            handle_dcc_ev(app, &serv, ev);
        }
    }
}

/// Verb used in the relay mirror signal name.
fn signal_verb(cmd: &wire::Cmd) -> String {
    use wire::Cmd::*;
    match cmd {
        PRIVMSG { is_notice: true, .. } => "NOTICE".to_owned(),
        PRIVMSG { .. } => "PRIVMSG".to_owned(),
        JOIN { .. } => "JOIN".to_owned(),
        PART { .. } => "PART".to_owned(),
        QUIT { .. } => "QUIT".to_owned(),
        NICK { .. } => "NICK".to_owned(),
        PING { .. } => "PING".to_owned(),
        PONG { .. } => "PONG".to_owned(),
        ERROR { .. } => "ERROR".to_owned(),
        TOPIC { .. } => "TOPIC".to_owned(),
        MODE { .. } => "MODE".to_owned(),
        KICK { .. } => "KICK".to_owned(),
        Other { cmd, .. } => cmd.clone(),
        Reply { num, .. } => format!("{:03}", num),
    }
}

fn handle_irc_msg(app: &App, client: &mut dyn SessionHandle, serv: &str, msg: wire::Msg) {
    // Mirror inbound traffic for relay subscribers before local display.
    app.core.emit_signal(
        &format!("{},irc_in_{}", serv, signal_verb(&msg.cmd)),
        SignalData::Str(msg.render()),
    );

    let printer = Printer::new(app);
    let ts = OffsetDateTime::now_utc();
    let wire::Msg { pfx, cmd } = msg;

    use wire::Cmd::*;
    match cmd {
        PRIVMSG {
            target,
            msg,
            is_notice,
            ctcp,
        } => {
            let Some(pfx) = pfx else {
                debug!("PRIVMSG without prefix: {:?}", msg);
                return;
            };
            let sender = match &pfx {
                wire::Pfx::Server(serv) => serv.as_str(),
                wire::Pfx::User { nick, .. } | wire::Pfx::Ambiguous(nick) => nick.as_str(),
            };

            // CTCP queries that expect an answer.
            match &ctcp {
                Some(Ctcp::Version) => {
                    printer.add_client_msg(
                        &format!("CTCP VERSION from {}", sender),
                        &MsgTarget::Server { serv },
                    );
                    if !is_notice {
                        client.send_notice(
                            sender,
                            &wire::ctcp::encode(
                                "VERSION",
                                &format!(
                                    "lattice {} ({}/{})",
                                    env!("CARGO_PKG_VERSION"),
                                    std::env::consts::OS,
                                    std::env::consts::ARCH
                                ),
                            ),
                        );
                    }
                    return;
                }
                Some(Ctcp::Ping) => {
                    if !is_notice {
                        client.send_notice(sender, &wire::ctcp::encode("PING", &msg));
                    }
                    return;
                }
                Some(Ctcp::Dcc) => {
                    // The session already decoded the offer; the record
                    // shows up via Event::Dcc.
                    return;
                }
                Some(Ctcp::Other(name)) => {
                    printer.add_client_msg(
                        &format!("Unhandled CTCP {} from {}", name, sender),
                        &MsgTarget::Server { serv },
                    );
                    return;
                }
                Some(Ctcp::Action) | None => {}
            }
            let is_action = ctcp == Some(Ctcp::Action);

            let self_nick = client.get_nick();
            let self_sent = lattice_common::nick_eq(sender, &self_nick);

            match target {
                wire::MsgTarget::Chan(chan) => {
                    let mentions_nick = msg.contains(&self_nick);
                    let highlight =
                        !self_sent && (mentions_nick || app.core.detect_highlight(&msg));
                    printer.add_privmsg(
                        sender,
                        &msg,
                        ts,
                        &MsgTarget::Chan { serv, chan: &chan },
                        highlight,
                        is_action,
                    );
                }
                wire::MsgTarget::User(target_nick) => {
                    match &pfx {
                        wire::Pfx::Server(_) => {
                            printer.add_privmsg(
                                sender,
                                &msg,
                                ts,
                                &MsgTarget::Server { serv },
                                false,
                                is_action,
                            );
                        }
                        wire::Pfx::User { nick, .. } | wire::Pfx::Ambiguous(nick) => {
                            if target_nick == self_nick {
                                // A private message to us; notices without
                                // an open conversation stay on the server
                                // buffer.
                                let have_buffer =
                                    app.core.find_buffer("irc", &format!("{}/{}", serv, nick));
                                let target = if is_notice && have_buffer.is_none() {
                                    MsgTarget::Server { serv }
                                } else {
                                    MsgTarget::User { serv, nick }
                                };
                                let highlight = !self_sent
                                    && (msg.contains(&self_nick)
                                        || app.core.detect_highlight(&msg));
                                printer.add_privmsg(sender, &msg, ts, &target, highlight, is_action);
                            } else {
                                // Relayed by a bouncer or a host mask
                                // target; show it where it makes sense.
                                let target = if self_sent {
                                    MsgTarget::User {
                                        serv,
                                        nick: &target_nick,
                                    }
                                } else {
                                    MsgTarget::User { serv, nick }
                                };
                                printer.add_privmsg(sender, &msg, ts, &target, false, is_action);
                            }
                        }
                    }
                }
            }
        }

        JOIN { chan } => {
            let Some(nick) = pfx.as_ref().and_then(wire::Pfx::nick) else {
                return;
            };
            if lattice_common::nick_eq(nick, &client.get_nick()) {
                let id = buffers::chan_buffer(app, serv, &chan);
                app.core.set_current_buffer(id);
            } else {
                printer.add_nick(
                    wire::drop_nick_prefix(nick),
                    ts,
                    &MsgTarget::Chan { serv, chan: &chan },
                );
            }
        }

        PART { chan, .. } => {
            let Some(nick) = pfx.as_ref().and_then(wire::Pfx::nick) else {
                return;
            };
            if !lattice_common::nick_eq(nick, &client.get_nick()) {
                printer.remove_nick(nick, ts, &MsgTarget::Chan { serv, chan: &chan });
            }
            // Our own PART keeps the buffer around for scrollback.
        }

        KICK { chan, nick, msg } => {
            let reason = msg.as_deref().unwrap_or("");
            printer.add_client_msg(
                &format!("{} was kicked ({})", nick, reason),
                &MsgTarget::Chan { serv, chan: &chan },
            );
            if !lattice_common::nick_eq(&nick, &client.get_nick()) {
                printer.remove_nick(&nick, ts, &MsgTarget::Chan { serv, chan: &chan });
            }
        }

        QUIT { chans, .. } => {
            let Some(nick) = pfx.as_ref().and_then(wire::Pfx::nick) else {
                return;
            };
            for chan in &chans {
                printer.remove_nick(nick, ts, &MsgTarget::Chan { serv, chan });
            }
            if app
                .core
                .find_buffer("irc", &format!("{}/{}", serv, nick))
                .is_some()
            {
                printer.remove_nick(nick, ts, &MsgTarget::User { serv, nick });
            }
        }

        NICK { nick, chans } => {
            let Some(old_nick) = pfx.as_ref().and_then(wire::Pfx::nick) else {
                return;
            };
            for chan in &chans {
                printer.rename_nick(old_nick, &nick, ts, &MsgTarget::Chan { serv, chan });
            }
        }

        TOPIC { chan, topic } => {
            printer.set_topic(&topic, ts, serv, &chan);
        }

        MODE { target, modes } => {
            printer.add_client_msg(
                &format!("Mode {} [{}]", target, modes),
                &MsgTarget::Server { serv },
            );
        }

        PING { .. } | PONG { .. } => {
            // Answered in the session; nothing to show.
        }

        ERROR { msg } => {
            printer.add_err_msg(&msg, ts, &MsgTarget::AllServBuffers { serv });
        }

        Reply { num, params } => {
            handle_numeric(app, client, serv, num, params, ts);
        }

        Other { cmd, params } => {
            printer.add_msg(
                &format!("{} {}", cmd, params.join(" ")),
                ts,
                &MsgTarget::Server { serv },
            );
        }
    }
}

/// Whois-family numerics all render as `[nick] payload...`.
fn is_whois_numeric(num: u16) -> bool {
    matches!(num, 301 | 311 | 312 | 313 | 317 | 318 | 319 | 330 | 338 | 671)
}

fn handle_numeric(
    app: &App,
    _client: &mut dyn SessionHandle,
    serv: &str,
    num: u16,
    params: Vec<String>,
    ts: OffsetDateTime,
) {
    let printer = Printer::new(app);
    let n_params = params.len();

    // Welcome, MOTD and luser numerics: plain server text.
    if (num <= 3 || num == 251 || num == 255 || num == 372 || num == 375 || num == 376)
        && n_params == 2
    {
        printer.add_msg(&params[1], ts, &MsgTarget::Server { serv });
    } else if num == 4 || num == 5 || (250..=254).contains(&num) || num == 265 || num == 266 {
        let msg = params.into_iter().skip(1).collect::<Vec<String>>().join(" ");
        printer.add_msg(&msg, ts, &MsgTarget::Server { serv });
    }
    // RPL_TOPIC
    else if num == 332 && n_params >= 2 {
        let chan = &params[n_params - 2];
        let topic = &params[n_params - 1];
        printer.set_topic(topic, ts, serv, lattice_common::ChanNameRef::new(chan));
    }
    // RPL_NAMREPLY: nick list updated in the session state; wake the
    // nicklist subscribers once per reply.
    else if num == 353 && n_params >= 2 {
        let chan = lattice_common::ChanNameRef::new(&params[n_params - 2]);
        let id = buffers::chan_buffer(app, serv, chan);
        app.core
            .emit_signal("nicklist_changed", SignalData::Int(id.0 as i64));
    } else if num == 366 {
        // End of NAMES; nothing to display.
    }
    // RPL_UNAWAY / RPL_NOWAWAY
    else if (num == 305 || num == 306) && n_params > 1 {
        printer.add_client_msg(&params[1], &MsgTarget::AllServBuffers { serv });
    }
    // ERR_NOSUCHNICK
    else if num == 401 && n_params > 2 {
        printer.add_client_msg(
            &params[2],
            &MsgTarget::User {
                serv,
                nick: &params[1],
            },
        );
    }
    // The whois family shares one formatter.
    else if is_whois_numeric(num) && n_params > 2 {
        let nick = &params[1];
        let payload = params[2..].join(" ");
        printer.add_msg(
            &format!("[{}] {}", nick, payload),
            ts,
            &MsgTarget::Server { serv },
        );
    }
    // Anything unrouted becomes a generic server message.
    else {
        let msg = params.join(" ");
        printer.add_msg(&msg, ts, &MsgTarget::Server { serv });
    }
}

fn handle_dcc_ev(app: &App, serv: &str, ev: lattice_client::dcc::DccEvent) {
    use lattice_client::dcc::DccEvent::*;
    let printer = Printer::new(app);
    let target = MsgTarget::Server { serv };
    match ev {
        Offer { id } => {
            let info = app.find_client(serv).and_then(|c| c.dcc_info(id));
            match info {
                Some(info) => printer.add_client_msg(
                    &format!(
                        "DCC {:?} offer #{} from {}: {} ({} bytes)",
                        info.kind,
                        id.0,
                        info.peer_nick,
                        info.filename,
                        info.size.map(|s| s.to_string()).unwrap_or_else(|| "?".to_owned()),
                    ),
                    &target,
                ),
                None => debug!("DCC offer event for unknown transfer {:?}", id),
            }
        }
        ResumeRequested { id, offset } => {
            printer.add_client_msg(
                &format!("DCC #{}: requesting resume at byte {}", id.0, offset),
                &target,
            );
        }
        Progress { .. } => {
            // Progress rows are the display layer's business; keep quiet.
        }
        StatusChange { id, status } => {
            printer.add_client_msg(&format!("DCC #{}: {:?}", id.0, status), &target);
        }
        ChatLine { id, line } => {
            let nick = app
                .find_client(serv)
                .and_then(|c| c.dcc_info(id))
                .map(|i| i.peer_nick)
                .unwrap_or_else(|| "?".to_owned());
            let chat_target = MsgTarget::User { serv, nick: &nick };
            printer.add_privmsg(&nick, &line, OffsetDateTime::now_utc(), &chat_target, false, false);
        }
    }
}
