//! Buffer bookkeeping and the outbound send path. Buffers are named
//! `<serv>`, `<serv>/<chan>`, `<serv>/<nick>` under the `irc` plugin; each
//! carries local variables (`type`, `server`, `channel`/`nick`) that the
//! relay and the command table use to find their way around.
//!
//! Printable events go through [`Printer`], which appends to the right
//! buffer(s) and mirrors to the chat logger, minus `no_log`-tagged lines.

use crate::App;

use lattice_common::{BufferId, ChanNameRef, MsgTarget};
use lattice_core::{BufferKind, SignalData};
use lattice_relay::client_tag;

use std::rc::Rc;

use log::warn;
use time::OffsetDateTime;

pub(crate) fn server_buffer(app: &App, serv: &str) -> BufferId {
    if let Some(id) = app.core.find_buffer("irc", serv) {
        return id;
    }
    let id = app
        .core
        .buffer_new("irc", serv, BufferKind::Formatted)
        .expect("server buffer existence just checked");
    app.core.with_buffer_mut(id, |b| {
        b.local_vars.insert("type".to_owned(), "server".to_owned());
        b.local_vars.insert("server".to_owned(), serv.to_owned());
    });

    // Typing on a server buffer sends raw IRC.
    let app_clone = app.clone();
    let serv_owned = serv.to_owned();
    app.core.set_buffer_input_cb(
        id,
        Rc::new(move |_core, _buffer, text, _origin| {
            match app_clone.find_client(&serv_owned) {
                Some(mut client) => client.raw_msg(text),
                None => warn!("input for unknown server {}", serv_owned),
            }
        }),
    );

    if let Some(logger) = &app.logger {
        logger.new_server_log(serv);
    }
    id
}

pub(crate) fn chan_buffer(app: &App, serv: &str, chan: &ChanNameRef) -> BufferId {
    let name = format!("{}/{}", serv, chan.display());
    if let Some(id) = app.core.find_buffer("irc", &name) {
        return id;
    }
    server_buffer(app, serv);
    let id = app
        .core
        .buffer_new("irc", &name, BufferKind::Formatted)
        .expect("channel buffer existence just checked");
    app.core.with_buffer_mut(id, |b| {
        b.local_vars.insert("type".to_owned(), "channel".to_owned());
        b.local_vars.insert("server".to_owned(), serv.to_owned());
        b.local_vars
            .insert("channel".to_owned(), chan.display().to_owned());
    });

    let app_clone = app.clone();
    let serv_owned = serv.to_owned();
    let chan_owned = chan.display().to_owned();
    app.core.set_buffer_input_cb(
        id,
        Rc::new(move |_core, buffer, text, origin| {
            send_msg(
                &app_clone,
                buffer,
                &serv_owned,
                &chan_owned,
                text,
                false,
                false,
                origin,
            );
        }),
    );

    if let Some(logger) = &app.logger {
        logger.new_chan_log(serv, chan);
    }
    id
}

pub(crate) fn user_buffer(app: &App, serv: &str, nick: &str) -> BufferId {
    let name = format!("{}/{}", serv, nick);
    if let Some(id) = app.core.find_buffer("irc", &name) {
        return id;
    }
    server_buffer(app, serv);
    let id = app
        .core
        .buffer_new("irc", &name, BufferKind::Formatted)
        .expect("user buffer existence just checked");
    app.core.with_buffer_mut(id, |b| {
        b.local_vars.insert("type".to_owned(), "private".to_owned());
        b.local_vars.insert("server".to_owned(), serv.to_owned());
        b.local_vars.insert("nick".to_owned(), nick.to_owned());
    });

    let app_clone = app.clone();
    let serv_owned = serv.to_owned();
    let nick_owned = nick.to_owned();
    app.core.set_buffer_input_cb(
        id,
        Rc::new(move |_core, buffer, text, origin| {
            send_msg(
                &app_clone,
                buffer,
                &serv_owned,
                &nick_owned,
                text,
                false,
                false,
                origin,
            );
        }),
    );
    id
}

/// Local variable lookup helpers.
pub(crate) fn buffer_serv(app: &App, buffer: BufferId) -> Option<String> {
    app.core
        .with_buffer(buffer, |b| b.local_vars.get("server").cloned())
        .flatten()
}

pub(crate) fn buffer_chan(app: &App, buffer: BufferId) -> Option<String> {
    app.core
        .with_buffer(buffer, |b| b.local_vars.get("channel").cloned())
        .flatten()
}

pub(crate) fn buffer_nick(app: &App, buffer: BufferId) -> Option<String> {
    app.core
        .with_buffer(buffer, |b| b.local_vars.get("nick").cloned())
        .flatten()
}

/// Send a PRIVMSG/NOTICE: split to fit the wire, send each piece, echo it
/// into `buffer` tagged with the origin (for relay echo suppression), and
/// mirror it on the `irc_out` signal.
#[allow(clippy::too_many_arguments)]
pub(crate) fn send_msg(
    app: &App,
    buffer: BufferId,
    serv: &str,
    target: &str,
    text: &str,
    is_action: bool,
    is_notice: bool,
    origin: Option<u64>,
) {
    let Some(mut client) = app.find_client(serv) else {
        app.core
            .print_err(buffer, &format!("Not connected to server {}", serv));
        return;
    };

    // Outbound text runs through the modifier chain first.
    let text = app.core.apply_modifiers("irc_out", serv, text);

    let verb = if is_notice { "NOTICE" } else { "PRIVMSG" };
    let nick = client.get_nick();
    let extra_len = target.len() + if is_action { 9 } else { 0 };
    let pieces: Vec<String> = client
        .split_privmsg(extra_len, &text)
        .map(str::to_owned)
        .collect();

    for piece in pieces {
        if is_notice {
            client.notice(target, &piece);
        } else {
            client.privmsg(target, &piece, is_action);
        }

        let mut tags: Vec<String> = vec!["irc_privmsg".to_owned(), "self_msg".to_owned()];
        tags.push(format!("nick_{}", nick));
        if let Some(id) = origin {
            tags.push(client_tag(id));
        }
        let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();
        app.core.print_tagged(buffer, &nick, &piece, &tag_refs, false);
        if let Some(logger) = &app.logger {
            if let Some(target) = buffer_msg_target(app, buffer) {
                logger.add_privmsg(
                    &nick,
                    &piece,
                    OffsetDateTime::now_utc(),
                    &target.as_target(),
                    is_action,
                );
            }
        }

        let wire_payload = if is_action {
            lattice_wire::ctcp::encode("ACTION", &piece)
        } else {
            piece.clone()
        };
        app.core.emit_signal(
            &format!("{},irc_out_{}", serv, verb),
            SignalData::Str(format!(
                "{};{} {} :{}",
                tags.join(","),
                verb,
                target,
                wire_payload
            )),
        );
    }
}

/// Owned form of a buffer's display target, for logger calls.
pub(crate) enum OwnedTarget {
    Server { serv: String },
    Chan { serv: String, chan: String },
    User { serv: String, nick: String },
}

impl OwnedTarget {
    pub(crate) fn as_target(&self) -> MsgTarget {
        match self {
            OwnedTarget::Server { serv } => MsgTarget::Server { serv },
            OwnedTarget::Chan { serv, chan } => MsgTarget::Chan {
                serv,
                chan: ChanNameRef::new(chan),
            },
            OwnedTarget::User { serv, nick } => MsgTarget::User { serv, nick },
        }
    }
}

pub(crate) fn buffer_msg_target(app: &App, buffer: BufferId) -> Option<OwnedTarget> {
    let serv = buffer_serv(app, buffer)?;
    if let Some(chan) = buffer_chan(app, buffer) {
        return Some(OwnedTarget::Chan { serv, chan });
    }
    if let Some(nick) = buffer_nick(app, buffer) {
        return Some(OwnedTarget::User { serv, nick });
    }
    Some(OwnedTarget::Server { serv })
}

/// Buffers belonging to a server (server buffer, channels, privates).
pub(crate) fn serv_buffers(app: &App, serv: &str) -> Vec<BufferId> {
    app.core
        .buffer_ids()
        .into_iter()
        .filter(|id| buffer_serv(app, *id).as_deref() == Some(serv))
        .collect()
}

/// The printable-event sink: writes into buffers and the chat logger.
pub(crate) struct Printer<'a> {
    pub(crate) app: &'a App,
}

impl<'a> Printer<'a> {
    pub(crate) fn new(app: &'a App) -> Printer<'a> {
        Printer { app }
    }

    fn targets(&self, target: &MsgTarget) -> Vec<BufferId> {
        match *target {
            MsgTarget::Server { serv } => vec![server_buffer(self.app, serv)],
            MsgTarget::Chan { serv, chan } => vec![chan_buffer(self.app, serv, chan)],
            MsgTarget::User { serv, nick } => vec![user_buffer(self.app, serv, nick)],
            MsgTarget::AllServBuffers { serv } => serv_buffers(self.app, serv),
            MsgTarget::CurrentBuffer => self.app.core.current_buffer().into_iter().collect(),
        }
    }

    /// Client-generated feedback; not logged.
    pub(crate) fn add_client_msg(&self, msg: &str, target: &MsgTarget) {
        for id in self.targets(target) {
            self.app.core.print_tagged(id, "--", msg, &["no_log"], false);
        }
    }

    pub(crate) fn add_client_err_msg(&self, msg: &str, target: &MsgTarget) {
        for id in self.targets(target) {
            self.app.core.print_err(id, msg);
        }
    }

    /// Server text (MOTD lines, notices without a better home).
    pub(crate) fn add_msg(&self, msg: &str, ts: OffsetDateTime, target: &MsgTarget) {
        for id in self.targets(target) {
            self.app.core.print_tagged(id, "", msg, &["irc_msg"], false);
        }
        if let Some(logger) = &self.app.logger {
            logger.add_msg(msg, ts, target);
        }
    }

    pub(crate) fn add_err_msg(&self, msg: &str, ts: OffsetDateTime, target: &MsgTarget) {
        for id in self.targets(target) {
            self.app
                .core
                .print_tagged(id, "!", msg, &["irc_msg"], false);
        }
        if let Some(logger) = &self.app.logger {
            logger.add_msg(msg, ts, target);
        }
    }

    /// A PRIVMSG/NOTICE/ACTION from the network.
    pub(crate) fn add_privmsg(
        &self,
        sender: &str,
        msg: &str,
        ts: OffsetDateTime,
        target: &MsgTarget,
        highlight: bool,
        is_action: bool,
    ) {
        let nick_tag = format!("nick_{}", sender);
        let tags: Vec<&str> = if is_action {
            vec!["irc_action", nick_tag.as_str()]
        } else {
            vec!["irc_privmsg", nick_tag.as_str()]
        };
        let rendered = if is_action {
            format!("* {} {}", sender, msg)
        } else {
            msg.to_owned()
        };
        let prefix = if is_action { "" } else { sender };
        for id in self.targets(target) {
            self.app
                .core
                .print_tagged(id, prefix, &rendered, &tags, highlight);
        }
        if let Some(logger) = &self.app.logger {
            logger.add_privmsg(sender, msg, ts, target, is_action);
        }
    }

    pub(crate) fn set_topic(&self, topic: &str, ts: OffsetDateTime, serv: &str, chan: &ChanNameRef) {
        let target = MsgTarget::Chan { serv, chan };
        self.add_client_msg(&format!("Topic: {}", topic), &target);
        if let Some(logger) = &self.app.logger {
            logger.set_topic(topic, ts, serv, chan);
        }
    }

    /// Membership changes: print, log, and wake nicklist subscribers.
    pub(crate) fn add_nick(&self, nick: &str, ts: OffsetDateTime, target: &MsgTarget) {
        self.add_client_msg(&format!("{} joined the channel", nick), target);
        if let Some(logger) = &self.app.logger {
            logger.add_nick(nick, ts, target);
        }
        self.nicklist_changed(target);
    }

    pub(crate) fn remove_nick(&self, nick: &str, ts: OffsetDateTime, target: &MsgTarget) {
        self.add_client_msg(&format!("{} left", nick), target);
        if let Some(logger) = &self.app.logger {
            logger.remove_nick(nick, ts, target);
        }
        self.nicklist_changed(target);
    }

    pub(crate) fn rename_nick(
        &self,
        old_nick: &str,
        new_nick: &str,
        ts: OffsetDateTime,
        target: &MsgTarget,
    ) {
        self.add_client_msg(&format!("{} is now known as {}", old_nick, new_nick), target);
        if let Some(logger) = &self.app.logger {
            logger.rename_nick(old_nick, new_nick, ts, target);
        }
        self.nicklist_changed(target);
    }

    fn nicklist_changed(&self, target: &MsgTarget) {
        for id in self.targets(target) {
            self.app
                .core
                .emit_signal("nicklist_changed", SignalData::Int(id.0 as i64));
        }
    }
}
