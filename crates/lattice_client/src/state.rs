//! Connection-scoped IRC state: registration progress, the current nick,
//! ISUPPORT hints, lag bookkeeping, and the channel/nick model. Mutated by
//! [`State::update`] with every inbound message, queried by the UI glue and
//! the relay.

use crate::utils::{find_idx, nick_color};
use crate::{Cmd, ConnState, Event, NickPolicy, ServerConfig};

use lattice_common::{nick_eq, ChanName, ChanNameRef};
use lattice_wire as wire;
use lattice_wire::isupport::Isupport;
use lattice_wire::mode::{ModeChange, NickFlag};
use lattice_wire::{Msg, Pfx};

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::sync::mpsc::Sender;

/// What the session loop should do after an update.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum UpdateStatus {
    Continue,
    Disconnect(String),
}

/// Membership/away flags of a nick on one channel.
pub mod nick_flags {
    pub const OWNER: u8 = 1 << 0;
    pub const ADMIN: u8 = 1 << 1;
    pub const OP: u8 = 1 << 2;
    pub const HALFOP: u8 = 1 << 3;
    pub const VOICE: u8 = 1 << 4;
    pub const AWAY: u8 = 1 << 5;
}

fn flag_bit(flag: NickFlag) -> u8 {
    match flag {
        NickFlag::Owner => nick_flags::OWNER,
        NickFlag::Admin => nick_flags::ADMIN,
        NickFlag::Op => nick_flags::OP,
        NickFlag::HalfOp => nick_flags::HALFOP,
        NickFlag::Voice => nick_flags::VOICE,
    }
}

/// One nick in one channel. The same person in N channels has N entries.
#[derive(Debug, Clone)]
pub struct NickInfo {
    pub nick: String,
    /// `user@host`, when learned from a JOIN prefix.
    pub host: Option<String>,
    pub flags: u8,
    /// Display color, assigned by hashing the nick.
    pub color: u8,
}

impl NickInfo {
    fn new(nick: &str, host: Option<String>) -> NickInfo {
        NickInfo {
            nick: nick.to_owned(),
            host,
            flags: 0,
            color: nick_color(nick),
        }
    }

    pub fn has_flag(&self, bit: u8) -> bool {
        self.flags & bit != 0
    }

    /// Membership prefix for NAMES-style rendering, highest rank wins.
    pub fn prefix_char(&self) -> Option<char> {
        for (bit, flag) in [
            (nick_flags::OWNER, NickFlag::Owner),
            (nick_flags::ADMIN, NickFlag::Admin),
            (nick_flags::OP, NickFlag::Op),
            (nick_flags::HALFOP, NickFlag::HalfOp),
            (nick_flags::VOICE, NickFlag::Voice),
        ] {
            if self.has_flag(bit) {
                return Some(flag.prefix_char());
            }
        }
        None
    }
}

#[derive(Debug)]
struct Chan {
    name: ChanName,
    topic: Option<String>,
    key: Option<String>,
    limit: u32,
    /// Channel mode letters currently set (parameterless ones).
    modes: Vec<char>,
    nicks: Vec<NickInfo>,
    /// We are currently in the channel (false between reconnects).
    joined: bool,
}

impl Chan {
    fn new(name: ChanName) -> Chan {
        Chan {
            name,
            topic: None,
            key: None,
            limit: 0,
            modes: Vec::new(),
            nicks: Vec::new(),
            joined: false,
        }
    }

    fn nick_idx(&self, nick: &str) -> Option<usize> {
        find_idx(&self.nicks, |n| nick_eq(&n.nick, nick))
    }

    fn add_nick(&mut self, nick: &str, host: Option<String>) {
        if self.nick_idx(nick).is_none() {
            self.nicks.push(NickInfo::new(nick, host));
        }
    }

    fn remove_nick(&mut self, nick: &str) -> bool {
        match self.nick_idx(nick) {
            Some(idx) => {
                self.nicks.remove(idx);
                true
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.nicks.clear();
        self.topic = None;
        self.modes.clear();
        self.joined = false;
    }
}

/// Immutable view of a channel for the relay and the display glue.
#[derive(Debug, Clone)]
pub struct ChanSnapshot {
    pub name: ChanName,
    pub topic: Option<String>,
    pub nicks: Vec<NickInfo>,
}

#[derive(Clone)]
pub struct State {
    inner: Rc<RefCell<StateInner>>,
}

struct StateInner {
    config: ServerConfig,
    nick_policy: Rc<dyn NickPolicy>,

    conn_state: ConnState,
    /// Index of the nick attempt in progress (fed to the policy on 433).
    nick_attempt: usize,
    current_nick: String,
    /// True once 001 accepted our nick.
    registered: bool,

    away_status: Option<String>,
    /// From 002 RPL_YOURHOST, used as the lag-probe PING token.
    servername: Option<String>,
    isupport: Isupport,
    /// User modes on us (`+iw`...), from MODE with our nick as target.
    user_modes: Vec<char>,

    chans: Vec<Chan>,

    ping_sent_at: Option<Instant>,
    lag_ms: Option<u64>,
}

impl State {
    pub(crate) fn new(config: ServerConfig, nick_policy: Rc<dyn NickPolicy>) -> State {
        let current_nick = config.nicks.first().cloned().unwrap_or_default();
        let chans = config
            .auto_join
            .iter()
            .map(|c| Chan::new(c.to_owned()))
            .collect();
        State {
            inner: Rc::new(RefCell::new(StateInner {
                config,
                nick_policy,
                conn_state: ConnState::Disconnected,
                nick_attempt: 0,
                current_nick,
                registered: false,
                away_status: None,
                servername: None,
                isupport: Isupport::default(),
                user_modes: Vec::new(),
                chans,
                ping_sent_at: None,
                lag_ms: None,
            })),
        }
    }

    //
    // Connection lifecycle
    //

    pub(crate) fn set_conn_state(&self, state: ConnState, snd_ev: &mut Sender<Event>) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.conn_state == state {
                return;
            }
            inner.conn_state = state;
        }
        let _ = snd_ev.try_send(Event::StateChange(state));
    }

    pub fn conn_state(&self) -> ConnState {
        self.inner.borrow().conn_state
    }

    /// Back to pre-registration state, keeping channel names for re-join.
    pub(crate) fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.registered = false;
        inner.nick_attempt = 0;
        inner.current_nick = inner.config.nicks.first().cloned().unwrap_or_default();
        inner.servername = None;
        inner.isupport = Isupport::default();
        inner.user_modes.clear();
        inner.ping_sent_at = None;
        inner.lag_ms = None;
        for chan in &mut inner.chans {
            chan.reset();
        }
    }

    /// PASS (when set), NICK, USER.
    pub(crate) fn introduce(&self, snd_msg: &mut Sender<String>) {
        let inner = self.inner.borrow();
        if let Some(pass) = &inner.config.pass {
            let _ = snd_msg.try_send(wire::pass(pass));
        }
        let _ = snd_msg.try_send(wire::nick(&inner.current_nick));
        let _ = snd_msg.try_send(wire::user(&inner.config.username, &inner.config.realname));
    }

    /// Lag probe: PING the server and remember when.
    pub(crate) fn send_ping(&self, snd_msg: &mut Sender<String>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(servername) = inner.servername.clone() {
            inner.ping_sent_at = Some(Instant::now());
            let _ = snd_msg.try_send(wire::ping(&servername));
        }
    }

    //
    // Queries
    //

    pub fn get_nick(&self) -> String {
        self.inner.borrow().current_nick.clone()
    }

    pub fn is_registered(&self) -> bool {
        self.inner.borrow().registered
    }

    pub fn get_usermodes(&self) -> String {
        self.inner.borrow().user_modes.iter().collect()
    }

    pub fn lag_ms(&self) -> Option<u64> {
        self.inner.borrow().lag_ms
    }

    pub fn isupport_tokens(&self) -> Vec<String> {
        self.inner.borrow().isupport.tokens.clone()
    }

    pub fn joined_chans(&self) -> Vec<ChanName> {
        self.inner
            .borrow()
            .chans
            .iter()
            .filter(|c| c.joined)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn chan_snapshot(&self, chan: &ChanNameRef) -> Option<ChanSnapshot> {
        let inner = self.inner.borrow();
        let idx = find_idx(&inner.chans, |c| c.name.as_ref() == chan)?;
        let c = &inner.chans[idx];
        Some(ChanSnapshot {
            name: c.name.clone(),
            topic: c.topic.clone(),
            nicks: c.nicks.clone(),
        })
    }

    pub fn get_chan_nicks(&self, chan: &ChanNameRef) -> Vec<String> {
        let inner = self.inner.borrow();
        match find_idx(&inner.chans, |c| c.name.as_ref() == chan) {
            None => Vec::new(),
            Some(idx) => {
                let mut nicks: Vec<String> =
                    inner.chans[idx].nicks.iter().map(|n| n.nick.clone()).collect();
                nicks.sort_unstable_by_key(|a| a.to_lowercase());
                nicks
            }
        }
    }

    /// Flags of a nick on a channel, for tests and the nicklist glue.
    pub fn nick_flags(&self, chan: &ChanNameRef, nick: &str) -> Option<u8> {
        let inner = self.inner.borrow();
        let idx = find_idx(&inner.chans, |c| c.name.as_ref() == chan)?;
        let nick_idx = inner.chans[idx].nick_idx(nick)?;
        Some(inner.chans[idx].nicks[nick_idx].flags)
    }

    pub(crate) fn leave_channel(&self, msg_chan: &mut Sender<Cmd>, chan: &ChanNameRef) {
        let inner = self.inner.borrow();
        if let Some(idx) = find_idx(&inner.chans, |c| c.name.as_ref() == chan) {
            if inner.chans[idx].joined {
                let _ = msg_chan.try_send(Cmd::Msg(wire::part(chan, None)));
            }
        }
    }

    //
    // Per-message update
    //

    /// Apply one inbound message. `UpdateStatus::Disconnect` asks the
    /// session loop to tear the connection down (nick list exhausted,
    /// server ERROR, KILL on us).
    pub(crate) fn update(
        &self,
        msg: &mut Msg,
        snd_ev: &mut Sender<Event>,
        snd_msg: &mut Sender<String>,
    ) -> UpdateStatus {
        let Msg { pfx, cmd } = msg;

        use wire::Cmd::*;
        match cmd {
            PING { server } => {
                let _ = snd_msg.try_send(wire::pong(server));
            }

            PONG { .. } => {
                let lag = {
                    let mut inner = self.inner.borrow_mut();
                    inner.ping_sent_at.take().map(|sent| {
                        let lag = sent.elapsed().as_millis() as u64;
                        inner.lag_ms = Some(lag);
                        lag
                    })
                };
                if let Some(ms) = lag {
                    let _ = snd_ev.try_send(Event::Lag { ms });
                }
            }

            JOIN { chan } => {
                let Some(nick) = pfx.as_ref().and_then(Pfx::nick).map(str::to_owned) else {
                    return UpdateStatus::Continue;
                };
                let host = match pfx {
                    Some(Pfx::User { user, .. }) if !user.is_empty() => Some(user.clone()),
                    _ => None,
                };
                let mut inner = self.inner.borrow_mut();
                if nick_eq(&nick, &inner.current_nick) {
                    match find_idx(&inner.chans, |c| &c.name == chan) {
                        None => {
                            let mut c = Chan::new(chan.clone());
                            c.joined = true;
                            inner.chans.push(c);
                        }
                        Some(idx) => {
                            let c = &mut inner.chans[idx];
                            c.joined = true;
                            c.nicks.clear();
                        }
                    }
                } else {
                    match find_idx(&inner.chans, |c| &c.name == chan) {
                        Some(idx) => {
                            inner.chans[idx].add_nick(wire::drop_nick_prefix(&nick), host)
                        }
                        None => debug!("JOIN for unknown channel {}", chan.display()),
                    }
                }
            }

            PART { chan, .. } => {
                let Some(nick) = pfx.as_ref().and_then(Pfx::nick).map(str::to_owned) else {
                    return UpdateStatus::Continue;
                };
                let mut inner = self.inner.borrow_mut();
                if nick_eq(&nick, &inner.current_nick) {
                    if let Some(idx) = find_idx(&inner.chans, |c| &c.name == chan) {
                        inner.chans.remove(idx);
                    }
                } else if let Some(idx) = find_idx(&inner.chans, |c| &c.name == chan) {
                    inner.chans[idx].remove_nick(wire::drop_nick_prefix(&nick));
                }
            }

            KICK { chan, nick, .. } => {
                let mut inner = self.inner.borrow_mut();
                let is_self = nick_eq(nick, &inner.current_nick);
                if let Some(idx) = find_idx(&inner.chans, |c| &c.name == chan) {
                    if is_self {
                        inner.chans.remove(idx);
                    } else {
                        inner.chans[idx].remove_nick(nick);
                    }
                }
            }

            QUIT { chans, .. } => {
                let Some(nick) = pfx.as_ref().and_then(Pfx::nick) else {
                    return UpdateStatus::Continue;
                };
                let mut inner = self.inner.borrow_mut();
                for chan in inner.chans.iter_mut() {
                    if chan.remove_nick(nick) {
                        chans.push(chan.name.clone());
                    }
                }
            }

            NICK {
                nick: new_nick,
                chans,
            } => {
                let Some(old_nick) = pfx.as_ref().and_then(Pfx::nick).map(str::to_owned) else {
                    return UpdateStatus::Continue;
                };
                let mut inner = self.inner.borrow_mut();
                if nick_eq(&old_nick, &inner.current_nick) {
                    inner.current_nick = new_nick.clone();
                    let _ = snd_ev.try_send(Event::NickChange {
                        new_nick: new_nick.clone(),
                    });
                }
                for chan in inner.chans.iter_mut() {
                    if let Some(idx) = chan.nick_idx(&old_nick) {
                        let color = nick_color(new_nick);
                        let entry = &mut chan.nicks[idx];
                        entry.nick = new_nick.clone();
                        entry.color = color;
                        chans.push(chan.name.clone());
                    }
                }
            }

            TOPIC { chan, topic } => {
                let mut inner = self.inner.borrow_mut();
                if let Some(idx) = find_idx(&inner.chans, |c| &c.name == chan) {
                    inner.chans[idx].topic = Some(topic.clone());
                }
            }

            MODE { target, modes } => {
                self.apply_mode(target, modes);
            }

            // RPL_WELCOME: our nick is authoritative, registration done.
            Reply { num: 1, params } => {
                {
                    let mut inner = self.inner.borrow_mut();
                    inner.registered = true;
                    if let Some(nick) = params.first() {
                        inner.current_nick = nick.clone();
                    }
                }
                let _ = snd_ev.try_send(Event::Registered);
                let _ = snd_ev.try_send(Event::NickChange {
                    new_nick: self.get_nick(),
                });
                self.run_on_connect_cmds(snd_msg);
            }

            // RPL_YOURHOST: remember the server name for lag probes.
            Reply { num: 2, params } => {
                match parse_servername(pfx.as_ref(), params) {
                    None => warn!("can't parse server name from 002"),
                    Some(servername) => {
                        self.inner.borrow_mut().servername = Some(servername);
                    }
                }
            }

            // ISUPPORT hints feed the mode parser and the relay replay.
            Reply { num: 5, params } => {
                self.inner.borrow_mut().isupport.feed(params);
            }

            // End of MOTD (or no MOTD): join configured channels, restore
            // away state.
            Reply { num: 376, .. } | Reply { num: 422, .. } => {
                let inner = self.inner.borrow();
                let chans: Vec<&ChanNameRef> = inner
                    .chans
                    .iter()
                    .filter(|c| !c.joined)
                    .map(|c| c.name.as_ref())
                    .collect();
                if !chans.is_empty() {
                    let _ = snd_msg.try_send(wire::join(chans.into_iter()));
                }
                if inner.away_status.is_some() {
                    let _ = snd_msg.try_send(wire::away(inner.away_status.as_deref()));
                }
            }

            // ERR_NICKNAMEINUSE: ask the policy for the next nick.
            Reply { num: 433, .. } => {
                let next = {
                    let mut inner = self.inner.borrow_mut();
                    if inner.registered {
                        // Rejected rename after registration; nothing to do.
                        return UpdateStatus::Continue;
                    }
                    inner.nick_attempt += 1;
                    let attempt = inner.nick_attempt;
                    inner.nick_policy.next_nick(&inner.config.nicks, attempt)
                };
                match next {
                    Some(nick) => {
                        self.inner.borrow_mut().current_nick = nick.clone();
                        let _ = snd_ev.try_send(Event::NickChange {
                            new_nick: nick.clone(),
                        });
                        let _ = snd_msg.try_send(wire::nick(&nick));
                    }
                    None => {
                        let _ = snd_ev.try_send(Event::AllNicksInUse);
                        return UpdateStatus::Disconnect("all nicks in use".to_owned());
                    }
                }
            }

            ERROR { msg } => {
                return UpdateStatus::Disconnect(msg.clone());
            }

            // KILL on us: the server is throwing us out.
            Other { cmd, params } if cmd.as_str() == "KILL" => {
                let mut inner_self = false;
                if let Some(target) = params.first() {
                    inner_self = nick_eq(target, &self.inner.borrow().current_nick);
                }
                if inner_self {
                    let reason = params.get(1).cloned().unwrap_or_else(|| "killed".to_owned());
                    return UpdateStatus::Disconnect(reason);
                }
            }

            // RPL_TOPIC
            Reply { num: 332, params } if params.len() >= 2 => {
                let chan = ChanNameRef::new(&params[params.len() - 2]);
                let topic = params[params.len() - 1].clone();
                let mut inner = self.inner.borrow_mut();
                if let Some(idx) = find_idx(&inner.chans, |c| c.name.as_ref() == chan) {
                    inner.chans[idx].topic = Some(topic);
                }
            }

            // RPL_NAMREPLY: membership with prefix flags.
            Reply { num: 353, params } if params.len() >= 2 => {
                let chan_param = params[params.len() - 2].clone();
                let names = params[params.len() - 1].clone();
                let chan = ChanNameRef::new(&chan_param);
                let mut inner = self.inner.borrow_mut();
                let idx = match find_idx(&inner.chans, |c| c.name.as_ref() == chan) {
                    Some(idx) => idx,
                    None => {
                        inner.chans.push(Chan::new(chan.to_owned()));
                        inner.chans.len() - 1
                    }
                };
                for name in names.split_whitespace() {
                    let bare = wire::drop_nick_prefix(name);
                    inner.chans[idx].add_nick(bare, None);
                    let flag = match name.chars().next() {
                        Some('~') => Some(nick_flags::OWNER),
                        Some('&') => Some(nick_flags::ADMIN),
                        Some('@') => Some(nick_flags::OP),
                        Some('%') => Some(nick_flags::HALFOP),
                        Some('+') => Some(nick_flags::VOICE),
                        _ => None,
                    };
                    if let Some(flag) = flag {
                        if let Some(nick_idx) = inner.chans[idx].nick_idx(bare) {
                            inner.chans[idx].nicks[nick_idx].flags |= flag;
                        }
                    }
                }
            }

            // RPL_AWAY about someone else: flag them in our channels.
            Reply { num: 301, params } if params.len() >= 2 => {
                let nick = params[1].clone();
                let mut inner = self.inner.borrow_mut();
                for chan in inner.chans.iter_mut() {
                    if let Some(idx) = chan.nick_idx(&nick) {
                        chan.nicks[idx].flags |= nick_flags::AWAY;
                    }
                }
            }

            // RPL_UNAWAY / RPL_NOWAWAY confirm our own away state.
            Reply { num: 305, .. } => {
                self.inner.borrow_mut().away_status = None;
            }
            Reply { num: 306, .. } => {}

            _ => {}
        }

        UpdateStatus::Continue
    }

    fn apply_mode(&self, target: &str, modes: &str) {
        let mut inner = self.inner.borrow_mut();
        let is_self = nick_eq(target, &inner.current_nick);
        if is_self {
            // User modes on us: simple letter set.
            let mut on = true;
            for c in modes.chars() {
                match c {
                    '+' => on = true,
                    '-' => on = false,
                    ' ' | ':' => {}
                    letter => {
                        if on {
                            if !inner.user_modes.contains(&letter) {
                                inner.user_modes.push(letter);
                            }
                        } else {
                            inner.user_modes.retain(|m| *m != letter);
                        }
                    }
                }
            }
            return;
        }

        let chan = ChanNameRef::new(target);
        let Some(idx) = find_idx(&inner.chans, |c| c.name.as_ref() == chan) else {
            return;
        };
        let changes = wire::mode::parse_channel_modes(modes, &inner.isupport.hints);
        let c = &mut inner.chans[idx];
        for change in changes {
            match change {
                ModeChange::NickFlag { flag, on, nick } => {
                    if let Some(nick_idx) = c.nick_idx(&nick) {
                        let bit = flag_bit(flag);
                        if on {
                            c.nicks[nick_idx].flags |= bit;
                        } else {
                            c.nicks[nick_idx].flags &= !bit;
                        }
                    }
                }
                ModeChange::Key { key } => c.key = key,
                ModeChange::Limit { limit } => c.limit = limit.unwrap_or(0),
                ModeChange::Other { letter, on, .. } => {
                    if on {
                        if !c.modes.contains(&letter) {
                            c.modes.push(letter);
                        }
                    } else {
                        c.modes.retain(|m| *m != letter);
                    }
                }
            }
        }
    }

    pub(crate) fn set_away(&self, msg: Option<&str>) {
        self.inner.borrow_mut().away_status = msg.map(str::to_owned);
    }

    /// Configured on-connect commands, sent after the configured delay.
    fn run_on_connect_cmds(&self, snd_msg: &mut Sender<String>) {
        let (cmds, delay) = {
            let inner = self.inner.borrow();
            (
                inner.config.on_connect_cmds.clone(),
                inner.config.command_delay,
            )
        };
        if cmds.is_empty() {
            return;
        }
        let snd_msg = snd_msg.clone();
        tokio::task::spawn_local(async move {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            for cmd in cmds {
                let _ = snd_msg.try_send(format!("{}\r\n", cmd));
            }
        });
    }
}

const SERVERNAME_PREFIX: &str = "Your host is ";

/// Server name from RPL_YOURHOST ("Your host is <name>[...], running...")
/// falling back to the message prefix.
fn parse_servername(pfx: Option<&Pfx>, params: &[String]) -> Option<String> {
    let from_msg = params
        .get(1)
        .or_else(|| params.first())
        .and_then(|msg| {
            let rest = msg.strip_prefix(SERVERNAME_PREFIX)?;
            let end = rest.find(['[', ','])?;
            Some(rest[..end].to_owned())
        });
    from_msg.or_else(|| match pfx {
        Some(Pfx::Server(name)) | Some(Pfx::Ambiguous(name)) => Some(name.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests;
