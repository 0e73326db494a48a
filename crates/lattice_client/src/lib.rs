#![recursion_limit = "512"]
#![allow(clippy::cognitive_complexity)]

//! Per-server IRC session. A [`Client`] is a cheap handle; the work happens
//! in tasks spawned on the current thread's `LocalSet`: the session loop
//! (connect, register, read, reconnect), an outbound writer, a liveness
//! prober, and one worker per DCC transfer.

pub mod dcc;
mod pinger;
pub mod state;
pub mod stream;
mod utils;

use dcc::{DccConfig, DccEvent, DccKind, DccRegistry, OfferAction, TransferId, TransferInfo};
use pinger::Pinger;
use state::{ChanSnapshot, UpdateStatus};
pub use state::{nick_flags, NickInfo};
pub use stream::Connector;

use lattice_common::{ChanName, ChanNameRef};
pub use lattice_wire as wire;
use wire::ctcp;
use wire::dcc::DccCmd;

use std::cell::RefCell;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use futures_util::future::FutureExt;
use futures_util::stream::{Fuse, StreamExt};
use futures_util::{pin_mut, select};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[macro_use]
extern crate log;

/// Connection lifecycle. `Registering` covers the PASS/NICK/USER exchange
/// up to the 001 welcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Resolving,
    Connecting,
    Registering,
    Registered,
    ReconnectWait,
}

/// Picks the next nick after a 433 rejection. `attempt` counts rejections
/// so far (1 after the first 433). `None` gives up.
pub trait NickPolicy {
    fn next_nick(&self, nicks: &[String], attempt: usize) -> Option<String>;
}

/// Default policy: walk the configured list, then give up (the session
/// disconnects with "all nicks in use").
pub struct ListThenStop;

impl NickPolicy for ListThenStop {
    fn next_nick(&self, nicks: &[String], attempt: usize) -> Option<String> {
        nicks.get(attempt).cloned()
    }
}

/// Bouncer-style alternative: after the list runs out, keep suffixing
/// underscores to the last nick. Not the default.
pub struct SuffixUnderscore;

impl NickPolicy for SuffixUnderscore {
    fn next_nick(&self, nicks: &[String], attempt: usize) -> Option<String> {
        match nicks.get(attempt) {
            Some(nick) => Some(nick.clone()),
            None => {
                let mut nick = nicks.last()?.clone();
                for _ in 0..(attempt - nicks.len() + 1) {
                    nick.push('_');
                }
                Some(nick)
            }
        }
    }
}

/// Everything a session needs to run, fed from the option store.
#[derive(Clone)]
pub struct ServerConfig {
    /// Config name of the server; identifies it in buffers and the relay.
    pub name: String,
    pub addr: String,
    pub port: u16,
    pub tls: bool,
    /// TLS transport, when `tls` is on. No connector + `tls = on` is a
    /// connection error.
    pub connector: Option<Connector>,
    pub pass: Option<String>,
    pub nicks: Vec<String>,
    pub username: String,
    pub realname: String,
    pub auto_join: Vec<ChanName>,
    /// Raw IRC lines sent after registration, `command_delay` apart from it.
    pub on_connect_cmds: Vec<String>,
    pub command_delay: Duration,
    pub reconnect: bool,
    pub reconnect_delay: Duration,
    /// Idle interval before a lag-probe PING; twice this with no traffic
    /// forces a disconnect.
    pub ping_interval: Duration,
    pub dcc: DccConfig,
}

/// Session events, delivered to the owner over a channel.
#[derive(Debug)]
pub enum Event {
    StateChange(ConnState),
    /// Address resolved; connecting to this address.
    Connecting(SocketAddr),
    /// 001 received; nick is authoritative.
    Registered,
    Disconnected { reason: String },
    /// Name resolution produced no addresses. The session stops.
    CantResolveAddr,
    /// Nick policy gave up after 433s.
    AllNicksInUse,
    NickChange { new_nick: String },
    /// Lag probe answered.
    Lag { ms: u64 },
    /// A message from the server (state already updated).
    Msg(wire::Msg),
    WireError(String),
    Dcc(DccEvent),
}

#[derive(Debug)]
enum Cmd {
    /// Complete IRC line (with "\r\n") to send.
    Msg(String),
    Reconnect(Option<u16>),
    Quit(Option<String>),
}

#[derive(Clone)]
pub struct Client {
    msg_chan: mpsc::Sender<Cmd>,
    name: String,
    state: state::State,
    dcc: DccRegistry,
    dcc_config: Rc<RefCell<DccConfig>>,
    snd_dcc_ev: mpsc::Sender<DccEvent>,
}

impl Client {
    /// Create a session with the default nick policy and spawn its tasks.
    pub fn new(config: ServerConfig) -> (Client, mpsc::Receiver<Event>) {
        Client::with_nick_policy(config, Rc::new(ListThenStop))
    }

    pub fn with_nick_policy(
        config: ServerConfig,
        policy: Rc<dyn NickPolicy>,
    ) -> (Client, mpsc::Receiver<Event>) {
        connect(config, policy)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_nick(&self) -> String {
        self.state.get_nick()
    }

    pub fn is_registered(&self) -> bool {
        self.state.is_registered()
    }

    pub fn conn_state(&self) -> ConnState {
        self.state.conn_state()
    }

    pub fn lag_ms(&self) -> Option<u64> {
        self.state.lag_ms()
    }

    pub fn isupport_tokens(&self) -> Vec<String> {
        self.state.isupport_tokens()
    }

    pub fn joined_chans(&self) -> Vec<ChanName> {
        self.state.joined_chans()
    }

    pub fn chan_snapshot(&self, chan: &ChanNameRef) -> Option<ChanSnapshot> {
        self.state.chan_snapshot(chan)
    }

    pub fn get_chan_nicks(&self, chan: &ChanNameRef) -> Vec<String> {
        self.state.get_chan_nicks(chan)
    }

    pub fn nick_flags(&self, chan: &ChanNameRef, nick: &str) -> Option<u8> {
        self.state.nick_flags(chan, nick)
    }

    /// Send a raw IRC line; "\r\n" is appended here, length enforcement
    /// happens in the writer.
    pub fn raw_msg(&mut self, msg: &str) {
        let _ = self.msg_chan.try_send(Cmd::Msg(format!("{}\r\n", msg)));
    }

    pub fn privmsg(&mut self, target: &str, msg: &str, is_action: bool) {
        let wire_fn = if is_action { wire::action } else { wire::privmsg };
        let _ = self.msg_chan.try_send(Cmd::Msg(wire_fn(target, msg)));
    }

    pub fn notice(&mut self, target: &str, msg: &str) {
        let _ = self.msg_chan.try_send(Cmd::Msg(wire::notice(target, msg)));
    }

    pub fn join<'a>(&mut self, chans: impl Iterator<Item = &'a ChanNameRef>) {
        let _ = self.msg_chan.try_send(Cmd::Msg(wire::join(chans)));
    }

    pub fn part(&mut self, chan: &ChanNameRef) {
        let mut chan_sender = self.msg_chan.clone();
        self.state.leave_channel(&mut chan_sender, chan);
    }

    pub fn away(&mut self, msg: Option<&str>) {
        self.state.set_away(msg);
        let _ = self.msg_chan.try_send(Cmd::Msg(wire::away(msg)));
    }

    /// Request a nick change; confirmation arrives as a NICK message back.
    pub fn nick(&mut self, new_nick: &str) {
        let _ = self.msg_chan.try_send(Cmd::Msg(wire::nick(new_nick)));
    }

    pub fn reconnect(&mut self, port: Option<u16>) {
        debug!("reconnect cmd received, port: {:?}", port);
        let _ = self.msg_chan.try_send(Cmd::Reconnect(port));
    }

    /// Quit: sends QUIT with the optional reason and stops every task of
    /// this session.
    pub fn quit(&mut self, reason: Option<String>) {
        let _ = self.msg_chan.try_send(Cmd::Quit(reason));
    }

    /// Split a long privmsg so each piece fits a 512-byte line once the
    /// server prepends our prefix. `extra_len` accounts for decorations
    /// the caller will add.
    pub fn split_privmsg<'a>(&self, extra_len: usize, msg: &'a str) -> impl Iterator<Item = &'a str> {
        // 3 for :, !, @; 13 for " PRIVMSG ", " ", :, \r, \n; 73 for the
        // worst-case user (9+1) and host (63) parts.
        let overhead = 3 + 13 + 73 + self.get_nick().len() + extra_len;
        let max = wire::MAX_LINE_LEN.saturating_sub(overhead).max(1);
        split_iterator(msg, max)
    }

    //
    // DCC
    //

    pub fn dcc_transfers(&self) -> Vec<TransferInfo> {
        self.dcc.list()
    }

    pub fn dcc_info(&self, id: TransferId) -> Option<TransferInfo> {
        self.dcc.info(id)
    }

    /// Accept a waiting offer (file: connect and receive; chat: connect
    /// and pump lines).
    pub fn dcc_accept(&self, id: TransferId) {
        match self.dcc.info(id) {
            Some(info) if info.kind == DccKind::File => {
                self.dcc.start_recv_file(id, self.snd_dcc_ev.clone());
            }
            Some(_) => self.dcc.start_chat(id, self.snd_dcc_ev.clone()),
            None => warn!("dcc_accept: no transfer {:?}", id),
        }
    }

    pub fn dcc_abort(&self, id: TransferId) {
        self.dcc.abort(id, &self.snd_dcc_ev);
    }

    pub fn dcc_chat_send(&self, id: TransferId, line: &str) {
        self.dcc.chat_send(id, line);
    }

    /// Offer a file to `nick`: binds a listener, advertises over CTCP and
    /// starts the send worker.
    pub fn dcc_send_file(&self, nick: &str, path: PathBuf) {
        let registry = self.dcc.clone();
        let events = self.snd_dcc_ev.clone();
        let msg_chan = self.msg_chan.clone();
        let nick = nick.to_owned();
        let block_size = self.dcc_config.borrow().clamped_block_size();
        tokio::task::spawn_local(async move {
            match registry.start_send_file(&nick, path, block_size, events).await {
                Ok((_, payload)) => {
                    let _ = msg_chan.try_send(Cmd::Msg(wire::privmsg(
                        &nick,
                        &ctcp::encode("DCC", &payload),
                    )));
                }
                Err(err) => warn!("dcc send setup failed: {}", err),
            }
        });
    }

    pub fn set_dcc_config(&self, config: DccConfig) {
        *self.dcc_config.borrow_mut() = config;
    }
}

fn connect(config: ServerConfig, policy: Rc<dyn NickPolicy>) -> (Client, mpsc::Receiver<Event>) {
    let name = config.name.clone();

    let (snd_ev, rcv_ev) = mpsc::channel::<Event>(100);
    let (snd_cmd, rcv_cmd) = mpsc::channel::<Cmd>(100);

    // DCC events funnel into the same event stream.
    let (snd_dcc_ev, mut rcv_dcc_ev) = mpsc::channel::<DccEvent>(100);
    let snd_ev_clone = snd_ev.clone();
    tokio::task::spawn_local(async move {
        while let Some(ev) = rcv_dcc_ev.recv().await {
            if snd_ev_clone.send(Event::Dcc(ev)).await.is_err() {
                return;
            }
        }
    });

    let state = state::State::new(config.clone(), policy);
    let dcc = DccRegistry::new();
    let dcc_config = Rc::new(RefCell::new(config.dcc.clone()));

    let client = Client {
        msg_chan: snd_cmd,
        name,
        state: state.clone(),
        dcc: dcc.clone(),
        dcc_config: dcc_config.clone(),
        snd_dcc_ev: snd_dcc_ev.clone(),
    };

    let task = main_loop(config, state, dcc, dcc_config, snd_dcc_ev, snd_ev, rcv_cmd);
    tokio::task::spawn_local(task);

    (client, rcv_ev)
}

enum TaskResult<A> {
    Done(A),
    Return,
    Reconnect(Option<u16>),
}

#[allow(clippy::too_many_arguments)]
async fn main_loop(
    config: ServerConfig,
    state: state::State,
    dcc: DccRegistry,
    dcc_config: Rc<RefCell<DccConfig>>,
    snd_dcc_ev: mpsc::Sender<DccEvent>,
    mut snd_ev: mpsc::Sender<Event>,
    rcv_cmd: mpsc::Receiver<Cmd>,
) {
    let mut rcv_cmd = ReceiverStream::new(rcv_cmd).fuse();

    // Ports can change on manual reconnect.
    let mut port = config.port;

    // Whether to sit out `reconnect_delay` before the next attempt.
    let mut wait = false;

    'connect: loop {
        if wait {
            state.set_conn_state(ConnState::ReconnectWait, &mut snd_ev);
            match wait_(&config, &mut rcv_cmd).await {
                TaskResult::Done(()) => {}
                TaskResult::Reconnect(mb_port) => {
                    port = mb_port.unwrap_or(port);
                    wait = false;
                    continue;
                }
                TaskResult::Return => {
                    return;
                }
            }
        }

        // Channel to the writer task; complete IRC lines.
        let (mut snd_msg, mut rcv_msg) = mpsc::channel::<String>(100);

        //
        // Resolve
        //

        state.set_conn_state(ConnState::Resolving, &mut snd_ev);
        let addrs = match resolve_addr(config.addr.clone(), port, &mut rcv_cmd).await {
            TaskResult::Done(Ok(addrs)) => addrs,
            TaskResult::Done(Err(err)) => {
                debug!("resolve failed: {:?}", err);
                let _ = snd_ev
                    .send(Event::Disconnected {
                        reason: format!("can't resolve {}: {}", config.addr, err),
                    })
                    .await;
                state.set_conn_state(ConnState::Disconnected, &mut snd_ev);
                if !config.reconnect {
                    return;
                }
                wait = true;
                continue;
            }
            TaskResult::Reconnect(mb_port) => {
                port = mb_port.unwrap_or(port);
                wait = false;
                continue;
            }
            TaskResult::Return => {
                return;
            }
        };

        if addrs.is_empty() {
            let _ = snd_ev.send(Event::CantResolveAddr).await;
            state.set_conn_state(ConnState::Disconnected, &mut snd_ev);
            return;
        }

        //
        // Connect
        //

        state.set_conn_state(ConnState::Connecting, &mut snd_ev);
        let stream = match try_connect(&config, addrs, &mut rcv_cmd, &mut snd_ev).await {
            TaskResult::Done(Some(stream)) => stream,
            TaskResult::Done(None) => {
                let _ = snd_ev
                    .send(Event::Disconnected {
                        reason: "connection failed".to_owned(),
                    })
                    .await;
                state.set_conn_state(ConnState::Disconnected, &mut snd_ev);
                if !config.reconnect {
                    return;
                }
                wait = true;
                continue;
            }
            TaskResult::Reconnect(mb_port) => {
                port = mb_port.unwrap_or(port);
                wait = false;
                continue;
            }
            TaskResult::Return => {
                return;
            }
        };

        let (mut read_half, mut write_half) = tokio::io::split(stream);

        //
        // Register
        //

        state.reset();
        state.set_conn_state(ConnState::Registering, &mut snd_ev);
        state.introduce(&mut snd_msg);

        // Writer task: submission order, line-length enforcement.
        let snd_ev_clone = snd_ev.clone();
        tokio::task::spawn_local(async move {
            while let Some(mut msg) = rcv_msg.recv().await {
                if wire::enforce_line_len(&mut msg) {
                    warn!("outbound line exceeded 512 bytes, truncated");
                }
                if let Err(io_err) = write_half.write_all(msg.as_bytes()).await {
                    debug!("write error: {:?}", io_err);
                    let _ = snd_ev_clone
                        .send(Event::Disconnected {
                            reason: format!("write error: {}", io_err),
                        })
                        .await;
                    return;
                }
            }
        });

        let (mut pinger, rcv_ping_evs) = Pinger::new(config.ping_interval);
        let mut rcv_ping_evs = ReceiverStream::new(rcv_ping_evs).fuse();

        let mut parse_buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            let mut read_buf: [u8; 1024] = [0; 1024];

            select! {
                cmd = rcv_cmd.next() => {
                    match cmd {
                        None => {
                            debug!("command channel closed");
                        }
                        Some(Cmd::Msg(irc_msg)) => {
                            let _ = snd_msg.try_send(irc_msg);
                        }
                        Some(Cmd::Reconnect(mb_port)) => {
                            if let Some(new_port) = mb_port {
                                port = new_port;
                            }
                            wait = false;
                            continue 'connect;
                        }
                        Some(Cmd::Quit(reason)) => {
                            let _ = snd_msg.try_send(wire::quit(reason.as_deref()));
                            // Dropping snd_msg stops the writer after the
                            // QUIT goes out.
                            return;
                        }
                    }
                }
                bytes = read_half.read(&mut read_buf).fuse() => {
                    match bytes {
                        Err(io_err) => {
                            let _ = snd_ev.send(Event::Disconnected {
                                reason: format!("read error: {}", io_err),
                            }).await;
                            state.set_conn_state(ConnState::Disconnected, &mut snd_ev);
                            if !config.reconnect { return; }
                            wait = true;
                            continue 'connect;
                        }
                        Ok(0) => {
                            let _ = snd_ev.send(Event::Disconnected {
                                reason: "connection closed by server".to_owned(),
                            }).await;
                            state.set_conn_state(ConnState::Disconnected, &mut snd_ev);
                            if !config.reconnect { return; }
                            wait = true;
                            continue 'connect;
                        }
                        Ok(bytes) => {
                            parse_buf.extend_from_slice(&read_buf[0..bytes]);
                            while let Some(msg) = wire::parse_irc_msg(&mut parse_buf) {
                                match msg {
                                    Err(err) => {
                                        let _ = snd_ev.send(Event::WireError(err)).await;
                                    }
                                    Ok(mut msg) => {
                                        pinger.reset();
                                        let status = state.update(&mut msg, &mut snd_ev, &mut snd_msg);
                                        if state.conn_state() == ConnState::Registering
                                            && state.is_registered()
                                        {
                                            state.set_conn_state(ConnState::Registered, &mut snd_ev);
                                        }
                                        handle_dcc_ctcp(
                                            &msg, &dcc, &dcc_config, &snd_dcc_ev, &mut snd_msg,
                                        );
                                        let _ = snd_ev.send(Event::Msg(msg)).await;
                                        if let UpdateStatus::Disconnect(reason) = status {
                                            let _ = snd_ev.send(Event::Disconnected { reason }).await;
                                            state.set_conn_state(ConnState::Disconnected, &mut snd_ev);
                                            if !config.reconnect { return; }
                                            wait = true;
                                            continue 'connect;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                ping_ev = rcv_ping_evs.next() => {
                    match ping_ev {
                        None => {
                            debug!("pinger terminated");
                        }
                        Some(pinger::Event::SendPing) => {
                            state.send_ping(&mut snd_msg);
                        }
                        Some(pinger::Event::Disconnect) => {
                            let _ = snd_ev.send(Event::Disconnected {
                                reason: "ping timeout".to_owned(),
                            }).await;
                            state.set_conn_state(ConnState::Disconnected, &mut snd_ev);
                            if !config.reconnect { return; }
                            wait = true;
                            continue 'connect;
                        }
                    }
                }
            }
        }
    }
}

/// React to CTCP DCC payloads: offers, resume requests, resume confirms.
fn handle_dcc_ctcp(
    msg: &wire::Msg,
    dcc: &DccRegistry,
    dcc_config: &Rc<RefCell<DccConfig>>,
    snd_dcc_ev: &mpsc::Sender<DccEvent>,
    snd_msg: &mut mpsc::Sender<String>,
) {
    let wire::Cmd::PRIVMSG {
        msg: payload,
        ctcp: Some(ctcp::Ctcp::Dcc),
        ..
    } = &msg.cmd
    else {
        return;
    };
    let Some(from) = msg.pfx.as_ref().and_then(wire::Pfx::nick) else {
        return;
    };

    match wire::dcc::parse(payload) {
        Ok(DccCmd::Send {
            filename,
            addr,
            size,
        }) => {
            let config = dcc_config.borrow().clone();
            let (id, action) = dcc.offer_recv_file(&config, from, &filename, addr, size);
            let _ = snd_dcc_ev.try_send(DccEvent::Offer { id });
            match action {
                OfferAction::Accept => dcc.start_recv_file(id, snd_dcc_ev.clone()),
                OfferAction::Resume(offset) => {
                    let payload = wire::dcc::resume(&filename, addr.port(), offset);
                    let _ = snd_msg.try_send(wire::privmsg(from, &ctcp::encode("DCC", &payload)));
                    let _ = snd_dcc_ev.try_send(DccEvent::ResumeRequested { id, offset });
                }
                OfferAction::Wait => {}
            }
        }
        Ok(DccCmd::Accept {
            filename,
            port,
            offset,
        }) => {
            if let Some(id) = dcc.confirm_resume(&filename, port, offset) {
                dcc.start_recv_file(id, snd_dcc_ev.clone());
            }
        }
        Ok(DccCmd::Resume {
            filename,
            port,
            offset,
        }) => {
            if dcc.peer_resume_request(&filename, port, offset).is_some() {
                let payload = wire::dcc::accept(&filename, port, offset);
                let _ = snd_msg.try_send(wire::privmsg(from, &ctcp::encode("DCC", &payload)));
            }
        }
        Ok(DccCmd::Chat { addr }) => {
            let id = dcc.offer_chat(from, addr);
            let _ = snd_dcc_ev.try_send(DccEvent::Offer { id });
        }
        Err(err) => {
            debug!("malformed DCC offer from {}: {}", from, err);
        }
    }
}

async fn wait_(config: &ServerConfig, rcv_cmd: &mut Fuse<ReceiverStream<Cmd>>) -> TaskResult<()> {
    let delay = tokio::time::sleep(config.reconnect_delay).fuse();
    pin_mut!(delay);

    loop {
        select! {
            () = delay => {
                return TaskResult::Done(());
            }
            cmd = rcv_cmd.next() => {
                match cmd {
                    None => return TaskResult::Return,
                    Some(Cmd::Msg(_)) => continue,
                    Some(Cmd::Reconnect(mb_port)) => return TaskResult::Reconnect(mb_port),
                    Some(Cmd::Quit(_)) => return TaskResult::Return,
                }
            }
        }
    }
}

async fn resolve_addr(
    serv_name: String,
    port: u16,
    rcv_cmd: &mut Fuse<ReceiverStream<Cmd>>,
) -> TaskResult<Result<Vec<SocketAddr>, std::io::Error>> {
    let mut addr_task = tokio::task::spawn_blocking(move || {
        (serv_name.as_str(), port)
            .to_socket_addrs()
            .map(|iter| iter.collect::<Vec<_>>())
    })
    .fuse();

    loop {
        select! {
            addrs = addr_task => {
                match addrs {
                    Err(join_err) => {
                        return TaskResult::Done(Err(std::io::Error::other(join_err)));
                    }
                    Ok(ret) => {
                        return TaskResult::Done(ret);
                    }
                }
            }
            cmd = rcv_cmd.next() => {
                match cmd {
                    None => return TaskResult::Return,
                    Some(Cmd::Msg(_)) => continue,
                    Some(Cmd::Reconnect(mb_port)) => return TaskResult::Reconnect(mb_port),
                    Some(Cmd::Quit(_)) => return TaskResult::Return,
                }
            }
        }
    }
}

async fn try_connect(
    config: &ServerConfig,
    addrs: Vec<SocketAddr>,
    rcv_cmd: &mut Fuse<ReceiverStream<Cmd>>,
    snd_ev: &mut mpsc::Sender<Event>,
) -> TaskResult<Option<stream::BoxStream>> {
    let connect_task = async {
        for addr in addrs {
            let _ = snd_ev.send(Event::Connecting(addr)).await;
            match tokio::net::TcpStream::connect(addr).await {
                Err(err) => {
                    debug!("connect to {} failed: {}", addr, err);
                }
                Ok(sock) => {
                    match stream::finish(sock, config.tls, &config.addr, config.connector.as_ref())
                        .await
                    {
                        Ok(stream) => return Some(stream),
                        Err(err) => {
                            debug!("transport setup failed: {}", err);
                        }
                    }
                }
            }
        }
        None
    };

    let connect_task = connect_task.fuse();
    pin_mut!(connect_task);

    loop {
        select! {
            stream = connect_task => {
                return TaskResult::Done(stream);
            }
            cmd = rcv_cmd.next() => {
                match cmd {
                    None => return TaskResult::Return,
                    Some(Cmd::Msg(_)) => continue,
                    Some(Cmd::Reconnect(mb_port)) => return TaskResult::Reconnect(mb_port),
                    Some(Cmd::Quit(_)) => return TaskResult::Return,
                }
            }
        }
    }
}

/// Split `msg` into chunks of at most `max` bytes, on whitespace where
/// possible, never inside a UTF-8 sequence.
fn split_iterator(msg: &str, max: usize) -> impl Iterator<Item = &str> {
    SplitIterator {
        rest: msg,
        max,
    }
}

struct SplitIterator<'a> {
    rest: &'a str,
    max: usize,
}

impl<'a> Iterator for SplitIterator<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        if self.rest.len() <= self.max {
            let piece = self.rest;
            self.rest = "";
            return Some(piece);
        }
        let mut cut = self.max;
        while cut > 0 && !self.rest.is_char_boundary(cut) {
            cut -= 1;
        }
        // Prefer breaking at the last space inside the window.
        if let Some(space) = self.rest[..cut].rfind(' ') {
            if space > 0 {
                cut = space;
            }
        }
        let piece = &self.rest[..cut];
        self.rest = self.rest[cut..].trim_start_matches(' ');
        Some(piece)
    }
}
