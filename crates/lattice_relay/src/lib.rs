//! The relay service: listeners that re-export local IRC state to remote
//! clients. Two wire personalities share the client plumbing: the IRC face
//! makes this process look like an IRC server to a standard client; the API
//! face speaks HTTP-shaped requests with JSON bodies plus server-pushed
//! event frames on the same connection.

pub mod api;
pub mod http;
pub mod irc;

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use lattice_common::{ChanName, ChanNameRef};
use lattice_core::Core;

/// Which personality a listener speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Irc,
    Api,
}

/// Client lifecycle. Terminal states (`AuthFailed`, `Disconnected`) are
/// final: no further bytes are written to such a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Connecting,
    Authenticating,
    Connected,
    AuthFailed,
    Disconnected,
}

impl ClientStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ClientStatus::AuthFailed | ClientStatus::Disconnected)
    }
}

/// One listener's configuration.
#[derive(Clone)]
pub struct RelayConfig {
    pub face: Face,
    /// Server (by config name) an IRC-face listener mirrors. Unused by the
    /// API face.
    pub serv: String,
    pub password: String,
    pub auth_timeout: Duration,
    /// Outbound frames queued per client before it is dropped as a slow
    /// consumer.
    pub outbound_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> RelayConfig {
        RelayConfig {
            face: Face::Irc,
            serv: String::new(),
            password: String::new(),
            auth_timeout: Duration::from_secs(30),
            outbound_queue: 256,
        }
    }
}

/// What the relay needs to know about the upstream IRC sessions. The
/// launcher implements this over its client list; tests use a fake.
pub trait Upstream {
    fn serv_names(&self) -> Vec<String>;
    fn is_registered(&self, serv: &str) -> bool;
    fn nick(&self, serv: &str) -> String;
    fn joined_chans(&self, serv: &str) -> Vec<ChanName>;
    /// Nicks of a channel with their membership prefix (`@op`, `+voiced`).
    fn chan_nicks_with_prefix(&self, serv: &str, chan: &ChanNameRef) -> Vec<String>;
    fn isupport_tokens(&self, serv: &str) -> Vec<String>;
    /// Forward a raw IRC line upstream.
    fn send_raw(&self, serv: &str, line: &str);
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("can't bind relay listener on {addr}: {err}")]
    Bind {
        addr: String,
        #[source]
        err: std::io::Error,
    },
}

/// Record of one remote client, face-independent.
pub struct ClientRec {
    pub id: u64,
    pub face: Face,
    pub addr: SocketAddr,
    pub status: ClientStatus,
    pub start_time: OffsetDateTime,
    pub end_time: Option<OffsetDateTime>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    /// Sender feeding the client's writer task.
    out: Option<mpsc::Sender<Vec<u8>>>,
}

/// Shared registry of relay clients, across all listeners.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    clients: Vec<ClientRec>,
    next_id: u64,
}

impl ClientRegistry {
    pub fn new() -> ClientRegistry {
        ClientRegistry::default()
    }

    fn add(&self, face: Face, addr: SocketAddr, out: mpsc::Sender<Vec<u8>>) -> u64 {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.clients.push(ClientRec {
            id,
            face,
            addr,
            status: ClientStatus::Connecting,
            start_time: OffsetDateTime::now_utc(),
            end_time: None,
            bytes_sent: 0,
            bytes_recv: 0,
            out: Some(out),
        });
        id
    }

    pub fn status(&self, id: u64) -> Option<ClientStatus> {
        self.inner
            .borrow()
            .clients
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.status)
    }

    pub fn set_status(&self, id: u64, status: ClientStatus) {
        let mut inner = self.inner.borrow_mut();
        if let Some(c) = inner.clients.iter_mut().find(|c| c.id == id) {
            if c.status.is_terminal() {
                return;
            }
            c.status = status;
            if status.is_terminal() {
                c.end_time = Some(OffsetDateTime::now_utc());
                // No further writes to a terminal client.
                c.out = None;
            }
        }
    }

    fn note_recv(&self, id: u64, bytes: u64) {
        let mut inner = self.inner.borrow_mut();
        if let Some(c) = inner.clients.iter_mut().find(|c| c.id == id) {
            c.bytes_recv += bytes;
        }
    }

    /// Queue bytes to a client. A full queue marks the client a slow
    /// consumer and disconnects it. Terminal clients are never written.
    pub fn send(&self, id: u64, bytes: Vec<u8>) {
        let out = {
            let mut inner = self.inner.borrow_mut();
            let Some(c) = inner.clients.iter_mut().find(|c| c.id == id) else {
                return;
            };
            if c.status.is_terminal() {
                return;
            }
            c.bytes_sent += bytes.len() as u64;
            c.out.clone()
        };
        if let Some(out) = out {
            if out.try_send(bytes).is_err() {
                warn!("relay client {}: slow consumer, disconnecting", id);
                self.set_status(id, ClientStatus::Disconnected);
            }
        }
    }

    /// Drop clients in terminal states.
    pub fn purge(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        let before = inner.clients.len();
        inner.clients.retain(|c| !c.status.is_terminal());
        before - inner.clients.len()
    }

    pub fn count(&self) -> usize {
        self.inner.borrow().clients.len()
    }

    /// Snapshot of every client, for the clients buffer and `/relay list`.
    pub fn snapshot(&self) -> Vec<ClientInfo> {
        self.inner
            .borrow()
            .clients
            .iter()
            .map(|c| ClientInfo {
                id: c.id,
                face: c.face,
                addr: c.addr,
                status: c.status,
                start_time: c.start_time,
                end_time: c.end_time,
                bytes_sent: c.bytes_sent,
                bytes_recv: c.bytes_recv,
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .borrow()
            .clients
            .iter()
            .filter(|c| !c.status.is_terminal())
            .count()
    }
}

/// Copyable view of one client record.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub id: u64,
    pub face: Face,
    pub addr: SocketAddr,
    pub status: ClientStatus,
    pub start_time: OffsetDateTime,
    pub end_time: Option<OffsetDateTime>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// The hook-owner tag of a relay client; also the line tag used for echo
/// suppression.
pub fn client_tag(id: u64) -> String {
    format!("relay_client_{}", id)
}

/// Extract a relay client id out of a line's tags, if present.
pub fn tag_client_id(tags: &[String]) -> Option<u64> {
    tags.iter()
        .find_map(|t| t.strip_prefix("relay_client_"))
        .and_then(|id| id.parse().ok())
}

/// One listening socket; spawns a task per accepted connection.
pub struct RelayServer {
    core: Core,
    upstream: Rc<dyn Upstream>,
    registry: ClientRegistry,
    config: RelayConfig,
}

impl RelayServer {
    pub fn new(
        core: Core,
        upstream: Rc<dyn Upstream>,
        registry: ClientRegistry,
        config: RelayConfig,
    ) -> RelayServer {
        RelayServer {
            core,
            upstream,
            registry,
            config,
        }
    }

    /// Bind and run the accept loop until the process ends. Returns the
    /// bound address (useful with port 0).
    pub async fn bind(self, bind_addr: &str) -> Result<SocketAddr, RelayError> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|err| RelayError::Bind {
                addr: bind_addr.to_owned(),
                err,
            })?;
        let local = listener.local_addr().map_err(|err| RelayError::Bind {
            addr: bind_addr.to_owned(),
            err,
        })?;
        info!(
            "relay: listening on {} ({:?} face)",
            local, self.config.face
        );

        tokio::task::spawn_local(async move {
            loop {
                match listener.accept().await {
                    Ok((sock, addr)) => {
                        self.spawn_client(sock, addr);
                    }
                    Err(err) => {
                        warn!("relay: accept error: {}", err);
                    }
                }
            }
        });

        Ok(local)
    }

    fn spawn_client(&self, sock: TcpStream, addr: SocketAddr) {
        let (read_half, mut write_half) = sock.into_split();
        let (snd_out, mut rcv_out) = mpsc::channel::<Vec<u8>>(self.config.outbound_queue);
        let id = self.registry.add(self.config.face, addr, snd_out);
        info!("relay: client {} connected from {}", id, addr);

        // Writer task: drains the outbound queue.
        let registry = self.registry.clone();
        tokio::task::spawn_local(async move {
            while let Some(bytes) = rcv_out.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    registry.set_status(id, ClientStatus::Disconnected);
                    return;
                }
            }
        });

        self.registry.set_status(id, ClientStatus::Authenticating);

        let core = self.core.clone();
        let upstream = self.upstream.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();
        tokio::task::spawn_local(async move {
            client_task(core, upstream, registry.clone(), config, id, read_half).await;
            // Whatever the face did, the client ends detached.
            registry.set_status(id, ClientStatus::Disconnected);
        });
    }
}

async fn client_task(
    core: Core,
    upstream: Rc<dyn Upstream>,
    registry: ClientRegistry,
    config: RelayConfig,
    id: u64,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
) {
    let mut face: Box<dyn FaceState> = match config.face {
        Face::Irc => Box::new(irc::IrcFace::new(&config)),
        Face::Api => Box::new(api::ApiFace::new(&config)),
    };

    let auth_deadline = tokio::time::Instant::now() + config.auth_timeout;
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut read_buf = [0u8; 4096];

    loop {
        if registry
            .status(id)
            .map(ClientStatus::is_terminal)
            .unwrap_or(true)
        {
            break;
        }

        // Until authentication completes, reads race the auth deadline.
        let authed = !matches!(registry.status(id), Some(ClientStatus::Authenticating));
        let n = if authed {
            match read_half.read(&mut read_buf).await {
                Ok(n) => n,
                Err(err) => {
                    debug!("relay client {}: read error: {}", id, err);
                    break;
                }
            }
        } else {
            match tokio::time::timeout_at(auth_deadline, read_half.read(&mut read_buf)).await {
                Err(_) => {
                    info!("relay client {}: authentication timeout", id);
                    registry.set_status(id, ClientStatus::AuthFailed);
                    break;
                }
                Ok(Err(err)) => {
                    debug!("relay client {}: read error: {}", id, err);
                    break;
                }
                Ok(Ok(n)) => n,
            }
        };

        if n == 0 {
            break;
        }
        registry.note_recv(id, n as u64);
        buf.extend_from_slice(&read_buf[..n]);

        face.on_data(&FaceCtx {
            core: &core,
            upstream: upstream.as_ref(),
            registry: &registry,
            id,
        }, &mut buf);
    }

    face.on_close(&FaceCtx {
        core: &core,
        upstream: upstream.as_ref(),
        registry: &registry,
        id,
    });
    core.unhook_owner(&client_tag(id));
    info!("relay: client {} disconnected", id);
}

/// Everything a face sees when handling data.
pub struct FaceCtx<'a> {
    pub core: &'a Core,
    pub upstream: &'a dyn Upstream,
    pub registry: &'a ClientRegistry,
    pub id: u64,
}

/// Per-client protocol personality.
pub trait FaceState {
    /// Consume as much of the inbound buffer as possible.
    fn on_data(&mut self, ctx: &FaceCtx, buf: &mut Vec<u8>);

    /// Connection is going away.
    fn on_close(&mut self, ctx: &FaceCtx);
}
