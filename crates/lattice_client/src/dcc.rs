//! DCC transfers: out-of-band file sends/receives and direct chats, each
//! driven by its own worker task. The worker owns the socket and the file;
//! progress and status flow back through the session's event channel. Acks
//! on a file receive are 4-byte big-endian totals, per the protocol.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use lattice_wire::dcc as dcc_wire;

pub const MIN_BLOCK_SIZE: usize = 1024;
pub const MAX_BLOCK_SIZE: usize = 102_400;

/// Transfer status. Monotone: once a terminal status (`Done`, `Failed`,
/// `Aborted`) is reached it never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DccStatus {
    Waiting,
    Connecting,
    Active,
    Done,
    Failed,
    Aborted,
}

impl DccStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DccStatus::Done | DccStatus::Failed | DccStatus::Aborted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DccDirection {
    Send,
    Recv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DccKind {
    File,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(pub u64);

/// Events surfaced to the session owner.
#[derive(Debug)]
pub enum DccEvent {
    /// A remote offer arrived (file or chat); waiting for accept unless
    /// auto-accept kicked in.
    Offer { id: TransferId },
    /// We asked the sender to resume a partial file at `offset`.
    ResumeRequested { id: TransferId, offset: u64 },
    Progress { id: TransferId, pos: u64 },
    StatusChange { id: TransferId, status: DccStatus },
    /// One line of an established DCC chat.
    ChatLine { id: TransferId, line: String },
}

/// Behavior knobs, fed from the option store.
#[derive(Debug, Clone)]
pub struct DccConfig {
    pub download_dir: PathBuf,
    /// Auto-accept incoming files up to this size; 0 never auto-accepts.
    pub auto_accept_max_size: u64,
    pub auto_resume: bool,
    /// Suffix `.1`, `.2`, ... when the local file already exists.
    pub auto_rename: bool,
    pub block_size: usize,
}

impl Default for DccConfig {
    fn default() -> DccConfig {
        DccConfig {
            download_dir: PathBuf::from("."),
            auto_accept_max_size: 0,
            auto_resume: false,
            auto_rename: true,
            block_size: 65_536,
        }
    }
}

impl DccConfig {
    pub fn clamped_block_size(&self) -> usize {
        self.block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
    }
}

pub struct Transfer {
    pub id: TransferId,
    pub direction: DccDirection,
    pub kind: DccKind,
    pub peer_nick: String,
    pub addr: SocketAddr,
    /// Remote-provided file name ("chat" for chats).
    pub filename: String,
    pub local_path: Option<PathBuf>,
    pub size: Option<u64>,
    pub pos: u64,
    /// Last ack total seen (send side) or sent (receive side).
    pub ack: u64,
    pub resume_offset: u64,
    pub status: DccStatus,
    pub started_at: Option<Instant>,
    /// (when, pos) samples for rolling throughput.
    window: VecDeque<(Instant, u64)>,
    abort: bool,
    /// Outbound line channel of an active chat.
    chat_out: Option<mpsc::Sender<String>>,
}

impl Transfer {
    fn new(
        id: TransferId,
        direction: DccDirection,
        kind: DccKind,
        peer_nick: &str,
        addr: SocketAddr,
        filename: &str,
        size: Option<u64>,
    ) -> Transfer {
        Transfer {
            id,
            direction,
            kind,
            peer_nick: peer_nick.to_owned(),
            addr,
            filename: filename.to_owned(),
            local_path: None,
            size,
            pos: 0,
            ack: 0,
            resume_offset: 0,
            status: DccStatus::Waiting,
            started_at: None,
            window: VecDeque::new(),
            abort: false,
            chat_out: None,
        }
    }

    fn set_status(&mut self, status: DccStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if self.status == status {
            return false;
        }
        self.status = status;
        if status == DccStatus::Active {
            self.started_at = Some(Instant::now());
        }
        true
    }

    /// Position only moves forward and never past the advertised size.
    fn advance_pos(&mut self, pos: u64) {
        let capped = match self.size {
            Some(size) => pos.min(size),
            None => pos,
        };
        if capped > self.pos {
            self.pos = capped;
            let now = Instant::now();
            self.window.push_back((now, capped));
            while let Some((t, _)) = self.window.front() {
                if now.duration_since(*t) > Duration::from_secs(5) {
                    self.window.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// Rolling bytes/second over the last few seconds.
    pub fn throughput(&self) -> f64 {
        let (Some((t0, p0)), Some((t1, p1))) = (self.window.front(), self.window.back()) else {
            return 0.0;
        };
        let dt = t1.duration_since(*t0).as_secs_f64();
        if dt <= 0.0 {
            return 0.0;
        }
        (p1 - p0) as f64 / dt
    }

    pub fn eta(&self) -> Option<Duration> {
        let size = self.size?;
        let rate = self.throughput();
        if rate <= 0.0 || self.pos >= size {
            return None;
        }
        Some(Duration::from_secs_f64((size - self.pos) as f64 / rate))
    }
}

/// Snapshot handed out to display layers.
#[derive(Debug, Clone)]
pub struct TransferInfo {
    pub id: TransferId,
    pub direction: DccDirection,
    pub kind: DccKind,
    pub peer_nick: String,
    pub filename: String,
    pub size: Option<u64>,
    pub pos: u64,
    pub ack: u64,
    pub status: DccStatus,
}

/// All transfers of one session. Cheap cloneable handle; worker tasks hold
/// clones and report through it.
#[derive(Clone, Default)]
pub struct DccRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    transfers: Vec<Transfer>,
    next_id: u64,
}

impl DccRegistry {
    pub fn new() -> DccRegistry {
        DccRegistry::default()
    }

    fn add(&self, mk: impl FnOnce(TransferId) -> Transfer) -> TransferId {
        let mut inner = self.inner.borrow_mut();
        let id = TransferId(inner.next_id);
        inner.next_id += 1;
        let transfer = mk(id);
        inner.transfers.push(transfer);
        id
    }

    pub fn info(&self, id: TransferId) -> Option<TransferInfo> {
        self.inner.borrow().transfers.iter().find(|t| t.id == id).map(|t| TransferInfo {
            id: t.id,
            direction: t.direction,
            kind: t.kind,
            peer_nick: t.peer_nick.clone(),
            filename: t.filename.clone(),
            size: t.size,
            pos: t.pos,
            ack: t.ack,
            status: t.status,
        })
    }

    pub fn list(&self) -> Vec<TransferInfo> {
        self.inner
            .borrow()
            .transfers
            .iter()
            .map(|t| TransferInfo {
                id: t.id,
                direction: t.direction,
                kind: t.kind,
                peer_nick: t.peer_nick.clone(),
                filename: t.filename.clone(),
                size: t.size,
                pos: t.pos,
                ack: t.ack,
                status: t.status,
            })
            .collect()
    }

    pub fn abort(&self, id: TransferId, events: &mpsc::Sender<DccEvent>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(t) = inner.transfers.iter_mut().find(|t| t.id == id) {
            t.abort = true;
            if t.set_status(DccStatus::Aborted) {
                let _ = events.try_send(DccEvent::StatusChange {
                    id,
                    status: DccStatus::Aborted,
                });
            }
        }
    }

    fn with<R>(&self, id: TransferId, f: impl FnOnce(&mut Transfer) -> R) -> Option<R> {
        self.inner
            .borrow_mut()
            .transfers
            .iter_mut()
            .find(|t| t.id == id)
            .map(f)
    }

    fn set_status(&self, id: TransferId, status: DccStatus, events: &mpsc::Sender<DccEvent>) {
        let changed = self.with(id, |t| t.set_status(status)).unwrap_or(false);
        if changed {
            let _ = events.try_send(DccEvent::StatusChange { id, status });
        }
    }

    fn aborted(&self, id: TransferId) -> bool {
        self.with(id, |t| t.abort).unwrap_or(true)
    }
}

/// Strip directory components a malicious sender may have put in the
/// advertised file name.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let base = base.trim_start_matches('.');
    if base.is_empty() {
        "unnamed".to_owned()
    } else {
        base.to_owned()
    }
}

/// Pick the local target path: `<dir>/<name>`, suffixed `.1`, `.2`, ...
/// while a file of that name exists.
fn local_target(dir: &Path, name: &str, auto_rename: bool) -> PathBuf {
    let base = dir.join(name);
    if !base.exists() || !auto_rename {
        return base;
    }
    for n in 1u32.. {
        let candidate = dir.join(format!("{}.{}", name, n));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

/// How an incoming SEND offer should proceed.
#[derive(Debug, PartialEq, Eq)]
pub enum OfferAction {
    /// Wait for the user.
    Wait,
    /// Connect and receive from byte 0.
    Accept,
    /// Ask the sender to resume at this offset.
    Resume(u64),
}

/// Decide what to do with an incoming file offer given local state. Split
/// out for testability: `existing_len` is the size of a local partial file,
/// if any.
pub fn decide_offer(config: &DccConfig, size: Option<u64>, existing_len: Option<u64>) -> OfferAction {
    if let (true, Some(existing), Some(size)) = (config.auto_resume, existing_len, size) {
        if existing > 0 && existing < size {
            return OfferAction::Resume(existing);
        }
    }
    match size {
        Some(size) if config.auto_accept_max_size > 0 && size <= config.auto_accept_max_size => {
            OfferAction::Accept
        }
        _ => OfferAction::Wait,
    }
}

impl DccRegistry {
    /// Register an incoming SEND offer. Returns the transfer id and the
    /// decided action; the session sends the RESUME CTCP / starts the
    /// worker accordingly.
    pub fn offer_recv_file(
        &self,
        config: &DccConfig,
        peer_nick: &str,
        filename: &str,
        addr: SocketAddr,
        size: Option<u64>,
    ) -> (TransferId, OfferAction) {
        let name = sanitize_filename(filename);
        let target = local_target(&config.download_dir, &name, config.auto_rename && !config.auto_resume);
        let existing_len = std::fs::metadata(&target).ok().map(|m| m.len());
        let action = decide_offer(config, size, existing_len);

        let id = self.add(|id| {
            let mut t = Transfer::new(
                id,
                DccDirection::Recv,
                DccKind::File,
                peer_nick,
                addr,
                &name,
                size,
            );
            t.local_path = Some(target.clone());
            if let OfferAction::Resume(offset) = action {
                t.resume_offset = offset;
            }
            t
        });
        (id, action)
    }

    /// Register an incoming CHAT offer.
    pub fn offer_chat(&self, peer_nick: &str, addr: SocketAddr) -> TransferId {
        self.add(|id| {
            Transfer::new(
                id,
                DccDirection::Recv,
                DccKind::Chat,
                peer_nick,
                addr,
                "chat",
                None,
            )
        })
    }

    /// The sender confirmed our resume request: start receiving at the
    /// confirmed offset.
    pub fn confirm_resume(&self, filename: &str, port: u16, offset: u64) -> Option<TransferId> {
        self.with_match(
            |t| {
                t.direction == DccDirection::Recv
                    && t.kind == DccKind::File
                    && t.filename == sanitize_filename(filename)
                    && t.addr.port() == port
                    && t.status == DccStatus::Waiting
            },
            |t| {
                t.resume_offset = offset;
                t.id
            },
        )
    }

    /// The receiver of our file asked to resume; returns the id whose
    /// worker should start at `offset`, for the session to ACCEPT.
    pub fn peer_resume_request(&self, filename: &str, port: u16, offset: u64) -> Option<TransferId> {
        self.with_match(
            |t| {
                t.direction == DccDirection::Send
                    && t.kind == DccKind::File
                    && t.filename == filename
                    && t.addr.port() == port
                    && !t.status.is_terminal()
            },
            |t| {
                t.resume_offset = offset;
                t.id
            },
        )
    }

    fn with_match<R>(
        &self,
        pred: impl Fn(&Transfer) -> bool,
        f: impl FnOnce(&mut Transfer) -> R,
    ) -> Option<R> {
        self.inner
            .borrow_mut()
            .transfers
            .iter_mut()
            .find(|t| pred(t))
            .map(f)
    }

    //
    // Workers
    //

    /// Start the receive worker for an accepted file offer.
    pub fn start_recv_file(&self, id: TransferId, events: mpsc::Sender<DccEvent>) {
        let registry = self.clone();
        tokio::task::spawn_local(async move {
            if let Err(err) = recv_file_task(&registry, id, &events).await {
                debug!("dcc recv failed: {}", err);
                registry.set_status(id, DccStatus::Failed, &events);
            }
        });
    }

    /// Offer a local file to `peer`: bind a listener, return the payload
    /// for the CTCP advertisement, and start the send worker.
    pub async fn start_send_file(
        &self,
        peer_nick: &str,
        path: PathBuf,
        block_size: usize,
        events: mpsc::Sender<DccEvent>,
    ) -> std::io::Result<(TransferId, String)> {
        let meta = tokio::fs::metadata(&path).await?;
        let size = meta.len();
        let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
        let addr = listener.local_addr()?;
        let filename = sanitize_filename(&path.to_string_lossy());

        let id = self.add(|id| {
            let mut t = Transfer::new(
                id,
                DccDirection::Send,
                DccKind::File,
                peer_nick,
                addr,
                &filename,
                Some(size),
            );
            t.local_path = Some(path.clone());
            t
        });

        let payload = dcc_wire::send_offer(&filename, &addr, size);

        let registry = self.clone();
        tokio::task::spawn_local(async move {
            if let Err(err) = send_file_task(&registry, id, listener, path, block_size, &events).await
            {
                debug!("dcc send failed: {}", err);
                registry.set_status(id, DccStatus::Failed, &events);
            }
        });

        Ok((id, payload))
    }

    /// Accept an incoming chat offer: connect and pump lines.
    pub fn start_chat(&self, id: TransferId, events: mpsc::Sender<DccEvent>) {
        let registry = self.clone();
        tokio::task::spawn_local(async move {
            if let Err(err) = chat_task(&registry, id, &events).await {
                debug!("dcc chat failed: {}", err);
                registry.set_status(id, DccStatus::Failed, &events);
            }
        });
    }

    /// Send one line over an established chat.
    pub fn chat_send(&self, id: TransferId, line: &str) {
        let out = self.with(id, |t| t.chat_out.clone()).flatten();
        match out {
            Some(out) => {
                let _ = out.try_send(line.to_owned());
            }
            None => warn!("chat_send on transfer without a chat socket"),
        }
    }
}

async fn recv_file_task(
    registry: &DccRegistry,
    id: TransferId,
    events: &mpsc::Sender<DccEvent>,
) -> std::io::Result<()> {
    let (addr, path, offset, size) = match registry.with(id, |t| {
        (
            t.addr,
            t.local_path.clone(),
            t.resume_offset,
            t.size,
        )
    }) {
        Some(x) => x,
        None => return Ok(()),
    };
    let path = path.expect("recv transfer without a local path");

    registry.set_status(id, DccStatus::Connecting, events);
    let mut sock = TcpStream::connect(addr).await?;

    let mut file = if offset > 0 {
        tokio::fs::OpenOptions::new().append(true).open(&path).await?
    } else {
        tokio::fs::File::create(&path).await?
    };

    registry.with(id, |t| t.advance_pos(offset));
    registry.set_status(id, DccStatus::Active, events);

    let mut pos = offset;
    let mut buf = vec![0u8; 65_536];
    loop {
        if registry.aborted(id) {
            return Ok(());
        }
        let n = sock.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        pos += n as u64;
        registry.with(id, |t| {
            t.advance_pos(pos);
            t.ack = pos;
        });
        // Ack frame: total received, 4-byte big-endian.
        sock.write_all(&(pos as u32).to_be_bytes()).await?;
        let _ = events.try_send(DccEvent::Progress { id, pos });
        if size == Some(pos) {
            break;
        }
    }
    file.flush().await?;

    if size.is_none() || size == Some(pos) {
        registry.set_status(id, DccStatus::Done, events);
    } else {
        registry.set_status(id, DccStatus::Failed, events);
    }
    Ok(())
}

async fn send_file_task(
    registry: &DccRegistry,
    id: TransferId,
    listener: TcpListener,
    path: PathBuf,
    block_size: usize,
    events: &mpsc::Sender<DccEvent>,
) -> std::io::Result<()> {
    let (mut sock, _) = listener.accept().await?;
    let offset = registry.with(id, |t| t.resume_offset).unwrap_or(0);
    let size = registry.with(id, |t| t.size).flatten().unwrap_or(0);

    let mut file = tokio::fs::File::open(&path).await?;
    if offset > 0 {
        use tokio::io::AsyncSeekExt;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
    }

    registry.with(id, |t| t.advance_pos(offset));
    registry.set_status(id, DccStatus::Active, events);

    let block = block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
    let mut buf = vec![0u8; block];
    let mut pos = offset;
    loop {
        if registry.aborted(id) {
            return Ok(());
        }
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        sock.write_all(&buf[..n]).await?;
        pos += n as u64;
        registry.with(id, |t| t.advance_pos(pos));
        let _ = events.try_send(DccEvent::Progress { id, pos });
    }

    // Drain acks until the receiver confirms the full size.
    let mut ack_buf = [0u8; 4];
    while registry.with(id, |t| t.ack).unwrap_or(0) < size {
        if registry.aborted(id) {
            return Ok(());
        }
        match sock.read_exact(&mut ack_buf).await {
            Ok(_) => {
                let ack = u64::from(u32::from_be_bytes(ack_buf));
                registry.with(id, |t| t.ack = t.ack.max(ack));
            }
            Err(_) => break,
        }
    }

    let acked = registry.with(id, |t| t.ack).unwrap_or(0);
    if acked >= size {
        registry.set_status(id, DccStatus::Done, events);
    } else {
        registry.set_status(id, DccStatus::Failed, events);
    }
    Ok(())
}

async fn chat_task(
    registry: &DccRegistry,
    id: TransferId,
    events: &mpsc::Sender<DccEvent>,
) -> std::io::Result<()> {
    let addr = match registry.with(id, |t| t.addr) {
        Some(addr) => addr,
        None => return Ok(()),
    };
    registry.set_status(id, DccStatus::Connecting, events);
    let sock = TcpStream::connect(addr).await?;
    let (mut read_half, mut write_half) = tokio::io::split(sock);

    let (snd_out, mut rcv_out) = mpsc::channel::<String>(32);
    registry.with(id, |t| t.chat_out = Some(snd_out));
    registry.set_status(id, DccStatus::Active, events);

    tokio::task::spawn_local(async move {
        while let Some(line) = rcv_out.recv().await {
            if write_half.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                return;
            }
        }
    });

    let mut parse_buf: Vec<u8> = Vec::with_capacity(1024);
    let mut read_buf = [0u8; 1024];
    loop {
        if registry.aborted(id) {
            return Ok(());
        }
        let n = read_half.read(&mut read_buf).await?;
        if n == 0 {
            break;
        }
        parse_buf.extend_from_slice(&read_buf[..n]);
        while let Some(line) = lattice_wire::next_line(&mut parse_buf) {
            let _ = events.try_send(DccEvent::ChatLine { id, line });
        }
    }
    registry.set_status(id, DccStatus::Done, events);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000)
    }

    #[test]
    fn status_is_monotone_into_terminal() {
        let mut t = Transfer::new(
            TransferId(0),
            DccDirection::Recv,
            DccKind::File,
            "peer",
            test_addr(),
            "f",
            Some(100),
        );
        assert!(t.set_status(DccStatus::Connecting));
        assert!(t.set_status(DccStatus::Active));
        assert!(t.set_status(DccStatus::Done));
        // Terminal: no way back.
        assert!(!t.set_status(DccStatus::Active));
        assert_eq!(t.status, DccStatus::Done);

        let mut t2 = Transfer::new(
            TransferId(1),
            DccDirection::Recv,
            DccKind::File,
            "peer",
            test_addr(),
            "f",
            None,
        );
        t2.set_status(DccStatus::Aborted);
        assert!(!t2.set_status(DccStatus::Done));
        assert_eq!(t2.status, DccStatus::Aborted);
    }

    #[test]
    fn pos_monotone_and_capped() {
        let mut t = Transfer::new(
            TransferId(0),
            DccDirection::Recv,
            DccKind::File,
            "peer",
            test_addr(),
            "f",
            Some(100),
        );
        t.advance_pos(40);
        t.advance_pos(30);
        assert_eq!(t.pos, 40);
        t.advance_pos(1000);
        assert_eq!(t.pos, 100);
    }

    #[test]
    fn offer_decision() {
        let config = DccConfig {
            auto_accept_max_size: 1000,
            auto_resume: true,
            ..DccConfig::default()
        };
        // Partial local file and resume on: ask for resume at its length.
        assert_eq!(
            decide_offer(&config, Some(1000), Some(400)),
            OfferAction::Resume(400)
        );
        // No local file: small enough to auto-accept.
        assert_eq!(decide_offer(&config, Some(1000), None), OfferAction::Accept);
        // Too big: wait for the user.
        assert_eq!(decide_offer(&config, Some(5000), None), OfferAction::Wait);
        // Unknown size never auto-accepts.
        assert_eq!(decide_offer(&config, None, None), OfferAction::Wait);

        // Resume off: existing file does not trigger a resume.
        let no_resume = DccConfig {
            auto_accept_max_size: 1000,
            auto_resume: false,
            ..DccConfig::default()
        };
        assert_eq!(
            decide_offer(&no_resume, Some(1000), Some(400)),
            OfferAction::Accept
        );
    }

    #[test]
    fn filename_sanitized() {
        assert_eq!(sanitize_filename("notes.txt"), "notes.txt");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("c:\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_filename(".."), "unnamed");
    }

    #[test]
    fn block_size_clamped() {
        let config = DccConfig {
            block_size: 64,
            ..DccConfig::default()
        };
        assert_eq!(config.clamped_block_size(), MIN_BLOCK_SIZE);
        let config = DccConfig {
            block_size: 10_000_000,
            ..DccConfig::default()
        };
        assert_eq!(config.clamped_block_size(), MAX_BLOCK_SIZE);
    }

    fn run_local<F: std::future::Future<Output = ()>>(fut: F) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let local = tokio::task::LocalSet::new();
        local.block_on(&runtime, fut);
    }

    async fn wait_for_status(
        rcv: &mut mpsc::Receiver<DccEvent>,
        want: DccStatus,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(ev) = rcv.recv().await {
                if let DccEvent::StatusChange { status, .. } = ev {
                    if status == want {
                        return;
                    }
                    assert!(
                        !status.is_terminal(),
                        "terminal status {:?} while waiting for {:?}",
                        status,
                        want
                    );
                }
            }
            panic!("event channel closed");
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", want));
    }

    // A partial local file plus auto-resume: the offer decision asks for a
    // resume, the ACCEPT confirmation starts the worker at the offset, and
    // the transfer finishes with the full file on disk.
    #[test]
    fn resume_flow_completes_partial_file() {
        run_local(async {
            let dir = std::env::temp_dir().join("lattice_dcc_resume_test");
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("foo"), vec![0xAA; 400]).unwrap();

            // Fake sender: owns the remaining 600 bytes.
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let acks_seen = Rc::new(RefCell::new(Vec::<u32>::new()));
            let acks_clone = acks_seen.clone();
            tokio::task::spawn_local(async move {
                let (mut sock, _) = listener.accept().await.unwrap();
                sock.write_all(&[0xBB; 600]).await.unwrap();
                let mut ack = [0u8; 4];
                loop {
                    match sock.read_exact(&mut ack).await {
                        Ok(_) => {
                            let total = u32::from_be_bytes(ack);
                            acks_clone.borrow_mut().push(total);
                            if total as u64 == 1000 {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                }
            });

            let config = DccConfig {
                download_dir: dir.clone(),
                auto_resume: true,
                auto_accept_max_size: 0,
                ..DccConfig::default()
            };
            let registry = DccRegistry::new();
            let (snd_ev, mut rcv_ev) = mpsc::channel(100);

            let (id, action) =
                registry.offer_recv_file(&config, "peer", "foo", addr, Some(1000));
            assert_eq!(action, OfferAction::Resume(400));

            // "DCC ACCEPT foo <port> 400" arrives; start receiving.
            let confirmed = registry.confirm_resume("foo", addr.port(), 400).unwrap();
            assert_eq!(confirmed, id);
            registry.start_recv_file(id, snd_ev);

            wait_for_status(&mut rcv_ev, DccStatus::Done).await;

            let info = registry.info(id).unwrap();
            assert_eq!(info.pos, 1000);
            assert_eq!(info.status, DccStatus::Done);
            let on_disk = std::fs::read(dir.join("foo")).unwrap();
            assert_eq!(on_disk.len(), 1000);
            assert_eq!(&on_disk[..400], &[0xAA; 400][..]);
            assert_eq!(&on_disk[400..], &[0xBB; 600][..]);
            // Ack totals count from the resume offset and end at the size.
            assert_eq!(acks_seen.borrow().last(), Some(&1000));

            let _ = std::fs::remove_dir_all(&dir);
        });
    }

    // Full offer/accept round between a sending and a receiving registry.
    #[test]
    fn send_and_receive_round_trip() {
        run_local(async {
            let dir = std::env::temp_dir().join("lattice_dcc_roundtrip_test");
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();
            let payload: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
            std::fs::write(dir.join("source.bin"), &payload).unwrap();

            let sender = DccRegistry::new();
            let (snd_send_ev, mut rcv_send_ev) = mpsc::channel(100);
            let (send_id, offer_payload) = sender
                .start_send_file(
                    "peer",
                    dir.join("source.bin"),
                    MIN_BLOCK_SIZE,
                    snd_send_ev,
                )
                .await
                .unwrap();

            // Receiver decodes the advertised offer.
            let offer = dcc_wire::parse(&offer_payload).unwrap();
            let dcc_wire::DccCmd::Send {
                filename,
                addr,
                size,
            } = offer
            else {
                panic!("expected a SEND offer, got {:?}", offer);
            };
            assert_eq!(filename, "source.bin");
            assert_eq!(size, Some(5000));
            // The listener is bound on the wildcard address; reach it over
            // loopback.
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port());

            let recv_dir = dir.join("downloads");
            std::fs::create_dir_all(&recv_dir).unwrap();
            let config = DccConfig {
                download_dir: recv_dir.clone(),
                auto_accept_max_size: 10_000,
                ..DccConfig::default()
            };
            let receiver = DccRegistry::new();
            let (snd_recv_ev, mut rcv_recv_ev) = mpsc::channel(100);
            let (recv_id, action) =
                receiver.offer_recv_file(&config, "peer", &filename, addr, size);
            assert_eq!(action, OfferAction::Accept);
            receiver.start_recv_file(recv_id, snd_recv_ev);

            wait_for_status(&mut rcv_recv_ev, DccStatus::Done).await;
            wait_for_status(&mut rcv_send_ev, DccStatus::Done).await;

            assert_eq!(
                std::fs::read(recv_dir.join("source.bin")).unwrap(),
                payload
            );
            assert_eq!(receiver.info(recv_id).unwrap().pos, 5000);
            assert_eq!(sender.info(send_id).unwrap().ack, 5000);

            let _ = std::fs::remove_dir_all(&dir);
        });
    }
}
