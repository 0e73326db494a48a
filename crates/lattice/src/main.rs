#![allow(clippy::zero_prefixed_literal)]

//! The launcher: loads config, builds the runtime aggregate, spawns one
//! session per configured server plus the relay listeners, and drives the
//! hook registry's timers until `/quit`.

mod buffers;
mod cli;
mod cmd;
mod conn;
mod debug_logging;
mod runtime;
mod scripts;
mod settings;

#[cfg(test)]
mod tests;

use lattice_client::{Client, ServerConfig};
use lattice_common::{ChanName, ChanNameRef};
use lattice_core::{Core, InfolistField, SignalData};
use lattice_logger::Logger;
use lattice_relay::{ClientRegistry, Face, RelayConfig, RelayServer, Upstream};
use settings::Settings;

use std::cell::RefCell;
use std::path::PathBuf;
use std::process::exit;
use std::rc::Rc;

use tokio::sync::mpsc;

#[macro_use]
extern crate log;

/// Everything the command handlers and event tasks share. Cheap to clone;
/// all state is behind `Rc`.
#[derive(Clone)]
pub(crate) struct App {
    pub(crate) core: Core,
    pub(crate) logger: Option<Logger>,
    pub(crate) clients: Rc<RefCell<Vec<Client>>>,
    pub(crate) settings: Rc<Settings>,
    pub(crate) scripts: scripts::ScriptsHandle,
    shutdown_tx: mpsc::Sender<Option<String>>,
}

impl App {
    pub(crate) fn find_client(&self, serv: &str) -> Option<Client> {
        self.clients
            .borrow()
            .iter()
            .find(|c| c.name() == serv)
            .cloned()
    }

    /// Start a session and its event task; opens the server buffer.
    pub(crate) fn spawn_session(&self, config: ServerConfig) {
        let serv = config.name.clone();
        buffers::server_buffer(self, &serv);
        let (client, rcv_ev) = Client::new(config);
        self.clients.borrow_mut().push(client.clone());
        tokio::task::spawn_local(conn::task(rcv_ev, self.clone(), Box::new(client)));
    }

    /// `/quit`: final push event for relay clients, QUIT to every server,
    /// then stop the runtime.
    pub(crate) fn shutdown(&self, reason: Option<String>) {
        self.core.emit_signal("quit", SignalData::None);
        for client in self.clients.borrow_mut().iter_mut() {
            client.quit(reason.clone());
        }
        let _ = self.shutdown_tx.try_send(reason);
    }
}

/// The relay's view of the session list.
struct UpstreamView {
    clients: Rc<RefCell<Vec<Client>>>,
}

impl UpstreamView {
    fn find(&self, serv: &str) -> Option<Client> {
        self.clients
            .borrow()
            .iter()
            .find(|c| c.name() == serv)
            .cloned()
    }
}

impl Upstream for UpstreamView {
    fn serv_names(&self) -> Vec<String> {
        self.clients
            .borrow()
            .iter()
            .map(|c| c.name().to_owned())
            .collect()
    }

    fn is_registered(&self, serv: &str) -> bool {
        self.find(serv).map(|c| c.is_registered()).unwrap_or(false)
    }

    fn nick(&self, serv: &str) -> String {
        self.find(serv).map(|c| c.get_nick()).unwrap_or_default()
    }

    fn joined_chans(&self, serv: &str) -> Vec<ChanName> {
        self.find(serv)
            .map(|c| c.joined_chans())
            .unwrap_or_default()
    }

    fn chan_nicks_with_prefix(&self, serv: &str, chan: &ChanNameRef) -> Vec<String> {
        let Some(snapshot) = self.find(serv).and_then(|c| c.chan_snapshot(chan)) else {
            return Vec::new();
        };
        let mut nicks: Vec<String> = snapshot
            .nicks
            .iter()
            .map(|n| match n.prefix_char() {
                Some(prefix) => format!("{}{}", prefix, n.nick),
                None => n.nick.clone(),
            })
            .collect();
        nicks.sort_unstable_by_key(|n| n.trim_start_matches(['~', '&', '@', '%', '+']).to_lowercase());
        nicks
    }

    fn isupport_tokens(&self, serv: &str) -> Vec<String> {
        self.find(serv)
            .map(|c| c.isupport_tokens())
            .unwrap_or_default()
    }

    fn send_raw(&self, serv: &str, line: &str) {
        match self.find(serv) {
            Some(mut client) => client.raw_msg(line),
            None => warn!("relay: raw line for unknown server {}", serv),
        }
    }
}

fn main() {
    let cli::Args { home } = cli::parse();
    let home = home.unwrap_or_else(default_home);

    if let Err(err) = create_home(&home) {
        eprintln!("Can't create home directory {:?}: {}", home, err);
        exit(1);
    }

    debug_logging::init(home.join("lattice.log"));

    let settings = match Settings::load(&home) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Configuration error: {}", err);
            exit(1);
        }
    };

    run(home, settings);
}

fn default_home() -> PathBuf {
    match dirs::home_dir() {
        Some(mut home) => {
            home.push(".lattice");
            home
        }
        None => PathBuf::from(".lattice"),
    }
}

fn create_home(home: &PathBuf) -> std::io::Result<()> {
    std::fs::create_dir_all(home)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(home, perms)?;
    }
    Ok(())
}

fn run(home: PathBuf, settings: Settings) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async move {
        let core = Core::new();
        settings.apply_to_core(&core);

        let logger = Logger::new(
            home.join("logs"),
            Box::new(|err| warn!("chat logger: {}", err)),
        )
        .ok();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<Option<String>>(1);

        let app = App {
            core: core.clone(),
            logger,
            clients: Rc::new(RefCell::new(Vec::new())),
            settings: Rc::new(settings),
            scripts: Rc::new(RefCell::new(scripts::Scripts::default())),
            shutdown_tx,
        };

        // Commands declared `needs_connection` check the buffer's server.
        let clients = app.clients.clone();
        let core_clone = core.clone();
        core.set_conn_checker(Rc::new(move |buffer| {
            let serv = core_clone
                .with_buffer(buffer, |b| b.local_vars.get("server").cloned())
                .flatten();
            match serv {
                Some(serv) => clients
                    .borrow()
                    .iter()
                    .find(|c| c.name() == serv)
                    .map(|c| c.is_registered())
                    .unwrap_or(false),
                None => false,
            }
        }));

        cmd::register_commands(&app);
        register_info_hooks(&app);

        // Sessions.
        if app.settings.autoconnect() {
            for server in app.settings.servers() {
                app.spawn_session(server);
            }
        }

        // Relay listeners.
        let registry = ClientRegistry::new();
        let upstream: Rc<dyn Upstream> = Rc::new(UpstreamView {
            clients: app.clients.clone(),
        });
        let irc_port = app.settings.relay_irc_port();
        if irc_port != 0 {
            let config = RelayConfig {
                face: Face::Irc,
                serv: app.settings.relay_irc_server(),
                password: app.settings.relay_password(),
                auth_timeout: app.settings.relay_auth_timeout(),
                ..RelayConfig::default()
            };
            let server = RelayServer::new(core.clone(), upstream.clone(), registry.clone(), config);
            if let Err(err) = server.bind(&format!("0.0.0.0:{}", irc_port)).await {
                error!("{}", err);
            }
        }
        let api_port = app.settings.relay_api_port();
        if api_port != 0 {
            let config = RelayConfig {
                face: Face::Api,
                serv: String::new(),
                password: app.settings.relay_password(),
                auth_timeout: app.settings.relay_auth_timeout(),
                ..RelayConfig::default()
            };
            let server = RelayServer::new(core.clone(), upstream.clone(), registry.clone(), config);
            if let Err(err) = server.bind(&format!("0.0.0.0:{}", api_port)).await {
                error!("{}", err);
            }
        }

        // Sweep disconnected relay clients once a minute and refresh the
        // clients buffer.
        let registry_clone = registry.clone();
        let clients_buf = lattice_relay::irc::clients_buffer(&core);
        core.hook_timer(
            None,
            std::time::Duration::from_secs(60),
            0,
            0,
            Rc::new(move |core, _| {
                let purged = registry_clone.purge();
                if purged > 0 {
                    debug!("relay: purged {} clients", purged);
                }
                if let Some(buf) = clients_buf {
                    core.buffer_clear(buf);
                    for c in registry_clone.snapshot() {
                        core.print_tagged(
                            buf,
                            "",
                            &format!(
                                "{} {:?} {} {:?} sent {} recv {}",
                                c.id, c.face, c.addr, c.status, c.bytes_sent, c.bytes_recv
                            ),
                            &["no_log"],
                            false,
                        );
                    }
                }
            }),
        );

        scripts::autoload(&app.scripts, &home);

        tokio::task::spawn_local(runtime::timer_task(core.clone()));
        tokio::task::spawn_local(runtime::fd_task(app.clone()));

        // Ctrl-C behaves like /quit.
        let app_clone = app.clone();
        tokio::task::spawn_local(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                app_clone.shutdown(None);
            }
        });

        let _reason = shutdown_rx.recv().await;
        // Give the sessions a beat to flush their QUIT lines.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        app.settings.save();
    });
}

/// Built-in info/infolist providers.
fn register_info_hooks(app: &App) {
    app.core.hook_info(
        None,
        "version",
        Rc::new(|_, _| Some(env!("CARGO_PKG_VERSION").to_owned())),
    );

    let clients = app.clients.clone();
    app.core.hook_info(
        None,
        "irc_nick",
        Rc::new(move |_, serv| {
            clients
                .borrow()
                .iter()
                .find(|c| c.name() == serv)
                .map(|c| c.get_nick())
        }),
    );

    app.core.hook_info(
        None,
        "irc_is_channel",
        Rc::new(|_, target| {
            let is_chan = target.starts_with(['#', '&', '+', '!']);
            Some(if is_chan { "1" } else { "0" }.to_owned())
        }),
    );

    // Fields of every parsed IRC line, for scripts.
    app.core.hook_info(
        None,
        "irc_parse_message",
        Rc::new(|_, line| {
            let msg = lattice_wire::parse_one_message(line).ok()?;
            let host = msg
                .pfx
                .as_ref()
                .map(|p| p.display())
                .unwrap_or_default();
            Some(format!("host={} cmd={:?}", host, msg.cmd))
        }),
    );

    let clients = app.clients.clone();
    app.core.hook_infolist(
        None,
        "irc_server",
        Rc::new(move |_, _| {
            clients
                .borrow()
                .iter()
                .map(|c| {
                    vec![
                        ("name".to_owned(), InfolistField::Str(c.name().to_owned())),
                        (
                            "is_connected".to_owned(),
                            InfolistField::Int(i64::from(c.is_registered())),
                        ),
                        ("nick".to_owned(), InfolistField::Str(c.get_nick())),
                        (
                            "lag_ms".to_owned(),
                            InfolistField::Int(c.lag_ms().map(|l| l as i64).unwrap_or(-1)),
                        ),
                    ]
                })
                .collect()
        }),
    );

    let core = app.core.clone();
    app.core.hook_infolist(
        None,
        "buffer",
        Rc::new(move |_, _| {
            core.buffer_ids()
                .into_iter()
                .filter_map(|id| {
                    core.with_buffer(id, |b| {
                        vec![
                            ("id".to_owned(), InfolistField::Int(b.id.0 as i64)),
                            ("full_name".to_owned(), InfolistField::Str(b.full_name())),
                            (
                                "lines".to_owned(),
                                InfolistField::Int(b.lines.len() as i64),
                            ),
                        ]
                    })
                })
                .collect()
        }),
    );
}
