//! Option tables for the two config files and the glue that feeds option
//! values into the core and the sessions. Servers are declared in the
//! user-addable `[servers]` section of `irc.conf`, one option per server:
//!
//! ```text
//! [servers]
//! libera = irc.libera.chat:6697 tls=on nicks=ada,ada_ join=#lattice
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use lattice_client::dcc::DccConfig;
use lattice_client::ServerConfig;
use lattice_common::ChanName;
use lattice_config::{ConfigFile, ConfigOption, LoadError, OptionValue};
use lattice_core::Core;

use log::warn;

pub(crate) struct Settings {
    pub(crate) home: PathBuf,
    pub(crate) main: Rc<RefCell<ConfigFile>>,
    pub(crate) irc: Rc<RefCell<ConfigFile>>,
}

/// Declare `lattice.conf`.
fn build_main_file() -> ConfigFile {
    let mut file = ConfigFile::new("lattice");

    file.new_section("look", false, false);
    file.new_option(
        "look",
        ConfigOption::bool(
            "strip_incoming_colors",
            "strip color/formatting codes from incoming messages",
            false,
        ),
    );
    file.new_option(
        "look",
        ConfigOption::string(
            "highlight",
            "comma-separated highlight patterns (whole word, * wildcard)",
            "",
        ),
    );

    file.new_section("history", false, false);
    file.new_option(
        "history",
        ConfigOption::int(
            "max_commands",
            "max entries kept per buffer and in global history",
            0,
            10000,
            100,
        ),
    );

    // Aliases: each option is `name = expansion`.
    file.new_section("alias", true, true);
    file.set("alias", "j", "join", false);
    file.set("alias", "q", "query", false);

    file
}

/// Declare `irc.conf`.
fn build_irc_file() -> ConfigFile {
    let mut file = ConfigFile::new("irc");

    file.new_section("server_default", false, false);
    file.new_option(
        "server_default",
        ConfigOption::string("nicks", "nicks to try, in order", "lattice,lattice_"),
    );
    file.new_option(
        "server_default",
        ConfigOption::string("username", "username for USER registration", "lattice"),
    );
    file.new_option(
        "server_default",
        ConfigOption::string("realname", "real name for USER registration", "lattice user"),
    );
    file.new_option(
        "server_default",
        ConfigOption::bool("autoconnect", "connect to all servers at startup", true),
    );
    file.new_option(
        "server_default",
        ConfigOption::bool("autoreconnect", "reconnect after a connection loss", true),
    );
    file.new_option(
        "server_default",
        ConfigOption::int(
            "reconnect_delay",
            "seconds to wait before reconnecting",
            1,
            3600,
            30,
        ),
    );
    file.new_option(
        "server_default",
        ConfigOption::int(
            "command_delay",
            "seconds to wait after registration before on-connect commands",
            0,
            60,
            0,
        ),
    );
    file.new_option(
        "server_default",
        ConfigOption::int(
            "ping_interval",
            "idle seconds before a lag-probe ping; twice this disconnects",
            10,
            3600,
            60,
        ),
    );

    file.new_section("servers", true, true);

    file.new_section("dcc", false, false);
    file.new_option(
        "dcc",
        ConfigOption::string("download_dir", "where received files land", "dcc"),
    );
    file.new_option(
        "dcc",
        ConfigOption::int(
            "auto_accept_max_size",
            "auto-accept files up to this many bytes (0 = never)",
            0,
            i64::MAX,
            0,
        ),
    );
    file.new_option(
        "dcc",
        ConfigOption::bool("auto_resume", "resume partial files automatically", false),
    );
    file.new_option(
        "dcc",
        ConfigOption::bool(
            "auto_rename",
            "suffix .1, .2, ... instead of overwriting local files",
            true,
        ),
    );
    file.new_option(
        "dcc",
        ConfigOption::int(
            "block_size",
            "send block size in bytes",
            1024,
            102400,
            65536,
        ),
    );

    file.new_section("relay", false, false);
    file.new_option(
        "relay",
        ConfigOption::string("password", "shared password for relay clients", ""),
    );
    file.new_option(
        "relay",
        ConfigOption::int("irc_port", "IRC-face listener port (0 = off)", 0, 65535, 0),
    );
    file.new_option(
        "relay",
        ConfigOption::string("irc_server", "server the IRC face mirrors", ""),
    );
    file.new_option(
        "relay",
        ConfigOption::int("api_port", "API-face listener port (0 = off)", 0, 65535, 0),
    );
    file.new_option(
        "relay",
        ConfigOption::int(
            "auth_timeout",
            "seconds a client may take to authenticate",
            5,
            300,
            30,
        ),
    );

    file
}

impl Settings {
    /// Build the option tables and read both files (creating them with
    /// defaults on first run). A hard parse error aborts startup.
    pub(crate) fn load(home: &Path) -> Result<Settings, LoadError> {
        let mut main = build_main_file();
        let mut irc = build_irc_file();

        for (file, name) in [(&mut main, "lattice.conf"), (&mut irc, "irc.conf")] {
            let path = home.join(name);
            if path.exists() {
                for warning in file.read(&path)? {
                    warn!("{}: {:?}", name, warning);
                }
            } else if let Err(err) = file.write(&path) {
                warn!("can't write default {}: {}", name, err);
            }
        }

        Ok(Settings {
            home: home.to_owned(),
            main: Rc::new(RefCell::new(main)),
            irc: Rc::new(RefCell::new(irc)),
        })
    }

    /// Persist both files.
    pub(crate) fn save(&self) {
        for (file, name) in [(&self.main, "lattice.conf"), (&self.irc, "irc.conf")] {
            let path = self.home.join(name);
            if let Err(err) = file.borrow().write(&path) {
                warn!("can't save {}: {}", name, err);
            }
        }
    }

    /// Push the option values the core consumes, and install the alias
    /// resolver backed by the `[alias]` section.
    pub(crate) fn apply_to_core(&self, core: &Core) {
        let main = self.main.borrow();
        core.set_strip_incoming_colors(main.get_bool("look", "strip_incoming_colors"));
        core.set_highlight_patterns(split_list(
            &main.get_str("look", "highlight").unwrap_or_default(),
        ));
        core.set_history_max(main.get_int("history", "max_commands") as usize);
        drop(main);

        let main = self.main.clone();
        core.set_alias_resolver(Rc::new(move |name| {
            main.borrow()
                .search("alias", name)
                .map(|opt| opt.value_str())
        }));
    }

    pub(crate) fn dcc_config(&self) -> DccConfig {
        let irc = self.irc.borrow();
        let dir = irc.get_str("dcc", "download_dir").unwrap_or_default();
        let download_dir = if Path::new(&dir).is_absolute() {
            PathBuf::from(dir)
        } else {
            self.home.join(dir)
        };
        DccConfig {
            download_dir,
            auto_accept_max_size: irc.get_int("dcc", "auto_accept_max_size") as u64,
            auto_resume: irc.get_bool("dcc", "auto_resume"),
            auto_rename: irc.get_bool("dcc", "auto_rename"),
            block_size: irc.get_int("dcc", "block_size") as usize,
        }
    }

    /// All configured servers, resolved against `[server_default]`.
    pub(crate) fn servers(&self) -> Vec<ServerConfig> {
        let irc = self.irc.borrow();
        let Some(section) = irc.section("servers") else {
            return Vec::new();
        };
        section
            .options()
            .filter_map(|opt| {
                let spec = opt.value_str();
                match parse_server_spec(opt.name(), &spec, &irc, self.dcc_config()) {
                    Some(server) => Some(server),
                    None => {
                        warn!("servers.{}: can't parse {:?}", opt.name(), spec);
                        None
                    }
                }
            })
            .collect()
    }

    pub(crate) fn autoconnect(&self) -> bool {
        self.irc.borrow().get_bool("server_default", "autoconnect")
    }

    pub(crate) fn relay_password(&self) -> String {
        self.irc
            .borrow()
            .get_str("relay", "password")
            .unwrap_or_default()
    }

    pub(crate) fn relay_auth_timeout(&self) -> Duration {
        Duration::from_secs(self.irc.borrow().get_int("relay", "auth_timeout") as u64)
    }

    pub(crate) fn relay_irc_port(&self) -> u16 {
        self.irc.borrow().get_int("relay", "irc_port") as u16
    }

    pub(crate) fn relay_irc_server(&self) -> String {
        self.irc
            .borrow()
            .get_str("relay", "irc_server")
            .unwrap_or_default()
    }

    pub(crate) fn relay_api_port(&self) -> u16 {
        self.irc.borrow().get_int("relay", "api_port") as u16
    }
}

pub(crate) fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

/// One server line: `addr:port [key=value]...`. Recognised keys: `nicks`,
/// `join`, `tls`, `pass`, `username`, `realname`; a trailing
/// `connect=<cmd>[;<cmd>...]` consumes the rest of the line (on-connect
/// commands may contain spaces).
pub(crate) fn parse_server_spec(
    name: &str,
    spec: &str,
    irc: &ConfigFile,
    dcc: DccConfig,
) -> Option<ServerConfig> {
    let (spec, connect_tail) = match spec.split_once("connect=") {
        Some((head, tail)) => (head, Some(tail)),
        None => (spec, None),
    };
    let mut words = spec.split_whitespace();
    let addr_port = words.next()?;
    let (addr, port) = match addr_port.rsplit_once(':') {
        Some((addr, port)) => (addr.to_owned(), port.parse().ok()?),
        None => (addr_port.to_owned(), 6667),
    };

    let mut config = ServerConfig {
        name: name.to_owned(),
        addr,
        port,
        tls: false,
        connector: None,
        pass: None,
        nicks: split_list(
            &irc.get_str("server_default", "nicks")
                .unwrap_or_default(),
        ),
        username: irc
            .get_str("server_default", "username")
            .unwrap_or_default(),
        realname: irc
            .get_str("server_default", "realname")
            .unwrap_or_default(),
        auto_join: Vec::new(),
        on_connect_cmds: Vec::new(),
        command_delay: Duration::from_secs(
            irc.get_int("server_default", "command_delay") as u64
        ),
        reconnect: irc.get_bool("server_default", "autoreconnect"),
        reconnect_delay: Duration::from_secs(
            irc.get_int("server_default", "reconnect_delay") as u64
        ),
        ping_interval: Duration::from_secs(
            irc.get_int("server_default", "ping_interval") as u64
        ),
        dcc,
    };

    for word in words {
        let Some((key, value)) = word.split_once('=') else {
            warn!("servers.{}: ignoring token {:?}", name, word);
            continue;
        };
        match key {
            "nicks" => config.nicks = split_list(value),
            "join" => {
                config.auto_join = split_list(value)
                    .into_iter()
                    .map(ChanName::new)
                    .collect()
            }
            "tls" => config.tls = value.eq_ignore_ascii_case("on"),
            "pass" => config.pass = Some(value.to_owned()),
            "username" => config.username = value.to_owned(),
            "realname" => config.realname = value.to_owned(),
            other => warn!("servers.{}: unknown key {:?}", name, other),
        }
    }

    if let Some(tail) = connect_tail {
        config.on_connect_cmds = tail
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect();
    }

    if config.nicks.is_empty() {
        return None;
    }
    Some(config)
}

/// Forward a stored option change into the core's `config` hooks.
pub(crate) fn notify_change(core: &Core, full_name: &str, value: &OptionValue) {
    let rendered = match value {
        OptionValue::Bool(true) => "on".to_owned(),
        OptionValue::Bool(false) => "off".to_owned(),
        OptionValue::Int(n) => n.to_string(),
        OptionValue::Enum(idx) => idx.to_string(),
        OptionValue::Color(c) => c.to_string(),
        OptionValue::Str(Some(s)) => s.clone(),
        OptionValue::Str(None) => "null".to_owned(),
    };
    core.notify_config_change(full_name, &rendered);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_spec_parsing() {
        let irc = build_irc_file();
        let spec = "irc.example.net:6697 tls=on nicks=ada,ada_ join=#a,#b pass=pw connect=/msg x y;/mode z";
        let server = parse_server_spec("example", spec, &irc, DccConfig::default()).unwrap();
        assert_eq!(server.addr, "irc.example.net");
        assert_eq!(server.port, 6697);
        assert!(server.tls);
        assert_eq!(server.nicks, vec!["ada", "ada_"]);
        assert_eq!(server.auto_join.len(), 2);
        assert_eq!(server.pass.as_deref(), Some("pw"));
        assert_eq!(server.on_connect_cmds, vec!["/msg x y", "/mode z"]);

        // Defaults kick in when keys are absent.
        let server = parse_server_spec("bare", "irc.other.net", &irc, DccConfig::default()).unwrap();
        assert_eq!(server.port, 6667);
        assert_eq!(server.nicks, vec!["lattice", "lattice_"]);
        assert!(server.reconnect);
    }

    #[test]
    fn config_files_round_trip_through_disk_format() {
        let dir = std::env::temp_dir().join("lattice_settings_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        // First load writes defaults; second load reads them back.
        let settings = Settings::load(&dir).unwrap();
        settings
            .irc
            .borrow_mut()
            .set("servers", "example", "irc.example.net:6697 tls=on", true);
        settings.save();

        let settings2 = Settings::load(&dir).unwrap();
        let servers = settings2.servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "example");
        assert!(servers[0].tls);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn alias_resolver_reads_alias_section() {
        let core = Core::new();
        let dir = std::env::temp_dir().join("lattice_settings_alias_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let settings = Settings::load(&dir).unwrap();
        settings.apply_to_core(&core);
        settings
            .main
            .borrow_mut()
            .set("alias", "hi", "msg bob hello", true);

        // Dispatching the alias reaches the expanded command.
        assert_eq!(
            dispatch_alias(&core, "probe1", "/j #chan", "join").as_deref(),
            Some("join #chan")
        );
        assert_eq!(
            dispatch_alias(&core, "probe2", "/hi", "msg").as_deref(),
            Some("msg bob hello")
        );
        assert_eq!(dispatch_alias(&core, "probe3", "/nope", "never"), None);

        let _ = std::fs::remove_dir_all(&dir);
    }

    /// Send `input` on a scratch buffer with a probe command registered as
    /// `expect_cmd`; returns the full command line the probe saw.
    fn dispatch_alias(
        core: &Core,
        scratch: &str,
        input: &str,
        expect_cmd: &str,
    ) -> Option<String> {
        use lattice_core::{BufferKind, HookStatus};
        let hit: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
        let hit_clone = hit.clone();
        let buffer = core
            .buffer_new("test", scratch, BufferKind::Formatted)
            .unwrap();
        let hook = core.hook_command(
            None,
            0,
            lattice_core::CommandSpec {
                name: expect_cmd.to_owned(),
                description: String::new(),
                usage: String::new(),
                completion: String::new(),
                min_args: 0,
                max_args: None,
                needs_connection: false,
            },
            Rc::new(move |_, ctx| {
                *hit_clone.borrow_mut() = Some(ctx.argv_eol[0].clone());
                HookStatus::Ok
            }),
        );
        core.input(buffer, input, None);
        core.unhook(hook);
        core.buffer_close(buffer);
        let result = hit.borrow().clone();
        result
    }
}
