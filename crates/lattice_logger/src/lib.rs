//! Chat logs on disk: one file per buffer under the log directory, named
//! `<serv>.txt`, `<serv>_<chan>.txt`, `<serv>_<nick>.txt`. Files are opened
//! lazily and carry session header/footer lines. Lines tagged `no_log`
//! never reach this crate (the core filters them).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use lattice_common::{ChanName, ChanNameRef, MsgTarget};

#[macro_use]
extern crate log;

static TIME_FMT: &[FormatItem] = format_description!("[hour]:[minute]:[second]");
static SESSION_FMT: &[FormatItem] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Clone)]
pub struct Logger {
    inner: Rc<RefCell<LoggerInner>>,
}

#[derive(Debug)]
pub enum LoggerInitError {
    CouldNotCreateDir { dir_path: PathBuf, err: io::Error },
}

impl Logger {
    pub fn new(
        log_dir: PathBuf,
        report_err: Box<dyn Fn(String)>,
    ) -> Result<Logger, LoggerInitError> {
        Ok(Logger {
            inner: Rc::new(RefCell::new(LoggerInner::new(log_dir, report_err)?)),
        })
    }
}

macro_rules! delegate {
    ( $name:ident ( $( $x:ident: $t:ty, )* ) ) => {
        pub fn $name(&self, $($x: $t,)*) {
            self.inner.borrow_mut().$name( $( $x, )* )
        }
    }
}

impl Logger {
    delegate!(new_server_log(serv: &str,));
    delegate!(close_server_log(serv: &str,));
    delegate!(new_chan_log(serv: &str, chan: &ChanNameRef,));
    delegate!(close_chan_log(serv: &str, chan: &ChanNameRef,));
    delegate!(close_user_log(serv: &str, nick: &str,));
    delegate!(add_client_msg(msg: &str, target: &MsgTarget,));
    delegate!(add_msg(msg: &str, ts: OffsetDateTime, target: &MsgTarget,));
    delegate!(add_privmsg(
        sender: &str,
        msg: &str,
        ts: OffsetDateTime,
        target: &MsgTarget,
        is_action: bool,
    ));
    delegate!(add_nick(nick: &str, ts: OffsetDateTime, target: &MsgTarget,));
    delegate!(remove_nick(nick: &str, ts: OffsetDateTime, target: &MsgTarget,));
    delegate!(rename_nick(
        old_nick: &str,
        new_nick: &str,
        ts: OffsetDateTime,
        target: &MsgTarget,
    ));
    delegate!(set_topic(
        topic: &str,
        ts: OffsetDateTime,
        serv: &str,
        chan: &ChanNameRef,
    ));
}

struct LoggerInner {
    log_dir: PathBuf,
    servers: HashMap<String, ServerLogs>,
    report_err: Box<dyn Fn(String)>,
}

struct ServerLogs {
    fd: File,
    chans: HashMap<ChanName, File>,
    users: HashMap<String, File>,
}

impl Drop for LoggerInner {
    fn drop(&mut self) {
        for (_, server) in self.servers.drain() {
            close_all(server, &self.report_err);
        }
    }
}

fn strf(ts: &OffsetDateTime, fmt: &[FormatItem]) -> String {
    ts.format(fmt).unwrap_or_default()
}

fn print_header(fd: &mut File) -> io::Result<()> {
    writeln!(fd)?;
    writeln!(
        fd,
        "*** Logging started at {}",
        strf(&OffsetDateTime::now_utc(), SESSION_FMT)
    )?;
    writeln!(fd)
}

fn print_footer(fd: &mut File) -> io::Result<()> {
    writeln!(fd)?;
    writeln!(
        fd,
        "*** Logging ended at {}",
        strf(&OffsetDateTime::now_utc(), SESSION_FMT)
    )?;
    writeln!(fd)
}

macro_rules! report_io_err {
    ( $f:expr, $e:expr ) => {
        match $e {
            Err(err) => {
                info!("{:?}", err);
                $f(format!("{:?}", err));
                return;
            }
            Ok(ok) => ok,
        }
    };
}

// '/' is valid in channel names but not in file names.
fn replace_forward_slash(path: &str) -> String {
    path.replace('/', "-")
}

fn try_open_log_file(path: &Path, report_err: &dyn Fn(String)) -> Option<File> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(fd) => Some(fd),
        Err(err) => {
            report_err(format!("Couldn't open file {:?}: {}", path, err));
            None
        }
    }
}

fn close_all(server: ServerLogs, report_err: &dyn Fn(String)) {
    let ServerLogs {
        mut fd,
        chans,
        users,
    } = server;
    report_io_err!(report_err, print_footer(&mut fd));
    for (_, mut fd) in chans.into_iter() {
        report_io_err!(report_err, print_footer(&mut fd));
    }
    for (_, mut fd) in users.into_iter() {
        report_io_err!(report_err, print_footer(&mut fd));
    }
}

impl LoggerInner {
    fn new(
        log_dir: PathBuf,
        report_err: Box<dyn Fn(String)>,
    ) -> Result<LoggerInner, LoggerInitError> {
        if let Err(err) = fs::create_dir_all(&log_dir) {
            if err.kind() != io::ErrorKind::AlreadyExists {
                return Err(LoggerInitError::CouldNotCreateDir {
                    dir_path: log_dir,
                    err,
                });
            }
        }

        Ok(LoggerInner {
            log_dir,
            servers: HashMap::new(),
            report_err,
        })
    }

    fn new_server_log(&mut self, serv: &str) {
        if self.servers.contains_key(serv) {
            return;
        }

        let path = self.log_dir.join(format!("{}.txt", serv));
        if let Some(mut fd) = try_open_log_file(&path, &*self.report_err) {
            report_io_err!(self.report_err, print_header(&mut fd));
            self.servers.insert(
                serv.to_string(),
                ServerLogs {
                    fd,
                    chans: HashMap::new(),
                    users: HashMap::new(),
                },
            );
        }
    }

    fn close_server_log(&mut self, serv: &str) {
        match self.servers.remove(serv) {
            None => {
                info!("close_server_log: no server {:?}", serv);
            }
            Some(server) => {
                close_all(server, &self.report_err);
            }
        }
    }

    fn new_chan_log(&mut self, serv: &str, chan: &ChanNameRef) {
        let Some(server) = self.servers.get_mut(serv) else {
            info!("new_chan_log: no server {:?}", serv);
            return;
        };
        let chan_normalized = chan.normalized();
        if server
            .chans
            .contains_key(ChanNameRef::new(&chan_normalized))
        {
            return;
        }

        let path = self.log_dir.join(format!(
            "{}_{}.txt",
            serv,
            replace_forward_slash(&chan_normalized)
        ));
        if let Some(mut fd) = try_open_log_file(&path, &*self.report_err) {
            report_io_err!(self.report_err, print_header(&mut fd));
            server.chans.insert(ChanName::new(chan_normalized), fd);
        }
    }

    fn close_chan_log(&mut self, serv: &str, chan: &ChanNameRef) {
        let Some(server) = self.servers.get_mut(serv) else {
            return;
        };
        match server.chans.remove(chan) {
            None => {
                info!(
                    "close_chan_log: no chan {:?} in server {:?}",
                    chan.display(),
                    serv
                );
            }
            Some(mut fd) => {
                report_io_err!(self.report_err, print_footer(&mut fd));
            }
        }
    }

    fn close_user_log(&mut self, serv: &str, nick: &str) {
        let Some(server) = self.servers.get_mut(serv) else {
            return;
        };
        match server.users.remove(nick) {
            None => {
                info!("close_user_log: no user {:?} in server {:?}", nick, serv);
            }
            Some(mut fd) => {
                report_io_err!(self.report_err, print_footer(&mut fd));
            }
        }
    }

    fn add_client_msg(&mut self, msg: &str, target: &MsgTarget) {
        let now = strf(&OffsetDateTime::now_utc(), TIME_FMT);
        self.apply_to_target(target, |fd: &mut File, report_err: &dyn Fn(String)| {
            report_io_err!(report_err, writeln!(fd, "[{}] [client] {}", now, msg));
        });
    }

    fn add_msg(&mut self, msg: &str, ts: OffsetDateTime, target: &MsgTarget) {
        self.apply_to_target(target, |fd: &mut File, report_err: &dyn Fn(String)| {
            report_io_err!(report_err, writeln!(fd, "[{}] {}", strf(&ts, TIME_FMT), msg));
        });
    }

    fn add_privmsg(
        &mut self,
        sender: &str,
        msg: &str,
        ts: OffsetDateTime,
        target: &MsgTarget,
        is_action: bool,
    ) {
        self.apply_to_target(target, |fd: &mut File, report_err: &dyn Fn(String)| {
            let io_ret = if is_action {
                writeln!(fd, "[{}] {} {}", strf(&ts, TIME_FMT), sender, msg)
            } else {
                writeln!(fd, "[{}] {}: {}", strf(&ts, TIME_FMT), sender, msg)
            };
            report_io_err!(report_err, io_ret);
        });
    }

    fn add_nick(&mut self, nick: &str, ts: OffsetDateTime, target: &MsgTarget) {
        self.apply_to_target(target, |fd: &mut File, report_err: &dyn Fn(String)| {
            report_io_err!(
                report_err,
                writeln!(
                    fd,
                    "[{}] {} joined the channel.",
                    strf(&ts, TIME_FMT),
                    nick
                )
            );
        });
    }

    fn remove_nick(&mut self, nick: &str, ts: OffsetDateTime, target: &MsgTarget) {
        self.apply_to_target(target, |fd: &mut File, report_err: &dyn Fn(String)| {
            report_io_err!(
                report_err,
                writeln!(fd, "[{}] {} left.", strf(&ts, TIME_FMT), nick)
            );
        });
    }

    fn rename_nick(
        &mut self,
        old_nick: &str,
        new_nick: &str,
        ts: OffsetDateTime,
        target: &MsgTarget,
    ) {
        self.apply_to_target(target, |fd: &mut File, report_err: &dyn Fn(String)| {
            report_io_err!(
                report_err,
                writeln!(
                    fd,
                    "[{}] {} is now known as {}.",
                    strf(&ts, TIME_FMT),
                    old_nick,
                    new_nick
                )
            );
        });
    }

    fn set_topic(&mut self, topic: &str, ts: OffsetDateTime, serv: &str, chan: &ChanNameRef) {
        let target = MsgTarget::Chan { serv, chan };
        self.apply_to_target(&target, |fd: &mut File, report_err: &dyn Fn(String)| {
            report_io_err!(
                report_err,
                writeln!(fd, "[{}] Channel topic: {}", strf(&ts, TIME_FMT), topic)
            );
        });
    }

    fn apply_to_target(&mut self, target: &MsgTarget, f: impl Fn(&mut File, &dyn Fn(String))) {
        match *target {
            MsgTarget::Server { serv } => match self.servers.get_mut(serv) {
                None => {
                    info!("no server: {:?}", serv);
                }
                Some(ServerLogs { ref mut fd, .. }) => {
                    f(fd, &*self.report_err);
                }
            },
            MsgTarget::Chan { serv, chan } => match self.servers.get_mut(serv) {
                None => {
                    info!("no server: {:?}", serv);
                }
                Some(ServerLogs { ref mut chans, .. }) => match chans.get_mut(chan) {
                    None => {
                        // First line for this channel: open its file now.
                        let chan_normalized = chan.normalized();
                        let path = self.log_dir.join(format!(
                            "{}_{}.txt",
                            serv,
                            replace_forward_slash(&chan_normalized)
                        ));
                        if let Some(mut fd) = try_open_log_file(&path, &*self.report_err) {
                            report_io_err!(self.report_err, print_header(&mut fd));
                            f(&mut fd, &*self.report_err);
                            chans.insert(ChanName::new(chan_normalized), fd);
                        }
                    }
                    Some(fd) => {
                        f(fd, &*self.report_err);
                    }
                },
            },
            MsgTarget::User { serv, nick } => match self.servers.get_mut(serv) {
                None => {
                    info!("no server: {:?}", serv);
                }
                Some(ServerLogs { ref mut users, .. }) => match users.get_mut(nick) {
                    Some(fd) => {
                        f(fd, &*self.report_err);
                    }
                    None => {
                        // User log files are created on first message.
                        let path = self
                            .log_dir
                            .join(format!("{}_{}.txt", serv, replace_forward_slash(nick)));
                        if let Some(mut fd) = try_open_log_file(&path, &*self.report_err) {
                            report_io_err!(self.report_err, print_header(&mut fd));
                            f(&mut fd, &*self.report_err);
                            users.insert(nick.to_owned(), fd);
                        }
                    }
                },
            },
            MsgTarget::AllServBuffers { serv } => match self.servers.get_mut(serv) {
                None => {
                    info!("no server: {:?}", serv);
                }
                Some(ServerLogs {
                    ref mut fd,
                    ref mut chans,
                    ref mut users,
                }) => {
                    f(fd, &*self.report_err);
                    for (_, fd) in chans.iter_mut() {
                        f(fd, &*self.report_err);
                    }
                    for (_, fd) in users.iter_mut() {
                        f(fd, &*self.report_err);
                    }
                }
            },
            MsgTarget::CurrentBuffer => {
                // Command feedback; not logged.
            }
        }
    }
}
