//! `log` crate backend writing to a file instead of stderr. Filters come
//! from the `LATTICE_LOG` environment variable with `env_logger` syntax.
//! IO errors are swallowed; once installed the logger never panics. The
//! file is created on the first record.

use env_logger::filter::{self, Filter};
use log::{Log, Record};

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::mem::replace;
use std::path::PathBuf;
use std::sync::Mutex;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

static TS_FMT: &[FormatItem] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

pub(crate) fn init(path: PathBuf) {
    let filter = filter::Builder::from_env("LATTICE_LOG").build();
    let sink = Mutex::new(LazyFile::new(path));

    log::set_max_level(filter.filter());
    let _ = log::set_boxed_logger(Box::new(Logger { sink, filter }));
}

struct Logger {
    sink: Mutex<LazyFile>,
    filter: Filter,
}

impl Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.filter.matches(record) {
            return;
        }

        self.sink.lock().unwrap().with_file(|file| {
            let ts = OffsetDateTime::now_utc().format(TS_FMT).unwrap_or_default();
            let _ = writeln!(
                file,
                "[{}] {} [{}:{}] {}",
                ts,
                record.level(),
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.args()
            );
        });
    }

    fn flush(&self) {}
}

enum LazyFile {
    NotOpen(PathBuf),
    Open(File),
    Error,
}

impl LazyFile {
    fn new(path: PathBuf) -> Self {
        LazyFile::NotOpen(path)
    }

    fn with_file<F>(&mut self, f: F)
    where
        F: Fn(&mut File),
    {
        let mut file = match replace(self, LazyFile::Error) {
            LazyFile::NotOpen(path) => {
                match OpenOptions::new().create(true).append(true).open(path) {
                    Ok(mut file) => {
                        let ts = OffsetDateTime::now_utc().format(TS_FMT).unwrap_or_default();
                        let _ = writeln!(file, "\n*** Logging started at {}\n", ts);
                        file
                    }
                    Err(_) => {
                        return;
                    }
                }
            }
            LazyFile::Open(file) => file,
            LazyFile::Error => {
                return;
            }
        };

        f(&mut file);
        *self = LazyFile::Open(file);
    }
}
