//! The on-disk format: UTF-8 text, one `[section]` header per section,
//! `name = value` lines within. Comments (`#` or `;` first non-blank
//! character) and empty lines are ignored. Unknown options are warnings;
//! a malformed section header aborts the load with a positioned error.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::warn;
use thiserror::Error;

use crate::{ConfigFile, SetResult};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{path}:{line}: malformed section header {header:?}")]
    BadSectionHeader {
        path: PathBuf,
        line: usize,
        header: String,
    },
    #[error("can't read {path}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
}

/// A recoverable problem found while reading; load continues.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadWarning {
    UnknownSection { line: usize, section: String },
    UnknownOption { line: usize, option: String },
    BadValue { line: usize, option: String },
    OptionOutsideSection { line: usize },
}

impl ConfigFile {
    /// `read`: apply the contents of `path` to this file's options. Values
    /// are set without firing change callbacks (load is not a user change).
    pub fn read(&mut self, path: &Path) -> Result<Vec<LoadWarning>, LoadError> {
        let contents = fs::read_to_string(path).map_err(|err| LoadError::Io {
            path: path.to_owned(),
            err,
        })?;
        self.read_str(&contents, path)
    }

    pub(crate) fn read_str(
        &mut self,
        contents: &str,
        path: &Path,
    ) -> Result<Vec<LoadWarning>, LoadError> {
        let mut warnings = Vec::new();
        let mut current_section: Option<String> = None;

        for (line_idx, raw_line) in contents.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                match rest.strip_suffix(']') {
                    Some(name) if !name.is_empty() && !name.contains(['[', ']', ' ']) => {
                        if self.section(name).is_none() {
                            warn!("{}:{}: unknown section [{}]", path.display(), line_no, name);
                            warnings.push(LoadWarning::UnknownSection {
                                line: line_no,
                                section: name.to_owned(),
                            });
                            current_section = None;
                        } else {
                            current_section = Some(name.to_owned());
                        }
                        continue;
                    }
                    _ => {
                        return Err(LoadError::BadSectionHeader {
                            path: path.to_owned(),
                            line: line_no,
                            header: line.to_owned(),
                        });
                    }
                }
            }

            let Some((name, value)) = line.split_once('=') else {
                warnings.push(LoadWarning::BadValue {
                    line: line_no,
                    option: line.to_owned(),
                });
                continue;
            };
            let name = name.trim();
            let value = value.trim();

            let Some(section) = &current_section else {
                // Options before any recognised section header.
                warnings.push(LoadWarning::OptionOutsideSection { line: line_no });
                continue;
            };

            match self.set(section, name, value, false) {
                SetResult::Changed | SetResult::SameValue => {}
                SetResult::NotFound => {
                    warn!(
                        "{}:{}: unknown option {}.{}",
                        path.display(),
                        line_no,
                        section,
                        name
                    );
                    warnings.push(LoadWarning::UnknownOption {
                        line: line_no,
                        option: format!("{}.{}", section, name),
                    });
                }
                SetResult::Error => {
                    warn!(
                        "{}:{}: bad value {:?} for option {}.{}",
                        path.display(),
                        line_no,
                        value,
                        section,
                        name
                    );
                    warnings.push(LoadWarning::BadValue {
                        line: line_no,
                        option: format!("{}.{}", section, name),
                    });
                }
            }
        }

        Ok(warnings)
    }

    /// `write`: emit every section and every option, in declaration order.
    /// Options at their default are written too, to keep hand-editing
    /// discoverable.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let mut out = String::new();
        self.write_str(&mut out);
        let mut file = fs::File::create(path)?;
        file.write_all(out.as_bytes())
    }

    pub(crate) fn write_str(&self, out: &mut String) {
        out.push_str(&format!("# {}.conf\n", self.name()));
        for section in self.sections() {
            out.push('\n');
            out.push_str(&format!("[{}]\n", section.name()));
            for opt in section.options() {
                out.push_str(&format!("{} = {}\n", opt.name(), opt.value_str()));
            }
        }
    }

    /// `reload`: reset everything to defaults, then re-read the file, so the
    /// store ends up exactly as the file describes.
    pub fn reload(&mut self, path: &Path) -> Result<Vec<LoadWarning>, LoadError> {
        self.reset_all();
        self.read(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigOption;

    fn test_file() -> ConfigFile {
        let mut file = ConfigFile::new("test");
        file.new_section("look", false, false);
        file.new_option("look", ConfigOption::int("x", "", 0, 10, 1));
        file.new_option("look", ConfigOption::bool("beep", "", false));
        file.new_option("look", ConfigOption::string("prefix", "", "--"));
        file.new_section("alias", true, true);
        file
    }

    #[test]
    fn read_basic() {
        let mut file = test_file();
        let warnings = file
            .read_str(
                "# comment\n\n[look]\nx = 5\nbeep = on\nprefix = >>\n\n[alias]\nj = join\n",
                Path::new("test.conf"),
            )
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(file.get_int("look", "x"), 5);
        assert!(file.get_bool("look", "beep"));
        assert_eq!(file.get_str("look", "prefix"), Some(">>".to_owned()));
        assert_eq!(file.get_str("alias", "j"), Some("join".to_owned()));
    }

    #[test]
    fn read_warnings() {
        let mut file = test_file();
        let warnings = file
            .read_str(
                "[look]\nx = 99\nnope = 1\n[mystery]\nfoo = bar\n",
                Path::new("test.conf"),
            )
            .unwrap();
        assert_eq!(warnings.len(), 4);
        assert!(matches!(warnings[0], LoadWarning::BadValue { line: 2, .. }));
        assert!(matches!(
            warnings[1],
            LoadWarning::UnknownOption { line: 3, .. }
        ));
        assert!(matches!(
            warnings[2],
            LoadWarning::UnknownSection { line: 4, .. }
        ));
        // The option under the unknown section has no home either.
        assert!(matches!(
            warnings[3],
            LoadWarning::OptionOutsideSection { line: 5 }
        ));
        // Bad value left the stored value alone.
        assert_eq!(file.get_int("look", "x"), 1);
    }

    #[test]
    fn read_bad_header_aborts() {
        let mut file = test_file();
        let err = file
            .read_str("[look]\nx = 2\n[broken\ny = 3\n", Path::new("test.conf"))
            .unwrap_err();
        match err {
            LoadError::BadSectionHeader { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn write_then_reload_round_trips() {
        let mut file = test_file();
        file.set("look", "x", "5", false);
        file.set("alias", "j", "join", false);

        let mut out = String::new();
        file.write_str(&mut out);
        assert!(out.contains("[look]\n"));
        assert!(out.contains("x = 5\n"));
        // Defaults are written too.
        assert!(out.contains("beep = off\n"));
        assert!(out.contains("[alias]\nj = join\n"));

        // A second store reading the same text converges.
        let mut file2 = test_file();
        file2.read_str(&out, Path::new("test.conf")).unwrap();
        assert_eq!(file2.get_int("look", "x"), 5);
        assert_eq!(file2.get_str("alias", "j"), Some("join".to_owned()));
    }

    #[test]
    fn set_survives_reload_of_written_file() {
        // Set to 5, try to set garbage (rejected), write, reload: still 5.
        let dir = std::env::temp_dir().join("lattice_config_reload_test");
        let _ = fs::create_dir_all(&dir);
        let path = dir.join("test.conf");

        let mut file = test_file();
        assert_eq!(file.set("look", "x", "5", true), SetResult::Changed);
        assert_eq!(file.set("look", "x", "abc", true), SetResult::Error);
        assert_eq!(file.get_int("look", "x"), 5);

        file.write(&path).unwrap();
        file.reload(&path).unwrap();
        assert_eq!(file.get_int("look", "x"), 5);

        let _ = fs::remove_dir_all(&dir);
    }
}
