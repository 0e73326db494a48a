//! The option store: named, typed options organised in sections in files,
//! with validation, change callbacks and a line-oriented on-disk format.
//!
//! A [`ConfigFile`] owns an ordered list of [`Section`]s; each section owns
//! its options. Options are only mutated through [`ConfigFile::set`] (and
//! friends), which parses the raw value to the option's type, runs the
//! check callback, stores, and fires the change callback. Sections may be
//! user-addable, in which case unknown options encountered in `set` or on
//! disk are created on the fly (this is how command aliases are stored).
//!
//! Callbacks must not re-enter the store; consumers that need to react by
//! mutating options queue the reaction and apply it after the call returns.

use std::rc::Rc;

pub mod file;
pub mod value;

pub use file::{LoadError, LoadWarning};
pub use value::{Constraint, OptionType, OptionValue};

/// Result of [`ConfigFile::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetResult {
    /// Value parsed, validated and stored; differs from the previous value.
    Changed,
    /// Parsed value equals the current one; no callback fired.
    SameValue,
    /// Parse failure, constraint violation, or check callback rejection.
    Error,
    /// No such section/option and the section does not allow creation.
    NotFound,
}

/// Result of [`ConfigFile::unset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsetResult {
    /// Option was already at its default.
    NoReset,
    /// Option reset to its default value.
    Reset,
    /// Option removed entirely (user-deletable section).
    Removed,
    /// No such option.
    Error,
}

/// Fired after a value actually changed: (full name, new value).
pub type ChangeCb = Rc<dyn Fn(&str, &OptionValue)>;
/// Invoked before storing: return false to reject the raw value.
pub type CheckCb = Rc<dyn Fn(&str) -> bool>;
/// Fired when an option is removed from a user-deletable section.
pub type DeleteCb = Rc<dyn Fn(&str)>;
/// Creates an option for a user-added name in a dynamic section.
pub type CreateOptionCb = Rc<dyn Fn(&str, &str) -> ConfigOption>;

pub struct ConfigOption {
    name: String,
    description: String,
    value: OptionValue,
    default: OptionValue,
    constraint: Constraint,
    null_allowed: bool,
    check_cb: Option<CheckCb>,
    change_cb: Option<ChangeCb>,
    delete_cb: Option<DeleteCb>,
}

impl ConfigOption {
    pub fn new(
        name: &str,
        description: &str,
        default: OptionValue,
        constraint: Constraint,
    ) -> ConfigOption {
        ConfigOption {
            name: name.to_owned(),
            description: description.to_owned(),
            value: default.clone(),
            default,
            constraint,
            null_allowed: false,
            check_cb: None,
            change_cb: None,
            delete_cb: None,
        }
    }

    /// Shorthand for the common cases.
    pub fn bool(name: &str, description: &str, default: bool) -> ConfigOption {
        ConfigOption::new(
            name,
            description,
            OptionValue::Bool(default),
            Constraint::None,
        )
    }

    pub fn int(name: &str, description: &str, min: i64, max: i64, default: i64) -> ConfigOption {
        ConfigOption::new(
            name,
            description,
            OptionValue::Int(default),
            Constraint::Range { min, max },
        )
    }

    pub fn enum_str(name: &str, description: &str, values: &[&str], default: usize) -> ConfigOption {
        ConfigOption::new(
            name,
            description,
            OptionValue::Enum(default),
            Constraint::Enum(values.iter().map(|s| s.to_string()).collect()),
        )
    }

    pub fn color(name: &str, description: &str, default: u8) -> ConfigOption {
        ConfigOption::new(
            name,
            description,
            OptionValue::Color(default),
            Constraint::None,
        )
    }

    pub fn string(name: &str, description: &str, default: &str) -> ConfigOption {
        ConfigOption::new(
            name,
            description,
            OptionValue::Str(Some(default.to_owned())),
            Constraint::None,
        )
    }

    pub fn nullable(mut self) -> ConfigOption {
        self.null_allowed = true;
        self
    }

    pub fn with_check(mut self, cb: CheckCb) -> ConfigOption {
        self.check_cb = Some(cb);
        self
    }

    pub fn with_change(mut self, cb: ChangeCb) -> ConfigOption {
        self.change_cb = Some(cb);
        self
    }

    pub fn with_delete(mut self, cb: DeleteCb) -> ConfigOption {
        self.delete_cb = Some(cb);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn value(&self) -> &OptionValue {
        &self.value
    }

    pub fn ty(&self) -> OptionType {
        self.value.ty()
    }

    /// Enumerant string for enum options; current string form otherwise.
    pub fn value_str(&self) -> String {
        self.value.render(&self.constraint)
    }
}

pub struct Section {
    name: String,
    user_can_add: bool,
    user_can_delete: bool,
    create_option_cb: Option<CreateOptionCb>,
    options: Vec<ConfigOption>,
}

impl Section {
    pub fn option(&self, name: &str) -> Option<&ConfigOption> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn options(&self) -> impl Iterator<Item = &ConfigOption> {
        self.options.iter()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn option_idx(&self, name: &str) -> Option<usize> {
        self.options.iter().position(|o| o.name == name)
    }
}

pub struct ConfigFile {
    name: String,
    sections: Vec<Section>,
}

impl ConfigFile {
    /// `new_file`: an empty config file with the given logical name
    /// (`lattice`, `irc`, ...). The on-disk name is `<name>.conf`.
    pub fn new(name: &str) -> ConfigFile {
        ConfigFile {
            name: name.to_owned(),
            sections: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `new_section`. Section names are unique within a file; re-adding an
    /// existing name returns the existing section's index.
    pub fn new_section(&mut self, name: &str, user_can_add: bool, user_can_delete: bool) -> usize {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            return idx;
        }
        self.sections.push(Section {
            name: name.to_owned(),
            user_can_add,
            user_can_delete,
            create_option_cb: None,
            options: Vec::new(),
        });
        self.sections.len() - 1
    }

    pub fn set_create_option_cb(&mut self, section: &str, cb: CreateOptionCb) {
        if let Some(sec) = self.section_mut(section) {
            sec.create_option_cb = Some(cb);
        }
    }

    /// `new_option`. Option names are unique within a section; a duplicate
    /// is rejected (the existing option wins).
    pub fn new_option(&mut self, section: &str, option: ConfigOption) -> bool {
        let Some(sec) = self.section_mut(section) else {
            return false;
        };
        if sec.option_idx(&option.name).is_some() {
            return false;
        }
        sec.options.push(option);
        true
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// `search`: look an option up by section and name.
    pub fn search(&self, section: &str, name: &str) -> Option<&ConfigOption> {
        self.section(section)?.option(name)
    }

    /// Convenience typed accessors. They panic on a type mismatch, which is
    /// a programming error (the option tables are static).
    pub fn get_bool(&self, section: &str, name: &str) -> bool {
        match self.search(section, name).map(ConfigOption::value) {
            Some(OptionValue::Bool(b)) => *b,
            other => panic!("option {}.{} is not a bool: {:?}", section, name, other),
        }
    }

    pub fn get_int(&self, section: &str, name: &str) -> i64 {
        match self.search(section, name).map(ConfigOption::value) {
            Some(OptionValue::Int(i)) => *i,
            other => panic!("option {}.{} is not an int: {:?}", section, name, other),
        }
    }

    pub fn get_str(&self, section: &str, name: &str) -> Option<String> {
        match self.search(section, name).map(ConfigOption::value) {
            Some(OptionValue::Str(s)) => s.clone(),
            other => panic!("option {}.{} is not a string: {:?}", section, name, other),
        }
    }

    pub fn get_enum(&self, section: &str, name: &str) -> String {
        match self.search(section, name) {
            Some(opt) => opt.value_str(),
            None => panic!("option {}.{} not found", section, name),
        }
    }

    /// `set`: parse, validate, store, notify.
    pub fn set(&mut self, section: &str, name: &str, raw: &str, run_callback: bool) -> SetResult {
        let file_name = self.name.clone();
        let Some(sec) = self.section_mut(section) else {
            return SetResult::NotFound;
        };

        let opt_idx = match sec.option_idx(name) {
            Some(idx) => idx,
            None => {
                if !sec.user_can_add {
                    return SetResult::NotFound;
                }
                // Dynamic section: create the option on first set.
                let opt = match &sec.create_option_cb {
                    Some(cb) => cb(name, raw),
                    None => ConfigOption::string(name, "", ""),
                };
                sec.options.push(opt);
                sec.options.len() - 1
            }
        };

        let opt = &mut sec.options[opt_idx];
        let parsed = match OptionValue::parse(opt.value.ty(), raw, &opt.constraint, opt.null_allowed)
        {
            Ok(v) => v,
            Err(_) => return SetResult::Error,
        };

        if let Some(check) = &opt.check_cb {
            if !check(raw) {
                return SetResult::Error;
            }
        }

        if parsed == opt.value {
            return SetResult::SameValue;
        }

        opt.value = parsed;
        if run_callback {
            if let Some(change) = &opt.change_cb {
                let full_name = format!("{}.{}.{}", file_name, section, name);
                change(&full_name, &opt.value);
            }
        }
        SetResult::Changed
    }

    /// `reset`: back to the default value.
    pub fn reset(&mut self, section: &str, name: &str, run_callback: bool) -> SetResult {
        let file_name = self.name.clone();
        let Some(sec) = self.section_mut(section) else {
            return SetResult::NotFound;
        };
        let Some(idx) = sec.option_idx(name) else {
            return SetResult::NotFound;
        };
        let opt = &mut sec.options[idx];
        if opt.value == opt.default {
            return SetResult::SameValue;
        }
        opt.value = opt.default.clone();
        if run_callback {
            if let Some(change) = &opt.change_cb {
                let full_name = format!("{}.{}.{}", file_name, section, name);
                change(&full_name, &opt.value);
            }
        }
        SetResult::Changed
    }

    /// `unset`: remove from a user-deletable section, reset otherwise.
    pub fn unset(&mut self, section: &str, name: &str) -> UnsetResult {
        let file_name = self.name.clone();
        let Some(sec) = self.section_mut(section) else {
            return UnsetResult::Error;
        };
        let Some(idx) = sec.option_idx(name) else {
            return UnsetResult::Error;
        };

        if sec.user_can_delete {
            let opt = sec.options.remove(idx);
            if let Some(delete) = &opt.delete_cb {
                let full_name = format!("{}.{}.{}", file_name, section, name);
                delete(&full_name);
            }
            return UnsetResult::Removed;
        }

        let opt = &mut sec.options[idx];
        if opt.value == opt.default {
            return UnsetResult::NoReset;
        }
        opt.value = opt.default.clone();
        if let Some(change) = &opt.change_cb {
            let full_name = format!("{}.{}.{}", file_name, section, name);
            change(&full_name, &opt.value);
        }
        UnsetResult::Reset
    }

    /// Reset every option to its default. Used by `reload` before re-reading
    /// the file, so options absent from disk end up at their defaults.
    pub fn reset_all(&mut self) {
        for sec in &mut self.sections {
            for opt in &mut sec.options {
                opt.value = opt.default.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn int_file() -> ConfigFile {
        let mut file = ConfigFile::new("test");
        file.new_section("sec", false, false);
        file.new_option("sec", ConfigOption::int("x", "an int", 0, 10, 1));
        file
    }

    #[test]
    fn set_parses_and_validates() {
        let mut file = int_file();
        assert_eq!(file.set("sec", "x", "5", true), SetResult::Changed);
        assert_eq!(file.get_int("sec", "x"), 5);

        // Not an int: stored value untouched.
        assert_eq!(file.set("sec", "x", "abc", true), SetResult::Error);
        assert_eq!(file.get_int("sec", "x"), 5);

        // Out of range.
        assert_eq!(file.set("sec", "x", "11", true), SetResult::Error);
        assert_eq!(file.get_int("sec", "x"), 5);

        // Same value: no change reported.
        assert_eq!(file.set("sec", "x", "5", true), SetResult::SameValue);

        assert_eq!(file.set("sec", "nope", "1", true), SetResult::NotFound);
        assert_eq!(file.set("nosec", "x", "1", true), SetResult::NotFound);
    }

    #[test]
    fn change_callback_fires_exactly_on_change() {
        let calls: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let calls_clone = calls.clone();

        let mut file = ConfigFile::new("test");
        file.new_section("sec", false, false);
        file.new_option(
            "sec",
            ConfigOption::int("x", "", 0, 10, 1).with_change(Rc::new(move |full_name, value| {
                calls_clone
                    .borrow_mut()
                    .push(format!("{}={:?}", full_name, value));
            })),
        );

        assert_eq!(file.set("sec", "x", "5", true), SetResult::Changed);
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(calls.borrow()[0], "test.sec.x=Int(5)");

        // SameValue: no callback.
        assert_eq!(file.set("sec", "x", "5", true), SetResult::SameValue);
        assert_eq!(calls.borrow().len(), 1);

        // run_callback = false suppresses it.
        assert_eq!(file.set("sec", "x", "7", false), SetResult::Changed);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn check_callback_rejects() {
        let mut file = ConfigFile::new("test");
        file.new_section("sec", false, false);
        file.new_option(
            "sec",
            ConfigOption::string("s", "", "ok").with_check(Rc::new(|raw| !raw.contains(' '))),
        );
        assert_eq!(file.set("sec", "s", "fine", true), SetResult::Changed);
        assert_eq!(file.set("sec", "s", "not fine", true), SetResult::Error);
        assert_eq!(file.get_str("sec", "s"), Some("fine".to_owned()));
    }

    #[test]
    fn bool_and_enum_parsing() {
        let mut file = ConfigFile::new("test");
        file.new_section("sec", false, false);
        file.new_option("sec", ConfigOption::bool("b", "", false));
        file.new_option(
            "sec",
            ConfigOption::enum_str("e", "", &["ansi", "translate", "strip"], 0),
        );

        assert_eq!(file.set("sec", "b", "ON", true), SetResult::Changed);
        assert!(file.get_bool("sec", "b"));
        assert_eq!(file.set("sec", "b", "maybe", true), SetResult::Error);

        assert_eq!(file.set("sec", "e", "Strip", true), SetResult::Changed);
        assert_eq!(file.get_enum("sec", "e"), "strip");
        assert_eq!(file.set("sec", "e", "purple", true), SetResult::Error);
    }

    #[test]
    fn unset_semantics() {
        let mut file = int_file();
        // Static section: unset means reset.
        assert_eq!(file.unset("sec", "x"), UnsetResult::NoReset);
        file.set("sec", "x", "5", true);
        assert_eq!(file.unset("sec", "x"), UnsetResult::Reset);
        assert_eq!(file.get_int("sec", "x"), 1);

        // User-addable section: unset removes.
        file.new_section("alias", true, true);
        assert_eq!(file.set("alias", "j", "join", true), SetResult::Changed);
        assert_eq!(file.unset("alias", "j"), UnsetResult::Removed);
        assert!(file.search("alias", "j").is_none());
        assert_eq!(file.unset("alias", "j"), UnsetResult::Error);
    }

    #[test]
    fn dynamic_section_creates_options() {
        let mut file = ConfigFile::new("test");
        file.new_section("alias", true, true);
        assert_eq!(
            file.set("alias", "j", "join #lattice", true),
            SetResult::Changed
        );
        assert_eq!(file.get_str("alias", "j"), Some("join #lattice".to_owned()));
    }
}
