//! Buffers and lines. A buffer is a named sink for typed lines plus an
//! input line being composed; it is the unit of display and of chat-log
//! scoping. Line ids are assigned at append, strictly increasing, never
//! reused.

use std::collections::HashMap;
use std::rc::Rc;

use time::OffsetDateTime;

use crate::history::History;
use crate::Core;
use lattice_common::BufferId;

/// `Formatted` buffers hold chat lines; `Free` buffers are free-content
/// surfaces (lists, transfers) addressed by line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Formatted,
    Free,
}

#[derive(Debug, Clone)]
pub struct Line {
    /// Strictly increasing within the buffer, assigned at append.
    pub id: u64,
    /// Wall-clock time of the append, microsecond precision.
    pub date: OffsetDateTime,
    pub prefix: String,
    pub msg: String,
    pub tags: Vec<String>,
    pub displayed: bool,
    pub highlight: bool,
}

impl Line {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

pub type InputCb = Rc<dyn Fn(&Core, BufferId, &str, Option<u64>)>;
pub type CloseCb = Rc<dyn Fn(&Core, BufferId)>;

pub struct Buffer {
    pub id: BufferId,
    /// Owning plugin or component name ("irc", "relay", a script name...).
    pub plugin: String,
    pub name: String,
    pub kind: BufferKind,
    pub lines: Vec<Line>,
    pub(crate) next_line_id: u64,

    /// Input line being composed.
    pub input: String,
    pub input_cursor: usize,
    pub input_scroll: usize,

    pub history: History,
    pub local_vars: HashMap<String, String>,

    pub(crate) input_cb: Option<InputCb>,
    pub(crate) close_cb: Option<CloseCb>,
    /// Guards the close callback against firing twice.
    pub(crate) closing: bool,
}

impl Buffer {
    pub(crate) fn new(
        id: BufferId,
        plugin: &str,
        name: &str,
        kind: BufferKind,
        history_max: usize,
    ) -> Buffer {
        Buffer {
            id,
            plugin: plugin.to_owned(),
            name: name.to_owned(),
            kind,
            lines: Vec::new(),
            next_line_id: 0,
            input: String::new(),
            input_cursor: 0,
            input_scroll: 0,
            history: History::new(history_max),
            local_vars: HashMap::new(),
            input_cb: None,
            close_cb: None,
            closing: false,
        }
    }

    /// Full name, unique process-wide: `plugin.name`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.plugin, self.name)
    }

    pub(crate) fn append(
        &mut self,
        prefix: &str,
        msg: &str,
        tags: Vec<String>,
        highlight: bool,
    ) -> u64 {
        let id = self.next_line_id;
        self.next_line_id += 1;
        self.lines.push(Line {
            id,
            date: OffsetDateTime::now_utc(),
            prefix: prefix.to_owned(),
            msg: msg.to_owned(),
            tags,
            displayed: true,
            highlight,
        });
        id
    }

    pub(crate) fn clear(&mut self) {
        self.lines.clear();
        self.input_scroll = 0;
    }

    pub fn line(&self, id: u64) -> Option<&Line> {
        // Ids are dense unless the buffer was cleared; binary search still
        // works because ids stay sorted.
        self.lines
            .binary_search_by(|l| l.id.cmp(&id))
            .ok()
            .map(|idx| &self.lines[idx])
    }
}

/// What a piece of user input turned out to be.
#[derive(Debug, PartialEq, Eq)]
pub enum InputKind {
    /// `/cmd rest`: a command line, leading slash stripped.
    Command(String),
    /// Plain text for the buffer (leading `//` collapsed to one `/`).
    Text(String),
}

/// Classify one line of user input. `//x` is a literal message starting
/// with `/`; `/x` is a command; anything else is text.
pub fn classify_input(input: &str) -> InputKind {
    if let Some(rest) = input.strip_prefix('/') {
        if let Some(literal) = rest.strip_prefix('/') {
            InputKind::Text(format!("/{}", literal))
        } else if rest.is_empty() {
            InputKind::Text("/".to_owned())
        } else {
            InputKind::Command(rest.to_owned())
        }
    } else {
        InputKind::Text(input.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify() {
        assert_eq!(
            classify_input("/join #chan"),
            InputKind::Command("join #chan".to_owned())
        );
        assert_eq!(
            classify_input("//slashy message"),
            InputKind::Text("/slashy message".to_owned())
        );
        assert_eq!(
            classify_input("plain message"),
            InputKind::Text("plain message".to_owned())
        );
        assert_eq!(classify_input("/"), InputKind::Text("/".to_owned()));
    }

    #[test]
    fn line_ids_strictly_increase() {
        let mut buf = Buffer::new(BufferId(0), "test", "b", BufferKind::Formatted, 10);
        let a = buf.append("", "one", vec![], false);
        let b = buf.append("", "two", vec![], false);
        let c = buf.append("", "three", vec![], false);
        assert!(a < b && b < c);
        let ids: Vec<u64> = buf.lines.iter().map(|l| l.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(ids, sorted);

        // Ids survive a clear without reuse.
        buf.clear();
        let d = buf.append("", "four", vec![], false);
        assert!(d > c);
    }

    #[test]
    fn line_lookup() {
        let mut buf = Buffer::new(BufferId(0), "test", "b", BufferKind::Formatted, 10);
        buf.append("", "one", vec![], false);
        let id = buf.append("", "two", vec![], false);
        assert_eq!(buf.line(id).unwrap().msg, "two");
        assert!(buf.line(999).is_none());
    }
}
