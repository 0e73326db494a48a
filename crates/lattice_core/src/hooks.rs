//! The hook registry: named subscription slots for commands, timers, fds,
//! signals, prints, modifiers, config changes, completions and info
//! queries.
//!
//! Dispatch discipline, shared by every kind:
//!
//! - subscribers fire in (priority desc, registration order) for the same
//!   event;
//! - `unhook` is effective immediately: dispatchers snapshot the matching
//!   callbacks, then re-check liveness right before each call, so a hook
//!   removed from inside a callback never fires again (the currently
//!   executing frame still completes);
//! - a callback's failure is isolated: it is logged with the owner and
//!   dispatch continues with the next subscriber.

use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::buffer::Line;
use crate::Core;
use lattice_common::BufferId;

/// Handle to a registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub u64);

/// Outcome of a command / command_run callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Ok,
    /// Handled; stop interpreting the command line.
    OkEat,
    Error,
}

/// Payload of a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalData {
    None,
    Str(String),
    Int(i64),
    /// Opaque token standing in for the original's pointer payloads.
    Ptr(u64),
}

/// Where completion candidates are inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPos {
    Sort,
    Beginning,
    End,
}

/// A field of an infolist record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfolistField {
    Int(i64),
    Str(String),
    Time(i64),
}

/// One record of an infolist: ordered (name, field) pairs.
pub type InfolistItem = Vec<(String, InfolistField)>;
pub type Infolist = Vec<InfolistItem>;

/// Context handed to command callbacks.
pub struct CommandCtx {
    pub buffer: BufferId,
    /// Relay client id when the command was injected by a relay client;
    /// threads through to outgoing line tags for echo suppression.
    pub origin: Option<u64>,
    /// `argv[0]` is the command name.
    pub argv: Vec<String>,
    /// `argv_eol[i]` is the rest of the line starting at token `i`.
    pub argv_eol: Vec<String>,
}

/// Static description of a command hook, also the help source.
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub usage: String,
    /// Completion template, e.g. `"%c"` for channels (informational).
    pub completion: String,
    pub min_args: usize,
    /// `None` = unbounded.
    pub max_args: Option<usize>,
    pub needs_connection: bool,
}

pub type CommandCb = Rc<dyn Fn(&Core, &CommandCtx) -> HookStatus>;
pub type CommandRunCb = Rc<dyn Fn(&Core, BufferId, &str) -> HookStatus>;
pub type TimerCb = Rc<dyn Fn(&Core, u32)>;
pub type FdCb = Rc<dyn Fn(&Core, i32, FdEvent)>;
pub type SignalCb = Rc<dyn Fn(&Core, &str, &SignalData)>;
pub type PrintCb = Rc<dyn Fn(&Core, BufferId, &Line)>;
pub type ModifierCb = Rc<dyn Fn(&Core, &str, &str, &str) -> Option<String>>;
pub type ConfigCb = Rc<dyn Fn(&Core, &str, &str)>;
pub type CompletionCb = Rc<dyn Fn(&Core, &str) -> Vec<(String, CompletionPos)>>;
pub type InfoCb = Rc<dyn Fn(&Core, &str) -> Option<String>>;
pub type InfolistCb = Rc<dyn Fn(&Core, &str) -> Infolist>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdEvent {
    Read,
    Write,
    Exception,
}

#[derive(Clone, Copy)]
pub struct FdSpec {
    pub fd: i32,
    pub read: bool,
    pub write: bool,
    pub exception: bool,
}

pub(crate) struct TimerState {
    pub interval: Duration,
    pub max_calls: u32,
    pub calls_made: u32,
    pub next_deadline: Instant,
}

pub(crate) enum HookKind {
    Command {
        spec: CommandSpec,
        cb: CommandCb,
    },
    CommandRun {
        pattern: String,
        cb: CommandRunCb,
    },
    Timer {
        state: TimerState,
        cb: TimerCb,
    },
    Fd {
        spec: FdSpec,
        cb: FdCb,
    },
    Signal {
        pattern: String,
        cb: SignalCb,
    },
    Print {
        buffer: Option<BufferId>,
        tag: Option<String>,
        needle: Option<String>,
        strip_colors: bool,
        cb: PrintCb,
    },
    Modifier {
        name: String,
        cb: ModifierCb,
    },
    Config {
        pattern: String,
        cb: ConfigCb,
    },
    Completion {
        item: String,
        cb: CompletionCb,
    },
    Info {
        name: String,
        cb: InfoCb,
    },
    Infolist {
        name: String,
        cb: InfolistCb,
    },
}

pub(crate) struct Hook {
    pub id: HookId,
    pub owner: Option<String>,
    pub priority: i32,
    pub seq: u64,
    pub kind: HookKind,
}

#[derive(Default)]
pub(crate) struct HookRegistry {
    hooks: Vec<Hook>,
    next_id: u64,
}

/// Glob matching with `*` as the only wildcard.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    fn go(p: &[u8], n: &[u8]) -> bool {
        match p.first() {
            None => n.is_empty(),
            Some(b'*') => {
                // Collapse consecutive stars, then try every split point.
                let p = &p[1..];
                if p.is_empty() {
                    return true;
                }
                (0..=n.len()).any(|i| go(p, &n[i..]))
            }
            Some(c) => match n.first() {
                Some(d) if c == d => go(&p[1..], &n[1..]),
                _ => false,
            },
        }
    }
    go(pattern.as_bytes(), name.as_bytes())
}

impl HookRegistry {
    pub fn add(&mut self, owner: Option<String>, priority: i32, kind: HookKind) -> HookId {
        let id = HookId(self.next_id);
        let seq = self.next_id;
        self.next_id += 1;
        self.hooks.push(Hook {
            id,
            owner,
            priority,
            seq,
            kind,
        });
        id
    }

    pub fn remove(&mut self, id: HookId) -> bool {
        let len = self.hooks.len();
        self.hooks.retain(|h| h.id != id);
        self.hooks.len() != len
    }

    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let len = self.hooks.len();
        self.hooks.retain(|h| h.owner.as_deref() != Some(owner));
        len - self.hooks.len()
    }

    /// Drop print hooks targeting a buffer that is going away.
    pub fn remove_buffer_hooks(&mut self, buffer: BufferId) {
        self.hooks.retain(|h| {
            !matches!(
                h.kind,
                HookKind::Print {
                    buffer: Some(b), ..
                } if b == buffer
            )
        });
    }

    pub fn is_alive(&self, id: HookId) -> bool {
        self.hooks.iter().any(|h| h.id == id)
    }

    /// Matching hooks in dispatch order (priority desc, then registration).
    fn select<F, T>(&self, mut f: F) -> Vec<(HookId, T)>
    where
        F: FnMut(&Hook) -> Option<T>,
    {
        let mut matches: Vec<(i32, u64, HookId, T)> = self
            .hooks
            .iter()
            .filter_map(|h| f(h).map(|t| (h.priority, h.seq, h.id, t)))
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        matches.into_iter().map(|(_, _, id, t)| (id, t)).collect()
    }

    pub fn commands(&self, name: &str) -> Vec<(HookId, CommandSpec, CommandCb)> {
        self.select(|h| match &h.kind {
            HookKind::Command { spec, cb } if spec.name == name => {
                Some((spec.clone(), cb.clone()))
            }
            _ => None,
        })
        .into_iter()
        .map(|(id, (spec, cb))| (id, spec, cb))
        .collect()
    }

    pub fn command_specs(&self) -> Vec<CommandSpec> {
        let mut specs: Vec<CommandSpec> = self
            .hooks
            .iter()
            .filter_map(|h| match &h.kind {
                HookKind::Command { spec, .. } => Some(spec.clone()),
                _ => None,
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn command_runs(&self, line: &str) -> Vec<(HookId, CommandRunCb)> {
        self.select(|h| match &h.kind {
            HookKind::CommandRun { pattern, cb } if glob_match(pattern, line) => Some(cb.clone()),
            _ => None,
        })
    }

    pub fn signals(&self, name: &str) -> Vec<(HookId, SignalCb)> {
        self.select(|h| match &h.kind {
            HookKind::Signal { pattern, cb } if glob_match(pattern, name) => Some(cb.clone()),
            _ => None,
        })
    }

    pub fn prints(
        &self,
        buffer: BufferId,
        tags: &[String],
        msg: &str,
    ) -> Vec<(HookId, bool, PrintCb)> {
        self.select(|h| match &h.kind {
            HookKind::Print {
                buffer: buf_filter,
                tag,
                needle,
                strip_colors,
                cb,
            } => {
                if let Some(b) = buf_filter {
                    if *b != buffer {
                        return None;
                    }
                }
                if let Some(tag) = tag {
                    if !tags.iter().any(|t| glob_match(tag, t)) {
                        return None;
                    }
                }
                if let Some(needle) = needle {
                    if !msg.contains(needle.as_str()) {
                        return None;
                    }
                }
                Some((*strip_colors, cb.clone()))
            }
            _ => None,
        })
        .into_iter()
        .map(|(id, (strip, cb))| (id, strip, cb))
        .collect()
    }

    pub fn modifiers(&self, name: &str) -> Vec<(HookId, ModifierCb)> {
        self.select(|h| match &h.kind {
            HookKind::Modifier { name: n, cb } if n == name => Some(cb.clone()),
            _ => None,
        })
    }

    pub fn configs(&self, option: &str) -> Vec<(HookId, ConfigCb)> {
        self.select(|h| match &h.kind {
            HookKind::Config { pattern, cb } if glob_match(pattern, option) => Some(cb.clone()),
            _ => None,
        })
    }

    pub fn completions(&self, item: &str) -> Vec<(HookId, CompletionCb)> {
        self.select(|h| match &h.kind {
            HookKind::Completion { item: i, cb } if i == item => Some(cb.clone()),
            _ => None,
        })
    }

    pub fn infos(&self, name: &str) -> Vec<(HookId, InfoCb)> {
        self.select(|h| match &h.kind {
            HookKind::Info { name: n, cb } if n == name => Some(cb.clone()),
            _ => None,
        })
    }

    pub fn infolists(&self, name: &str) -> Vec<(HookId, InfolistCb)> {
        self.select(|h| match &h.kind {
            HookKind::Infolist { name: n, cb } if n == name => Some(cb.clone()),
            _ => None,
        })
    }

    pub fn fd_hooks(&self) -> Vec<(HookId, FdSpec)> {
        self.select(|h| match &h.kind {
            HookKind::Fd { spec, .. } => Some(*spec),
            _ => None,
        })
    }

    pub fn fd_cb(&self, id: HookId) -> Option<(i32, FdCb)> {
        self.hooks.iter().find(|h| h.id == id).and_then(|h| match &h.kind {
            HookKind::Fd { spec, cb } => Some((spec.fd, cb.clone())),
            _ => None,
        })
    }

    //
    // Timers
    //

    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.hooks
            .iter()
            .filter_map(|h| match &h.kind {
                HookKind::Timer { state, .. } => Some(state.next_deadline),
                _ => None,
            })
            .min()
    }

    /// Timers due at `now`, in (deadline, registration) order.
    pub fn due_timers(&self, now: Instant) -> Vec<(HookId, TimerCb, u32)> {
        let mut due: Vec<(Instant, u64, HookId, TimerCb, u32)> = self
            .hooks
            .iter()
            .filter_map(|h| match &h.kind {
                HookKind::Timer { state, cb } if state.next_deadline <= now => {
                    let remaining = if state.max_calls == 0 {
                        0
                    } else {
                        state.max_calls - state.calls_made
                    };
                    Some((state.next_deadline, h.seq, h.id, cb.clone(), remaining))
                }
                _ => None,
            })
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        due.into_iter().map(|(_, _, id, cb, r)| (id, cb, r)).collect()
    }

    /// Account for one firing of a timer: advance the deadline without
    /// drift (`prev + interval`), unless that is already in the past, in
    /// which case re-anchor at `now`. Removes the hook when its calls are
    /// exhausted.
    pub fn timer_fired(&mut self, id: HookId, now: Instant) {
        let mut exhausted = false;
        for h in &mut self.hooks {
            if h.id != id {
                continue;
            }
            if let HookKind::Timer { state, .. } = &mut h.kind {
                state.calls_made += 1;
                if state.max_calls != 0 && state.calls_made >= state.max_calls {
                    exhausted = true;
                } else {
                    let next = state.next_deadline + state.interval;
                    state.next_deadline = if next <= now { now + state.interval } else { next };
                }
            }
            break;
        }
        if exhausted {
            self.remove(id);
        }
    }
}

/// First deadline of a timer: `now + interval`, or, with `align_second > 0`,
/// snapped forward to the next wall-clock second that is a multiple of it.
pub(crate) fn initial_deadline(now: Instant, interval: Duration, align_second: u32) -> Instant {
    if align_second == 0 {
        return now + interval;
    }
    let unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let align_ms = u64::from(align_second) * 1000;
    let past = unix_ms % align_ms;
    let to_next = if past == 0 { 0 } else { align_ms - past };
    now + Duration::from_millis(to_next)
}

/// Saturating queue of pending signal emissions; drained FIFO so a signal
/// emitted from inside a callback is observed after the current frame.
#[derive(Default)]
pub(crate) struct SignalQueue {
    pub queue: VecDeque<(String, SignalData)>,
    pub draining: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("buffer_*", "buffer_line_added"));
        assert!(glob_match("*_added", "buffer_line_added"));
        assert!(glob_match("a*c", "abc"));
        assert!(glob_match("a*c", "ac"));
        assert!(!glob_match("buffer_*", "nicklist_changed"));
        assert!(!glob_match("abc", "abcd"));
        assert!(glob_match("a**b", "a-anything-b"));
    }

    #[test]
    fn timer_reschedule_no_drift() {
        let t0 = Instant::now();
        let mut reg = HookRegistry::default();
        let id = reg.add(
            None,
            0,
            HookKind::Timer {
                state: TimerState {
                    interval: Duration::from_secs(10),
                    max_calls: 0,
                    calls_made: 0,
                    next_deadline: t0,
                },
                cb: Rc::new(|_, _| {}),
            },
        );

        // Fired a bit late: next deadline anchors on the previous deadline.
        reg.timer_fired(id, t0 + Duration::from_secs(3));
        assert_eq!(reg.next_timer_deadline(), Some(t0 + Duration::from_secs(10)));

        // Fired long past the next deadline: re-anchor on `now`.
        let late = t0 + Duration::from_secs(25);
        reg.timer_fired(id, late);
        assert_eq!(reg.next_timer_deadline(), Some(late + Duration::from_secs(10)));
    }

    #[test]
    fn timer_max_calls_exhausts() {
        let t0 = Instant::now();
        let mut reg = HookRegistry::default();
        let id = reg.add(
            None,
            0,
            HookKind::Timer {
                state: TimerState {
                    interval: Duration::from_secs(1),
                    max_calls: 2,
                    calls_made: 0,
                    next_deadline: t0,
                },
                cb: Rc::new(|_, _| {}),
            },
        );
        reg.timer_fired(id, t0);
        assert!(reg.is_alive(id));
        reg.timer_fired(id, t0);
        assert!(!reg.is_alive(id));
    }

    #[test]
    fn priority_then_registration_order() {
        let mut reg = HookRegistry::default();
        let a = reg.add(
            None,
            0,
            HookKind::Signal {
                pattern: "x".into(),
                cb: Rc::new(|_, _, _| {}),
            },
        );
        let b = reg.add(
            None,
            10,
            HookKind::Signal {
                pattern: "x".into(),
                cb: Rc::new(|_, _, _| {}),
            },
        );
        let c = reg.add(
            None,
            0,
            HookKind::Signal {
                pattern: "*".into(),
                cb: Rc::new(|_, _, _| {}),
            },
        );
        let order: Vec<HookId> = reg.signals("x").into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![b, a, c]);
    }
}
