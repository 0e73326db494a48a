//! The runtime aggregate. A [`Core`] owns the buffer list, the hook
//! registry and the signal queue; every component (IRC sessions, the relay,
//! scripts) talks to the rest of the program through it.
//!
//! `Core` is a cheap cloneable handle over `Rc<RefCell<_>>` state, made for
//! a single-threaded cooperative program: callbacks receive a `&Core` and
//! may freely call back into it, because dispatchers never hold a borrow
//! across a callback invocation (they snapshot the matching callbacks,
//! then re-check liveness right before each call).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, warn};

pub mod buffer;
pub mod highlight;
pub mod history;
pub mod hooks;
pub mod script;

pub use buffer::{classify_input, Buffer, BufferKind, CloseCb, InputCb, InputKind, Line};
pub use hooks::{
    CommandCtx, CommandSpec, CompletionPos, FdEvent, FdSpec, HookId, HookStatus, Infolist,
    InfolistField, InfolistItem, SignalData,
};
use hooks::{HookKind, HookRegistry, SignalQueue, TimerState};

use lattice_common::BufferId;
use lattice_wire::formatting;

/// Alias expansion is capped at this depth to stop alias loops.
const MAX_ALIAS_DEPTH: u32 = 16;

/// Process-wide knobs the option store pushes into the core.
pub struct CoreSettings {
    /// Strip IRC color/formatting codes from incoming messages.
    pub strip_incoming_colors: bool,
    /// Highlight patterns (whole-word, `*` wildcard).
    pub highlight_patterns: Vec<String>,
    /// Ring size for per-buffer and global input history.
    pub history_max: usize,
}

impl Default for CoreSettings {
    fn default() -> CoreSettings {
        CoreSettings {
            strip_incoming_colors: false,
            highlight_patterns: Vec::new(),
            history_max: 100,
        }
    }
}

pub type AliasResolver = Rc<dyn Fn(&str) -> Option<String>>;
pub type ConnChecker = Rc<dyn Fn(BufferId) -> bool>;

struct CoreInner {
    buffers: Vec<Buffer>,
    next_buffer_id: u64,
    current_buffer: Option<BufferId>,
    hooks: HookRegistry,
    signals: SignalQueue,
    settings: CoreSettings,
    global_history: history::History,
    alias_resolver: Option<AliasResolver>,
    conn_checker: Option<ConnChecker>,
}

#[derive(Clone)]
pub struct Core {
    inner: Rc<RefCell<CoreInner>>,
}

impl Default for Core {
    fn default() -> Core {
        Core::new()
    }
}

impl Core {
    pub fn new() -> Core {
        Core {
            inner: Rc::new(RefCell::new(CoreInner {
                buffers: Vec::new(),
                next_buffer_id: 0,
                current_buffer: None,
                hooks: HookRegistry::default(),
                signals: SignalQueue::default(),
                settings: CoreSettings::default(),
                global_history: history::History::new(100),
                alias_resolver: None,
                conn_checker: None,
            })),
        }
    }

    //
    // Settings
    //

    pub fn set_strip_incoming_colors(&self, strip: bool) {
        self.inner.borrow_mut().settings.strip_incoming_colors = strip;
    }

    pub fn set_highlight_patterns(&self, patterns: Vec<String>) {
        self.inner.borrow_mut().settings.highlight_patterns = patterns;
    }

    pub fn set_history_max(&self, max: usize) {
        self.inner.borrow_mut().settings.history_max = max;
    }

    /// Install the alias table lookup used on command dispatch.
    pub fn set_alias_resolver(&self, resolver: AliasResolver) {
        self.inner.borrow_mut().alias_resolver = Some(resolver);
    }

    /// Install the "is this buffer's server connected" predicate consulted
    /// for commands declared `needs_connection`.
    pub fn set_conn_checker(&self, checker: ConnChecker) {
        self.inner.borrow_mut().conn_checker = Some(checker);
    }

    //
    // Buffers
    //

    /// Create a buffer. At most one buffer may exist per (plugin, name).
    pub fn buffer_new(&self, plugin: &str, name: &str, kind: BufferKind) -> Option<BufferId> {
        let id = {
            let mut inner = self.inner.borrow_mut();
            if inner
                .buffers
                .iter()
                .any(|b| b.plugin == plugin && b.name == name)
            {
                return None;
            }
            let id = BufferId(inner.next_buffer_id);
            inner.next_buffer_id += 1;
            let history_max = inner.settings.history_max;
            inner
                .buffers
                .push(Buffer::new(id, plugin, name, kind, history_max));
            if inner.current_buffer.is_none() {
                inner.current_buffer = Some(id);
            }
            id
        };
        self.emit_signal("buffer_opened", SignalData::Int(id.0 as i64));
        Some(id)
    }

    pub fn set_buffer_input_cb(&self, id: BufferId, cb: InputCb) {
        if let Some(buf) = self.inner.borrow_mut().buffers.iter_mut().find(|b| b.id == id) {
            buf.input_cb = Some(cb);
        }
    }

    pub fn set_buffer_close_cb(&self, id: BufferId, cb: CloseCb) {
        if let Some(buf) = self.inner.borrow_mut().buffers.iter_mut().find(|b| b.id == id) {
            buf.close_cb = Some(cb);
        }
    }

    pub fn find_buffer(&self, plugin: &str, name: &str) -> Option<BufferId> {
        self.inner
            .borrow()
            .buffers
            .iter()
            .find(|b| b.plugin == plugin && b.name == name)
            .map(|b| b.id)
    }

    pub fn buffer_ids(&self) -> Vec<BufferId> {
        self.inner.borrow().buffers.iter().map(|b| b.id).collect()
    }

    /// Run `f` against a buffer, if it exists. The borrow is released
    /// before this returns, so `f` must not call back into the core.
    pub fn with_buffer<R>(&self, id: BufferId, f: impl FnOnce(&Buffer) -> R) -> Option<R> {
        self.inner
            .borrow()
            .buffers
            .iter()
            .find(|b| b.id == id)
            .map(f)
    }

    pub fn with_buffer_mut<R>(&self, id: BufferId, f: impl FnOnce(&mut Buffer) -> R) -> Option<R> {
        self.inner
            .borrow_mut()
            .buffers
            .iter_mut()
            .find(|b| b.id == id)
            .map(f)
    }

    pub fn current_buffer(&self) -> Option<BufferId> {
        self.inner.borrow().current_buffer
    }

    pub fn set_current_buffer(&self, id: BufferId) {
        self.inner.borrow_mut().current_buffer = Some(id);
        self.emit_signal("buffer_switch", SignalData::Int(id.0 as i64));
    }

    /// Close a buffer: fire its close callback exactly once, then detach
    /// the hooks bound to it, then drop it.
    pub fn buffer_close(&self, id: BufferId) {
        let close_cb = {
            let mut inner = self.inner.borrow_mut();
            let Some(buf) = inner.buffers.iter_mut().find(|b| b.id == id) else {
                return;
            };
            if buf.closing {
                return;
            }
            buf.closing = true;
            buf.close_cb.clone()
        };
        if let Some(cb) = close_cb {
            cb(self, id);
        }
        self.emit_signal("buffer_closing", SignalData::Int(id.0 as i64));
        {
            let mut inner = self.inner.borrow_mut();
            inner.hooks.remove_buffer_hooks(id);
            inner.buffers.retain(|b| b.id != id);
            if inner.current_buffer == Some(id) {
                inner.current_buffer = inner.buffers.first().map(|b| b.id);
            }
        }
        self.emit_signal("buffer_closed", SignalData::Int(id.0 as i64));
    }

    pub fn buffer_clear(&self, id: BufferId) {
        if let Some(buf) = self.inner.borrow_mut().buffers.iter_mut().find(|b| b.id == id) {
            buf.clear();
        }
        self.emit_signal("buffer_cleared", SignalData::Int(id.0 as i64));
    }

    /// Replace the input line being composed (mirrored to relay clients
    /// that sync input).
    pub fn buffer_set_input(&self, id: BufferId, text: &str) {
        {
            let mut inner = self.inner.borrow_mut();
            let Some(buf) = inner.buffers.iter_mut().find(|b| b.id == id) else {
                return;
            };
            buf.input = text.to_owned();
            buf.input_cursor = text.len();
        }
        self.emit_signal("input_text_changed", SignalData::Int(id.0 as i64));
    }

    //
    // Printing
    //

    /// Append a line with tags; fires matching print hooks, then the
    /// `buffer_line_added` signal carrying `"<buffer>:<line>"`.
    pub fn print_tagged(
        &self,
        id: BufferId,
        prefix: &str,
        msg: &str,
        tags: &[&str],
        highlight: bool,
    ) -> Option<u64> {
        let (line_id, line) = {
            let mut inner = self.inner.borrow_mut();
            let strip = inner.settings.strip_incoming_colors
                && tags.iter().any(|t| t.starts_with("irc_"))
                && !tags.contains(&"self_msg");
            let buf = inner.buffers.iter_mut().find(|b| b.id == id)?;
            let msg_owned = if strip {
                formatting::strip_formatting(msg)
            } else {
                msg.to_owned()
            };
            let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
            let line_id = buf.append(prefix, &msg_owned, tags, highlight);
            // Clone for hook dispatch after the borrow ends.
            (line_id, buf.lines.last().unwrap().clone())
        };

        let subs = {
            let inner = self.inner.borrow();
            inner.hooks.prints(id, &line.tags, &line.msg)
        };
        for (hook_id, strip, cb) in subs {
            if !self.inner.borrow().hooks.is_alive(hook_id) {
                continue;
            }
            if strip {
                let mut stripped = line.clone();
                stripped.msg = formatting::strip_formatting(&line.msg);
                cb(self, id, &stripped);
            } else {
                cb(self, id, &line);
            }
        }

        self.emit_signal(
            "buffer_line_added",
            SignalData::Str(format!("{}:{}", id.0, line_id)),
        );
        Some(line_id)
    }

    /// Plain client message to a buffer.
    pub fn print(&self, id: BufferId, msg: &str) {
        self.print_tagged(id, "", msg, &["no_log"], false);
    }

    /// Error message to a buffer.
    pub fn print_err(&self, id: BufferId, msg: &str) {
        self.print_tagged(id, "!", msg, &["no_log"], false);
    }

    /// Does `msg` match the configured highlight patterns?
    pub fn detect_highlight(&self, msg: &str) -> bool {
        let inner = self.inner.borrow();
        highlight::is_highlight(msg, &inner.settings.highlight_patterns)
    }

    //
    // Signals
    //

    /// Emit a signal. Dispatch is synchronous; a signal emitted from inside
    /// a callback is queued and observed right after the current dispatch
    /// frame, in emission order.
    pub fn emit_signal(&self, name: &str, data: SignalData) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.signals.queue.push_back((name.to_owned(), data));
            if inner.signals.draining {
                return;
            }
            inner.signals.draining = true;
        }

        loop {
            let next = self.inner.borrow_mut().signals.queue.pop_front();
            let Some((name, data)) = next else {
                break;
            };
            let subs = self.inner.borrow().hooks.signals(&name);
            for (id, cb) in subs {
                if self.inner.borrow().hooks.is_alive(id) {
                    cb(self, &name, &data);
                }
            }
        }

        self.inner.borrow_mut().signals.draining = false;
    }

    //
    // Hook registration
    //

    pub fn hook_command(
        &self,
        owner: Option<&str>,
        priority: i32,
        spec: CommandSpec,
        cb: hooks::CommandCb,
    ) -> HookId {
        self.add_hook(owner, priority, HookKind::Command { spec, cb })
    }

    pub fn hook_command_run(
        &self,
        owner: Option<&str>,
        priority: i32,
        pattern: &str,
        cb: hooks::CommandRunCb,
    ) -> HookId {
        self.add_hook(
            owner,
            priority,
            HookKind::CommandRun {
                pattern: pattern.to_owned(),
                cb,
            },
        )
    }

    pub fn hook_timer(
        &self,
        owner: Option<&str>,
        interval: Duration,
        align_second: u32,
        max_calls: u32,
        cb: hooks::TimerCb,
    ) -> HookId {
        let next_deadline = hooks::initial_deadline(Instant::now(), interval, align_second);
        self.add_hook(
            owner,
            0,
            HookKind::Timer {
                state: TimerState {
                    interval,
                    max_calls,
                    calls_made: 0,
                    next_deadline,
                },
                cb,
            },
        )
    }

    pub fn hook_fd(&self, owner: Option<&str>, spec: FdSpec, cb: hooks::FdCb) -> HookId {
        self.add_hook(owner, 0, HookKind::Fd { spec, cb })
    }

    pub fn hook_signal(
        &self,
        owner: Option<&str>,
        priority: i32,
        pattern: &str,
        cb: hooks::SignalCb,
    ) -> HookId {
        self.add_hook(
            owner,
            priority,
            HookKind::Signal {
                pattern: pattern.to_owned(),
                cb,
            },
        )
    }

    pub fn hook_print(
        &self,
        owner: Option<&str>,
        buffer: Option<BufferId>,
        tag: Option<&str>,
        needle: Option<&str>,
        strip_colors: bool,
        cb: hooks::PrintCb,
    ) -> HookId {
        self.add_hook(
            owner,
            0,
            HookKind::Print {
                buffer,
                tag: tag.map(str::to_owned),
                needle: needle.map(str::to_owned),
                strip_colors,
                cb,
            },
        )
    }

    pub fn hook_modifier(
        &self,
        owner: Option<&str>,
        priority: i32,
        name: &str,
        cb: hooks::ModifierCb,
    ) -> HookId {
        self.add_hook(
            owner,
            priority,
            HookKind::Modifier {
                name: name.to_owned(),
                cb,
            },
        )
    }

    pub fn hook_config(&self, owner: Option<&str>, pattern: &str, cb: hooks::ConfigCb) -> HookId {
        self.add_hook(
            owner,
            0,
            HookKind::Config {
                pattern: pattern.to_owned(),
                cb,
            },
        )
    }

    pub fn hook_completion(
        &self,
        owner: Option<&str>,
        item: &str,
        cb: hooks::CompletionCb,
    ) -> HookId {
        self.add_hook(
            owner,
            0,
            HookKind::Completion {
                item: item.to_owned(),
                cb,
            },
        )
    }

    pub fn hook_info(&self, owner: Option<&str>, name: &str, cb: hooks::InfoCb) -> HookId {
        self.add_hook(
            owner,
            0,
            HookKind::Info {
                name: name.to_owned(),
                cb,
            },
        )
    }

    pub fn hook_infolist(&self, owner: Option<&str>, name: &str, cb: hooks::InfolistCb) -> HookId {
        self.add_hook(
            owner,
            0,
            HookKind::Infolist {
                name: name.to_owned(),
                cb,
            },
        )
    }

    fn add_hook(&self, owner: Option<&str>, priority: i32, kind: HookKind) -> HookId {
        self.inner
            .borrow_mut()
            .hooks
            .add(owner.map(str::to_owned), priority, kind)
    }

    /// Remove a hook; effective immediately, also from inside a dispatch.
    pub fn unhook(&self, id: HookId) -> bool {
        self.inner.borrow_mut().hooks.remove(id)
    }

    /// Remove every hook registered by `owner` (plugin/script unload).
    pub fn unhook_owner(&self, owner: &str) -> usize {
        self.inner.borrow_mut().hooks.remove_owner(owner)
    }

    //
    // Dispatch
    //

    /// Fire timers due at `now`; returns the next earliest deadline.
    pub fn process_timers(&self, now: Instant) -> Option<Instant> {
        let due = self.inner.borrow().hooks.due_timers(now);
        for (id, cb, remaining) in due {
            if !self.inner.borrow().hooks.is_alive(id) {
                continue;
            }
            self.inner.borrow_mut().hooks.timer_fired(id, now);
            cb(self, remaining);
        }
        self.inner.borrow().hooks.next_timer_deadline()
    }

    /// Registered fd interests, for the runtime to arm each iteration.
    pub fn fd_hooks(&self) -> Vec<(HookId, FdSpec)> {
        self.inner.borrow().hooks.fd_hooks()
    }

    pub fn dispatch_fd(&self, id: HookId, event: FdEvent) {
        let cb = self.inner.borrow().hooks.fd_cb(id);
        if let Some((fd, cb)) = cb {
            cb(self, fd, event);
        }
    }

    /// Run a modifier chain over `text`; each hook's output feeds the next,
    /// `None` means "unchanged".
    pub fn apply_modifiers(&self, name: &str, data: &str, text: &str) -> String {
        let subs = self.inner.borrow().hooks.modifiers(name);
        let mut current = text.to_owned();
        for (id, cb) in subs {
            if !self.inner.borrow().hooks.is_alive(id) {
                continue;
            }
            if let Some(output) = cb(self, name, data, &current) {
                current = output;
            }
        }
        current
    }

    /// Notify `config` hooks that an option changed.
    pub fn notify_config_change(&self, option: &str, value: &str) {
        let subs = self.inner.borrow().hooks.configs(option);
        for (id, cb) in subs {
            if self.inner.borrow().hooks.is_alive(id) {
                cb(self, option, value);
            }
        }
    }

    /// Collect completion candidates for an item, honoring the insertion
    /// position hints.
    pub fn complete(&self, item: &str) -> Vec<String> {
        let subs = self.inner.borrow().hooks.completions(item);
        let mut beginning = Vec::new();
        let mut sorted = Vec::new();
        let mut end = Vec::new();
        for (id, cb) in subs {
            if !self.inner.borrow().hooks.is_alive(id) {
                continue;
            }
            for (candidate, pos) in cb(self, item) {
                match pos {
                    CompletionPos::Beginning => beginning.push(candidate),
                    CompletionPos::Sort => sorted.push(candidate),
                    CompletionPos::End => end.push(candidate),
                }
            }
        }
        sorted.sort_unstable();
        sorted.dedup();
        beginning.extend(sorted);
        beginning.extend(end);
        beginning
    }

    /// Single-string info query; first registered provider wins.
    pub fn info(&self, name: &str, args: &str) -> Option<String> {
        let subs = self.inner.borrow().hooks.infos(name);
        for (id, cb) in subs {
            if !self.inner.borrow().hooks.is_alive(id) {
                continue;
            }
            if let Some(value) = cb(self, args) {
                return Some(value);
            }
        }
        None
    }

    /// Record-set query.
    pub fn infolist(&self, name: &str, args: &str) -> Option<Infolist> {
        let subs = self.inner.borrow().hooks.infolists(name);
        for (id, cb) in subs {
            if self.inner.borrow().hooks.is_alive(id) {
                return Some(cb(self, args));
            }
        }
        None
    }

    /// Help source: specs of all registered commands, sorted by name.
    pub fn command_specs(&self) -> Vec<CommandSpec> {
        self.inner.borrow().hooks.command_specs()
    }

    //
    // Input path
    //

    /// Deliver one line of user input to a buffer. History-add happens
    /// before dispatch so the line stays recallable even when the command
    /// errors. `origin` is the relay client id for relay-injected input.
    pub fn input(&self, buffer: BufferId, text: &str, origin: Option<u64>) {
        if text.is_empty() {
            return;
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.global_history.add(text);
            if let Some(buf) = inner.buffers.iter_mut().find(|b| b.id == buffer) {
                buf.history.add(text);
            }
        }

        match classify_input(text) {
            InputKind::Command(cmd) => self.run_command_line(buffer, &cmd, origin, 0),
            InputKind::Text(text) => {
                let cb = self
                    .inner
                    .borrow()
                    .buffers
                    .iter()
                    .find(|b| b.id == buffer)
                    .and_then(|b| b.input_cb.clone());
                match cb {
                    Some(cb) => cb(self, buffer, &text, origin),
                    None => debug!("input to buffer {:?} with no input callback", buffer),
                }
            }
        }
    }

    /// Dispatch a command line (without the leading '/'): command_run
    /// hooks, alias expansion, then the command table.
    pub fn run_command_line(
        &self,
        buffer: BufferId,
        line: &str,
        origin: Option<u64>,
        depth: u32,
    ) {
        if depth > MAX_ALIAS_DEPTH {
            self.print_err(buffer, "Alias loop detected, command dropped");
            return;
        }

        let line = line.trim_start();
        let full = format!("/{}", line);
        let runs = self.inner.borrow().hooks.command_runs(&full);
        for (id, cb) in runs {
            if !self.inner.borrow().hooks.is_alive(id) {
                continue;
            }
            match cb(self, buffer, &full) {
                HookStatus::OkEat => return,
                HookStatus::Ok => {}
                HookStatus::Error => {
                    warn!("command_run hook failed on {:?}", full);
                }
            }
        }

        let name = line.split_whitespace().next().unwrap_or("");
        let rest = line[name.len()..].trim_start();

        // Alias expansion, capped to stop loops.
        let resolver = self.inner.borrow().alias_resolver.clone();
        if let Some(resolver) = resolver {
            if let Some(expansion) = resolver(name) {
                let expansion = expansion.strip_prefix('/').unwrap_or(&expansion);
                let expanded = if rest.is_empty() {
                    expansion.to_owned()
                } else {
                    format!("{} {}", expansion, rest)
                };
                self.run_command_line(buffer, &expanded, origin, depth + 1);
                return;
            }
        }

        // Duplicate command names resolve by priority then registration
        // order; only the winner runs.
        let cmds = self.inner.borrow().hooks.commands(name);
        let Some((_, spec, cb)) = cmds.into_iter().next() else {
            self.print_err(buffer, &format!("Unknown command: \"/{}\"", name));
            return;
        };

        let argv: Vec<String> = std::iter::once(name.to_owned())
            .chain(rest.split_whitespace().map(str::to_owned))
            .collect();
        let n_args = argv.len() - 1;
        if n_args < spec.min_args || spec.max_args.map(|m| n_args > m).unwrap_or(false) {
            self.print_err(buffer, &format!("Usage: {}", spec.usage));
            return;
        }

        if spec.needs_connection {
            let checker = self.inner.borrow().conn_checker.clone();
            if let Some(checker) = checker {
                if !checker(buffer) {
                    self.print_err(
                        buffer,
                        &format!("/{}: not connected to a server", spec.name),
                    );
                    return;
                }
            }
        }

        let argv_eol = argv_eol(line, &argv);
        let ctx = CommandCtx {
            buffer,
            origin,
            argv,
            argv_eol,
        };
        match cb(self, &ctx) {
            HookStatus::Ok | HookStatus::OkEat => {}
            HookStatus::Error => {
                debug!("command /{} returned an error", name);
            }
        }
    }
}

/// `argv_eol[i]`: the command line from token `i` to the end.
fn argv_eol(line: &str, argv: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(argv.len());
    let mut cursor = 0;
    for arg in argv {
        if let Some(found) = line[cursor..].find(arg.as_str()) {
            cursor += found;
        }
        out.push(line[cursor..].to_owned());
        cursor += arg.len();
    }
    out
}

#[cfg(test)]
mod tests;
