use super::*;
use crate::script::{
    ScriptApi, ScriptEngine, ScriptHost, ScriptRegistration, ScriptValue,
};

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

fn formatted_buffer(core: &Core, name: &str) -> BufferId {
    core.buffer_new("test", name, BufferKind::Formatted).unwrap()
}

#[test]
fn buffer_identity_is_unique_per_plugin_and_name() {
    let core = Core::new();
    assert!(core.buffer_new("irc", "srv", BufferKind::Formatted).is_some());
    assert!(core.buffer_new("irc", "srv", BufferKind::Formatted).is_none());
    // Same name under a different plugin is a different buffer.
    assert!(core.buffer_new("relay", "srv", BufferKind::Free).is_some());
}

#[test]
fn close_callback_fires_exactly_once() {
    let core = Core::new();
    let id = formatted_buffer(&core, "b");
    let count = Rc::new(RefCell::new(0));
    let count_clone = count.clone();
    core.set_buffer_close_cb(
        id,
        Rc::new(move |_, _| {
            *count_clone.borrow_mut() += 1;
        }),
    );
    core.buffer_close(id);
    core.buffer_close(id);
    assert_eq!(*count.borrow(), 1);
    assert!(core.find_buffer("test", "b").is_none());
}

#[test]
fn print_hook_fires_after_append() {
    let core = Core::new();
    let id = formatted_buffer(&core, "b");
    let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    core.hook_print(
        None,
        Some(id),
        Some("irc_privmsg"),
        None,
        false,
        Rc::new(move |core, buffer, line| {
            // The line is already in the buffer when the hook fires.
            let stored = core
                .with_buffer(buffer, |b| b.line(line.id).map(|l| l.msg.clone()))
                .flatten();
            assert_eq!(stored.as_deref(), Some(line.msg.as_str()));
            seen_clone.borrow_mut().push(line.msg.clone());
        }),
    );

    core.print_tagged(id, "alice", "hello", &["irc_privmsg"], false);
    core.print_tagged(id, "", "untagged", &["no_log"], false);
    assert_eq!(seen.borrow().as_slice(), ["hello".to_owned()]);
}

#[test]
fn unhook_inside_own_dispatch_stops_further_calls() {
    let core = Core::new();
    let count = Rc::new(RefCell::new(0));
    let hook_id: Rc<RefCell<Option<HookId>>> = Rc::new(RefCell::new(None));

    let count_clone = count.clone();
    let hook_id_clone = hook_id.clone();
    let id = core.hook_signal(
        None,
        0,
        "tick",
        Rc::new(move |core, _, _| {
            *count_clone.borrow_mut() += 1;
            core.unhook(hook_id_clone.borrow().unwrap());
        }),
    );
    *hook_id.borrow_mut() = Some(id);

    core.emit_signal("tick", SignalData::None);
    core.emit_signal("tick", SignalData::None);
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn signal_emitted_inside_callback_observed_after_frame() {
    let core = Core::new();
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let order_a = order.clone();
    core.hook_signal(
        None,
        0,
        "first",
        Rc::new(move |core, _, _| {
            order_a.borrow_mut().push("first:a");
            core.emit_signal("second", SignalData::None);
            order_a.borrow_mut().push("first:a-end");
        }),
    );
    let order_b = order.clone();
    core.hook_signal(
        None,
        0,
        "first",
        Rc::new(move |_, _, _| {
            order_b.borrow_mut().push("first:b");
        }),
    );
    let order_c = order.clone();
    core.hook_signal(
        None,
        0,
        "second",
        Rc::new(move |_, _, _| {
            order_c.borrow_mut().push("second");
        }),
    );

    core.emit_signal("first", SignalData::None);
    // The nested "second" is seen after the whole "first" frame.
    assert_eq!(
        order.borrow().as_slice(),
        ["first:a", "first:a-end", "first:b", "second"]
    );
}

#[test]
fn glob_signal_subscription() {
    let core = Core::new();
    let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    core.hook_signal(
        None,
        0,
        "buffer_*",
        Rc::new(move |_, name, _| {
            seen_clone.borrow_mut().push(name.to_owned());
        }),
    );
    core.emit_signal("buffer_opened", SignalData::None);
    core.emit_signal("nicklist_changed", SignalData::None);
    core.emit_signal("buffer_closed", SignalData::None);
    assert_eq!(
        seen.borrow().as_slice(),
        ["buffer_opened".to_owned(), "buffer_closed".to_owned()]
    );
}

fn noop_command(name: &str) -> CommandSpec {
    CommandSpec {
        name: name.to_owned(),
        description: String::new(),
        usage: format!("/{}", name),
        completion: String::new(),
        min_args: 0,
        max_args: None,
        needs_connection: false,
    }
}

#[test]
fn command_dispatch_and_argv() {
    let core = Core::new();
    let id = formatted_buffer(&core, "b");
    let got: Rc<RefCell<Option<(Vec<String>, Vec<String>)>>> = Rc::new(RefCell::new(None));
    let got_clone = got.clone();
    core.hook_command(
        None,
        0,
        CommandSpec {
            min_args: 1,
            max_args: Some(2),
            ..noop_command("msg")
        },
        Rc::new(move |_, ctx| {
            *got_clone.borrow_mut() = Some((ctx.argv.clone(), ctx.argv_eol.clone()));
            HookStatus::Ok
        }),
    );

    core.input(id, "/msg bob hello", None);
    let (argv, argv_eol) = got.borrow().clone().unwrap();
    assert_eq!(argv, ["msg", "bob", "hello"]);
    assert_eq!(argv_eol, ["msg bob hello", "bob hello", "hello"]);

    // Too few args: handler not called, usage error printed instead.
    *got.borrow_mut() = None;
    core.input(id, "/msg", None);
    assert!(got.borrow().is_none());
    let last = core
        .with_buffer(id, |b| b.lines.last().map(|l| l.msg.clone()))
        .flatten()
        .unwrap();
    assert!(last.contains("Usage"));
}

#[test]
fn unknown_command_reported() {
    let core = Core::new();
    let id = formatted_buffer(&core, "b");
    core.input(id, "/nosuchthing", None);
    let last = core
        .with_buffer(id, |b| b.lines.last().map(|l| l.msg.clone()))
        .flatten()
        .unwrap();
    assert!(last.contains("Unknown command"));
}

#[test]
fn double_slash_is_literal_text() {
    let core = Core::new();
    let id = formatted_buffer(&core, "b");
    let got: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let got_clone = got.clone();
    core.set_buffer_input_cb(
        id,
        Rc::new(move |_, _, text, _| {
            got_clone.borrow_mut().push(text.to_owned());
        }),
    );
    core.input(id, "//notacommand", None);
    core.input(id, "plain", None);
    assert_eq!(
        got.borrow().as_slice(),
        ["/notacommand".to_owned(), "plain".to_owned()]
    );
}

#[test]
fn history_add_precedes_dispatch() {
    let core = Core::new();
    let id = formatted_buffer(&core, "b");
    // An unknown command still lands in history.
    core.input(id, "/broken command", None);
    let recalled = core
        .with_buffer(id, |b| b.history.get(0).map(str::to_owned))
        .flatten();
    assert_eq!(recalled.as_deref(), Some("/broken command"));
}

#[test]
fn alias_expansion_with_depth_cap() {
    let core = Core::new();
    let id = formatted_buffer(&core, "b");

    let aliases: Rc<HashMap<String, String>> = Rc::new(
        [
            ("j".to_owned(), "join".to_owned()),
            ("loop".to_owned(), "/loop".to_owned()),
        ]
        .into_iter()
        .collect(),
    );
    let aliases_clone = aliases.clone();
    core.set_alias_resolver(Rc::new(move |name| aliases_clone.get(name).cloned()));

    let got: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let got_clone = got.clone();
    core.hook_command(
        None,
        0,
        noop_command("join"),
        Rc::new(move |_, ctx| {
            got_clone.borrow_mut().push(ctx.argv_eol[0].clone());
            HookStatus::Ok
        }),
    );

    core.input(id, "/j #chan", None);
    assert_eq!(got.borrow().as_slice(), ["join #chan".to_owned()]);

    // Self-referencing alias terminates with an error, not a stack blowup.
    core.input(id, "/loop", None);
    let last = core
        .with_buffer(id, |b| b.lines.last().map(|l| l.msg.clone()))
        .flatten()
        .unwrap();
    assert!(last.contains("Alias loop"));
}

#[test]
fn command_run_can_eat() {
    let core = Core::new();
    let id = formatted_buffer(&core, "b");
    let handler_ran = Rc::new(RefCell::new(false));
    let handler_ran_clone = handler_ran.clone();
    core.hook_command(
        None,
        0,
        noop_command("quit"),
        Rc::new(move |_, _| {
            *handler_ran_clone.borrow_mut() = true;
            HookStatus::Ok
        }),
    );
    core.hook_command_run(
        None,
        0,
        "/quit*",
        Rc::new(|_, _, _| HookStatus::OkEat),
    );
    core.input(id, "/quit", None);
    assert!(!*handler_ran.borrow());
}

#[test]
fn needs_connection_refused_cleanly() {
    let core = Core::new();
    let id = formatted_buffer(&core, "b");
    core.set_conn_checker(Rc::new(|_| false));
    let ran = Rc::new(RefCell::new(false));
    let ran_clone = ran.clone();
    core.hook_command(
        None,
        0,
        CommandSpec {
            needs_connection: true,
            ..noop_command("whois")
        },
        Rc::new(move |_, _| {
            *ran_clone.borrow_mut() = true;
            HookStatus::Ok
        }),
    );
    core.input(id, "/whois bob", None);
    assert!(!*ran.borrow());
    let last = core
        .with_buffer(id, |b| b.lines.last().map(|l| l.msg.clone()))
        .flatten()
        .unwrap();
    assert!(last.contains("not connected"));
}

#[test]
fn modifier_chain_in_priority_order() {
    let core = Core::new();
    core.hook_modifier(
        None,
        5,
        "input_text",
        Rc::new(|_, _, _, text| Some(format!("{}!", text))),
    );
    core.hook_modifier(
        None,
        10,
        "input_text",
        Rc::new(|_, _, _, text| Some(text.to_uppercase())),
    );
    // None leaves the text unchanged.
    core.hook_modifier(None, 0, "input_text", Rc::new(|_, _, _, _| None));

    assert_eq!(core.apply_modifiers("input_text", "", "hey"), "HEY!");
}

#[test]
fn completion_position_hints() {
    let core = Core::new();
    core.hook_completion(
        None,
        "nicks",
        Rc::new(|_, _| {
            vec![
                ("zoe".to_owned(), CompletionPos::Sort),
                ("amy".to_owned(), CompletionPos::Sort),
                ("last".to_owned(), CompletionPos::End),
                ("first".to_owned(), CompletionPos::Beginning),
            ]
        }),
    );
    assert_eq!(core.complete("nicks"), ["first", "amy", "zoe", "last"]);
}

#[test]
fn info_and_infolist() {
    let core = Core::new();
    core.hook_info(None, "version", Rc::new(|_, _| Some("1.0".to_owned())));
    core.hook_infolist(
        None,
        "buffer",
        Rc::new(|core, _| {
            core.buffer_ids()
                .into_iter()
                .map(|id| vec![("id".to_owned(), InfolistField::Int(id.0 as i64))])
                .collect()
        }),
    );
    assert_eq!(core.info("version", ""), Some("1.0".to_owned()));
    assert_eq!(core.info("nope", ""), None);
    formatted_buffer(&core, "b");
    assert_eq!(core.infolist("buffer", "").unwrap().len(), 1);
}

#[test]
fn strip_incoming_colors_option() {
    let core = Core::new();
    core.set_strip_incoming_colors(true);
    let id = formatted_buffer(&core, "b");
    core.print_tagged(id, "bob", "\x02bold\x0f text", &["irc_privmsg"], false);
    let msg = core
        .with_buffer(id, |b| b.lines.last().map(|l| l.msg.clone()))
        .flatten()
        .unwrap();
    assert_eq!(msg, "bold text");

    // Own messages keep their formatting.
    core.print_tagged(id, "me", "\x02bold\x0f", &["irc_privmsg", "self_msg"], false);
    let msg = core
        .with_buffer(id, |b| b.lines.last().map(|l| l.msg.clone()))
        .flatten()
        .unwrap();
    assert_eq!(msg, "\x02bold\x0f");
}

//
// Scripting bridge
//

/// A fake interpreter: "loading" looks the script up in a canned table;
/// calls append to a log and can be told to fail.
#[derive(Default)]
struct FakeEngine {
    register_on_load: Option<ScriptRegistration>,
    calls: Rc<RefCell<Vec<String>>>,
    fail_calls: bool,
    dropped: Vec<String>,
}

impl ScriptEngine for FakeEngine {
    fn language(&self) -> &str {
        "fake"
    }

    fn load(&mut self, _path: &Path, api: &mut dyn ScriptApi) -> Result<(), String> {
        if let Some(reg) = self.register_on_load.clone() {
            if !api.register(reg) {
                return Err("register rejected".to_owned());
            }
        }
        Ok(())
    }

    fn call(
        &mut self,
        script: &str,
        func: &str,
        _args: &[ScriptValue],
    ) -> Result<ScriptValue, String> {
        self.calls.borrow_mut().push(format!("{}.{}", script, func));
        if self.fail_calls {
            Err("interpreter exploded".to_owned())
        } else {
            Ok(ScriptValue::Int(0))
        }
    }

    fn drop_script(&mut self, script: &str) {
        self.dropped.push(script.to_owned());
    }
}

fn registration(name: &str) -> ScriptRegistration {
    ScriptRegistration {
        name: name.to_owned(),
        author: "a".to_owned(),
        version: "1.0".to_owned(),
        license: "MIT".to_owned(),
        description: String::new(),
        shutdown_fn: Some("on_shutdown".to_owned()),
        charset: None,
    }
}

#[test]
fn script_without_register_is_rejected() {
    let mut host = ScriptHost::new();
    let mut engine = FakeEngine::default();
    let err = host.load(&mut engine, Path::new("empty.fake")).unwrap_err();
    assert!(err.contains("register"));
    assert!(host.names().is_empty());
}

#[test]
fn script_unload_removes_hooks_and_buffers() {
    let core = Core::new();
    let mut host = ScriptHost::new();
    let mut engine = FakeEngine {
        register_on_load: Some(registration("greeter")),
        ..FakeEngine::default()
    };
    let calls = engine.calls.clone();

    let name = host.load(&mut engine, Path::new("greeter.fake")).unwrap();
    assert_eq!(name, "greeter");
    assert!(host.is_loaded("greeter"));

    // Script-owned hook and buffer.
    let fired = Rc::new(RefCell::new(0));
    let fired_clone = fired.clone();
    core.hook_signal(
        Some("greeter"),
        0,
        "tick",
        Rc::new(move |_, _, _| {
            *fired_clone.borrow_mut() += 1;
        }),
    );
    core.buffer_new("greeter", "panel", BufferKind::Free).unwrap();
    host.track_config_file("greeter", "greeter", true);

    core.emit_signal("tick", SignalData::None);
    assert_eq!(*fired.borrow(), 1);

    let config_files = host.unload(&core, &mut engine, "greeter").unwrap();
    assert_eq!(config_files, vec![("greeter".to_owned(), true)]);
    assert!(!host.is_loaded("greeter"));
    assert_eq!(calls.borrow().as_slice(), ["greeter.on_shutdown".to_owned()]);
    assert_eq!(engine.dropped, ["greeter".to_owned()]);

    // Hook gone, buffer gone.
    core.emit_signal("tick", SignalData::None);
    assert_eq!(*fired.borrow(), 1);
    assert!(core.find_buffer("greeter", "panel").is_none());
}

#[test]
fn script_callback_errors_are_neutralized() {
    let mut engine = FakeEngine {
        fail_calls: true,
        ..FakeEngine::default()
    };
    let status = script::call_script_status(&mut engine, "s", "cb", &[]);
    assert_eq!(status, HookStatus::Error);
    assert_eq!(script::call_script_string(&mut engine, "s", "cb", &[]), None);
}
