//! The user command table. Each row declares name, help, usage, completion
//! template, argc bounds and whether a registered connection is required;
//! the core's dispatcher validates argc/connection and routes to the
//! handler. Handlers get the originating buffer and, for relay-injected
//! input, the origin client id (threaded into outgoing line tags).

use crate::buffers::{self, send_msg, Printer};
use crate::settings;
use crate::App;

use lattice_common::{ChanName, ChanNameRef, MsgTarget};
use lattice_config::{SetResult, UnsetResult};
use lattice_core::{CommandCtx, CommandSpec, HookStatus};

use std::path::PathBuf;
use std::rc::Rc;

struct Cmd {
    name: &'static str,
    description: &'static str,
    usage: &'static str,
    /// Completion template (`%c` channels, `%n` nicks, `%s` servers).
    completion: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    needs_connection: bool,
    cmd_fn: fn(&App, &CommandCtx) -> HookStatus,
}

static CMDS: [Cmd; 22] = [
    Cmd {
        name: "alias",
        description: "lists aliases or defines one",
        usage: "/alias [<name> [<command>]]",
        completion: "",
        min_args: 0,
        max_args: None,
        needs_connection: false,
        cmd_fn: alias,
    },
    Cmd {
        name: "away",
        description: "sets or clears the away message",
        usage: "/away [<message>]",
        completion: "",
        min_args: 0,
        max_args: None,
        needs_connection: true,
        cmd_fn: away,
    },
    Cmd {
        name: "clear",
        description: "clears the current buffer",
        usage: "/clear",
        completion: "",
        min_args: 0,
        max_args: Some(0),
        needs_connection: false,
        cmd_fn: clear,
    },
    Cmd {
        name: "close",
        description: "closes the current buffer, parting the channel",
        usage: "/close",
        completion: "",
        min_args: 0,
        max_args: Some(0),
        needs_connection: false,
        cmd_fn: close,
    },
    Cmd {
        name: "connect",
        description: "connects to a configured server",
        usage: "/connect <server>",
        completion: "%s",
        min_args: 0,
        max_args: Some(1),
        needs_connection: false,
        cmd_fn: connect,
    },
    Cmd {
        name: "dcc",
        description: "lists, accepts or aborts DCC transfers",
        usage: "/dcc [list | accept <id> | abort <id> | send <nick> <file> | chat <id>]",
        completion: "",
        min_args: 0,
        max_args: None,
        needs_connection: true,
        cmd_fn: dcc,
    },
    Cmd {
        name: "help",
        description: "shows this list",
        usage: "/help",
        completion: "",
        min_args: 0,
        max_args: Some(1),
        needs_connection: false,
        cmd_fn: help,
    },
    Cmd {
        name: "join",
        description: "joins channels",
        usage: "/join <chan>[,<chan>...]",
        completion: "%c",
        min_args: 1,
        max_args: Some(1),
        needs_connection: true,
        cmd_fn: join,
    },
    Cmd {
        name: "me",
        description: "sends an action message",
        usage: "/me <message>",
        completion: "",
        min_args: 1,
        max_args: None,
        needs_connection: true,
        cmd_fn: me,
    },
    Cmd {
        name: "mode",
        description: "changes channel or user modes",
        usage: "/mode <target> <modes> [<args>]",
        completion: "%c",
        min_args: 1,
        max_args: None,
        needs_connection: true,
        cmd_fn: mode,
    },
    Cmd {
        name: "msg",
        description: "sends a message to a nick or channel",
        usage: "/msg <target> <message>",
        completion: "%n",
        min_args: 2,
        max_args: None,
        needs_connection: true,
        cmd_fn: msg,
    },
    Cmd {
        name: "names",
        description: "shows who is on the channel",
        usage: "/names [<nick>]",
        completion: "%n",
        min_args: 0,
        max_args: Some(1),
        needs_connection: true,
        cmd_fn: names,
    },
    Cmd {
        name: "nick",
        description: "changes your nick",
        usage: "/nick <nick>",
        completion: "",
        min_args: 1,
        max_args: Some(1),
        needs_connection: true,
        cmd_fn: nick,
    },
    Cmd {
        name: "notice",
        description: "sends a notice",
        usage: "/notice <target> <message>",
        completion: "%n",
        min_args: 2,
        max_args: None,
        needs_connection: true,
        cmd_fn: notice,
    },
    Cmd {
        name: "part",
        description: "leaves the channel",
        usage: "/part [<chan>]",
        completion: "%c",
        min_args: 0,
        max_args: Some(1),
        needs_connection: true,
        cmd_fn: part,
    },
    Cmd {
        name: "query",
        description: "opens a private conversation",
        usage: "/query <nick> [<message>]",
        completion: "%n",
        min_args: 1,
        max_args: None,
        needs_connection: true,
        cmd_fn: query,
    },
    Cmd {
        name: "quit",
        description: "quits all servers and exits",
        usage: "/quit [<message>]",
        completion: "",
        min_args: 0,
        max_args: None,
        needs_connection: false,
        cmd_fn: quit,
    },
    Cmd {
        name: "quote",
        description: "sends a raw IRC line",
        usage: "/quote <line>",
        completion: "",
        min_args: 1,
        max_args: None,
        needs_connection: true,
        cmd_fn: quote,
    },
    Cmd {
        name: "script",
        description: "loads, unloads or lists scripts",
        usage: "/script [list | load <file> | unload <name>]",
        completion: "",
        min_args: 0,
        max_args: Some(2),
        needs_connection: false,
        cmd_fn: script,
    },
    Cmd {
        name: "set",
        description: "shows or changes configuration options",
        usage: "/set [<file>.<section>.<option> [<value>]]",
        completion: "",
        min_args: 0,
        max_args: None,
        needs_connection: false,
        cmd_fn: set,
    },
    Cmd {
        name: "unset",
        description: "resets an option to its default (removes user-added ones)",
        usage: "/unset <file>.<section>.<option>",
        completion: "",
        min_args: 1,
        max_args: Some(1),
        needs_connection: false,
        cmd_fn: unset,
    },
    Cmd {
        name: "unalias",
        description: "removes an alias",
        usage: "/unalias <name>",
        completion: "",
        min_args: 1,
        max_args: Some(1),
        needs_connection: false,
        cmd_fn: unalias,
    },
];

pub(crate) fn register_commands(app: &App) {
    for cmd in &CMDS {
        let spec = CommandSpec {
            name: cmd.name.to_owned(),
            description: cmd.description.to_owned(),
            usage: cmd.usage.to_owned(),
            completion: cmd.completion.to_owned(),
            min_args: cmd.min_args,
            max_args: cmd.max_args,
            needs_connection: cmd.needs_connection,
        };
        let app_clone = app.clone();
        let cmd_fn = cmd.cmd_fn;
        app.core
            .hook_command(None, 0, spec, Rc::new(move |_core, ctx| cmd_fn(&app_clone, ctx)));
    }
}

fn err(app: &App, ctx: &CommandCtx, msg: &str) -> HookStatus {
    Printer::new(app).add_client_err_msg(msg, &MsgTarget::CurrentBuffer);
    let _ = ctx;
    HookStatus::Error
}

fn buffer_serv_or_err(app: &App, ctx: &CommandCtx) -> Option<String> {
    let serv = buffers::buffer_serv(app, ctx.buffer);
    if serv.is_none() {
        Printer::new(app)
            .add_client_err_msg("This buffer is not attached to a server", &MsgTarget::CurrentBuffer);
    }
    serv
}

//
// Handlers
//

fn alias(app: &App, ctx: &CommandCtx) -> HookStatus {
    let printer = Printer::new(app);
    match ctx.argv.len() {
        1 => {
            let main = app.settings.main.borrow();
            if let Some(section) = main.section("alias") {
                for opt in section.options() {
                    printer.add_client_msg(
                        &format!("alias {} = {}", opt.name(), opt.value_str()),
                        &MsgTarget::CurrentBuffer,
                    );
                }
            }
            HookStatus::Ok
        }
        2 => {
            let main = app.settings.main.borrow();
            match main.search("alias", &ctx.argv[1]) {
                Some(opt) => {
                    printer.add_client_msg(
                        &format!("alias {} = {}", opt.name(), opt.value_str()),
                        &MsgTarget::CurrentBuffer,
                    );
                    HookStatus::Ok
                }
                None => {
                    drop(main);
                    err(app, ctx, "No such alias")
                }
            }
        }
        _ => {
            let expansion = ctx.argv_eol[2].clone();
            app.settings
                .main
                .borrow_mut()
                .set("alias", &ctx.argv[1], &expansion, true);
            printer.add_client_msg(
                &format!("alias {} = {}", ctx.argv[1], expansion),
                &MsgTarget::CurrentBuffer,
            );
            HookStatus::Ok
        }
    }
}

fn unalias(app: &App, ctx: &CommandCtx) -> HookStatus {
    match app
        .settings
        .main
        .borrow_mut()
        .unset("alias", &ctx.argv[1])
    {
        UnsetResult::Removed => HookStatus::Ok,
        _ => err(app, ctx, "No such alias"),
    }
}

fn away(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    let msg = if ctx.argv.len() > 1 {
        Some(ctx.argv_eol[1].as_str())
    } else {
        None
    };
    if let Some(mut client) = app.find_client(&serv) {
        client.away(msg);
    }
    HookStatus::Ok
}

fn clear(app: &App, ctx: &CommandCtx) -> HookStatus {
    app.core.buffer_clear(ctx.buffer);
    HookStatus::Ok
}

fn close(app: &App, ctx: &CommandCtx) -> HookStatus {
    let serv = buffers::buffer_serv(app, ctx.buffer);
    if let (Some(serv), Some(chan)) = (&serv, buffers::buffer_chan(app, ctx.buffer)) {
        if let Some(mut client) = app.find_client(serv) {
            client.part(ChanNameRef::new(&chan));
        }
    }
    app.core.buffer_close(ctx.buffer);
    HookStatus::Ok
}

fn connect(app: &App, ctx: &CommandCtx) -> HookStatus {
    if ctx.argv.len() == 1 {
        // Reconnect the current buffer's server.
        let Some(serv) = buffer_serv_or_err(app, ctx) else {
            return HookStatus::Error;
        };
        match app.find_client(&serv) {
            Some(mut client) => {
                client.reconnect(None);
                HookStatus::Ok
            }
            None => err(app, ctx, "Not connected; use /connect <server>"),
        }
    } else {
        let name = &ctx.argv[1];
        if app.find_client(name).is_some() {
            return err(app, ctx, "Already connected to that server");
        }
        let servers = app.settings.servers();
        match servers.into_iter().find(|s| s.name == *name) {
            Some(config) => {
                app.spawn_session(config);
                HookStatus::Ok
            }
            None => err(app, ctx, "No such server in [servers]"),
        }
    }
}

fn dcc(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    let Some(client) = app.find_client(&serv) else {
        return err(app, ctx, "Not connected");
    };
    let printer = Printer::new(app);

    let sub = ctx.argv.get(1).map(String::as_str).unwrap_or("list");
    match sub {
        "list" => {
            for t in client.dcc_transfers() {
                printer.add_client_msg(
                    &format!(
                        "#{} {:?} {:?} {} {} {}/{}",
                        t.id.0,
                        t.direction,
                        t.kind,
                        t.peer_nick,
                        t.filename,
                        t.pos,
                        t.size.map(|s| s.to_string()).unwrap_or_else(|| "?".to_owned()),
                    ),
                    &MsgTarget::CurrentBuffer,
                );
            }
            HookStatus::Ok
        }
        "accept" | "chat" => match ctx.argv.get(2).and_then(|s| s.parse().ok()) {
            Some(id) => {
                client.dcc_accept(lattice_client::dcc::TransferId(id));
                HookStatus::Ok
            }
            None => err(app, ctx, "Usage: /dcc accept <id>"),
        },
        "abort" => match ctx.argv.get(2).and_then(|s| s.parse().ok()) {
            Some(id) => {
                client.dcc_abort(lattice_client::dcc::TransferId(id));
                HookStatus::Ok
            }
            None => err(app, ctx, "Usage: /dcc abort <id>"),
        },
        "send" => {
            // Quoted paths survive word splitting.
            let words = ctx
                .argv_eol
                .get(2)
                .map(|rest| shell_words::split(rest).unwrap_or_default())
                .unwrap_or_default();
            let [nick, path] = words.as_slice() else {
                return err(app, ctx, "Usage: /dcc send <nick> <file>");
            };
            client.dcc_send_file(nick, PathBuf::from(path));
            HookStatus::Ok
        }
        _ => err(app, ctx, "Usage: /dcc [list | accept <id> | abort <id> | send <nick> <file>]"),
    }
}

fn help(app: &App, _ctx: &CommandCtx) -> HookStatus {
    let printer = Printer::new(app);
    printer.add_client_msg("Commands:", &MsgTarget::CurrentBuffer);
    for spec in app.core.command_specs() {
        printer.add_client_msg(
            &format!("/{:<10} {:<45} usage: {}", spec.name, spec.description, spec.usage),
            &MsgTarget::CurrentBuffer,
        );
    }
    HookStatus::Ok
}

fn join(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    let chans: Vec<ChanName> = settings::split_list(&ctx.argv[1])
        .into_iter()
        .map(ChanName::new)
        .collect();
    if chans.is_empty() {
        return err(app, ctx, "Usage: /join <chan>[,<chan>...]");
    }
    match app.find_client(&serv) {
        Some(mut client) => {
            client.join(chans.iter().map(|c| c.as_ref()));
            HookStatus::Ok
        }
        None => err(app, ctx, "Not connected"),
    }
}

fn me(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    let target = buffers::buffer_chan(app, ctx.buffer)
        .or_else(|| buffers::buffer_nick(app, ctx.buffer));
    let Some(target) = target else {
        return err(app, ctx, "/me needs a channel or private buffer");
    };
    send_msg(
        app,
        ctx.buffer,
        &serv,
        &target,
        &ctx.argv_eol[1],
        true,
        false,
        ctx.origin,
    );
    HookStatus::Ok
}

fn mode(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    match app.find_client(&serv) {
        Some(mut client) => {
            client.raw_msg(&format!("MODE {}", ctx.argv_eol[1]));
            HookStatus::Ok
        }
        None => err(app, ctx, "Not connected"),
    }
}

fn msg(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    let target = &ctx.argv[1];
    let text = &ctx.argv_eol[2];
    // Messages to services stay on the server buffer; anything else gets
    // its conversation buffer.
    let buffer = if target.starts_with(|c| c == '#' || c == '&')
    {
        buffers::chan_buffer(app, &serv, ChanNameRef::new(target))
    } else if target.eq_ignore_ascii_case("nickserv") || target.eq_ignore_ascii_case("chanserv") {
        buffers::server_buffer(app, &serv)
    } else {
        buffers::user_buffer(app, &serv, target)
    };
    send_msg(app, buffer, &serv, target, text, false, false, ctx.origin);
    HookStatus::Ok
}

fn names(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    let Some(chan) = buffers::buffer_chan(app, ctx.buffer) else {
        return err(app, ctx, "/names only works on a channel buffer");
    };
    let Some(client) = app.find_client(&serv) else {
        return err(app, ctx, "Not connected");
    };
    let nicks = client.get_chan_nicks(ChanNameRef::new(&chan));
    let printer = Printer::new(app);
    match ctx.argv.get(1) {
        None => {
            printer.add_client_msg(
                &format!("{} users: {}", nicks.len(), nicks.join(", ")),
                &MsgTarget::CurrentBuffer,
            );
        }
        Some(nick) => {
            let present = nicks.iter().any(|n| lattice_common::nick_eq(n, nick));
            printer.add_client_msg(
                &format!(
                    "{} is {}",
                    nick,
                    if present { "on the channel" } else { "not on the channel" }
                ),
                &MsgTarget::CurrentBuffer,
            );
        }
    }
    HookStatus::Ok
}

fn nick(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    match app.find_client(&serv) {
        Some(mut client) => {
            client.nick(&ctx.argv[1]);
            HookStatus::Ok
        }
        None => err(app, ctx, "Not connected"),
    }
}

fn notice(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    send_msg(
        app,
        ctx.buffer,
        &serv,
        &ctx.argv[1],
        &ctx.argv_eol[2],
        false,
        true,
        ctx.origin,
    );
    HookStatus::Ok
}

fn part(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    let chan = ctx
        .argv
        .get(1)
        .cloned()
        .or_else(|| buffers::buffer_chan(app, ctx.buffer));
    let Some(chan) = chan else {
        return err(app, ctx, "/part needs a channel");
    };
    match app.find_client(&serv) {
        Some(mut client) => {
            client.part(ChanNameRef::new(&chan));
            HookStatus::Ok
        }
        None => err(app, ctx, "Not connected"),
    }
}

fn query(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    let nick = &ctx.argv[1];
    let buffer = buffers::user_buffer(app, &serv, nick);
    app.core.set_current_buffer(buffer);
    if ctx.argv.len() > 2 {
        send_msg(app, buffer, &serv, nick, &ctx.argv_eol[2], false, false, ctx.origin);
    }
    HookStatus::Ok
}

fn quit(app: &App, ctx: &CommandCtx) -> HookStatus {
    let reason = if ctx.argv.len() > 1 {
        Some(ctx.argv_eol[1].clone())
    } else {
        None
    };
    app.shutdown(reason);
    HookStatus::OkEat
}

fn quote(app: &App, ctx: &CommandCtx) -> HookStatus {
    let Some(serv) = buffer_serv_or_err(app, ctx) else {
        return HookStatus::Error;
    };
    match app.find_client(&serv) {
        Some(mut client) => {
            client.raw_msg(&ctx.argv_eol[1]);
            HookStatus::Ok
        }
        None => err(app, ctx, "Not connected"),
    }
}

fn unset(app: &App, ctx: &CommandCtx) -> HookStatus {
    let printer = Printer::new(app);
    let parts: Vec<&str> = ctx.argv[1].splitn(3, '.').collect();
    let &[file_name, section, option] = parts.as_slice() else {
        return err(app, ctx, "Option names look like file.section.option");
    };
    let file = match file_name {
        "lattice" => &app.settings.main,
        "irc" => &app.settings.irc,
        _ => return err(app, ctx, "No such config file"),
    };
    let result = file.borrow_mut().unset(section, option);
    match result {
        UnsetResult::NoReset => {
            printer.add_client_msg("Option already at its default", &MsgTarget::CurrentBuffer);
            HookStatus::Ok
        }
        UnsetResult::Reset => {
            app.settings.apply_to_core(&app.core);
            printer.add_client_msg("Option reset to its default", &MsgTarget::CurrentBuffer);
            HookStatus::Ok
        }
        UnsetResult::Removed => {
            printer.add_client_msg("Option removed", &MsgTarget::CurrentBuffer);
            HookStatus::Ok
        }
        UnsetResult::Error => err(app, ctx, "No such option"),
    }
}

fn script(app: &App, ctx: &CommandCtx) -> HookStatus {
    let printer = Printer::new(app);
    let sub = ctx.argv.get(1).map(String::as_str).unwrap_or("list");
    match sub {
        "list" => {
            let names = app.scripts.borrow().host.names();
            if names.is_empty() {
                printer.add_client_msg("No scripts loaded", &MsgTarget::CurrentBuffer);
            }
            for name in names {
                printer.add_client_msg(&format!("script: {}", name), &MsgTarget::CurrentBuffer);
            }
            HookStatus::Ok
        }
        "load" => match ctx.argv.get(2) {
            Some(path) => {
                let result = app.scripts.borrow_mut().load(std::path::Path::new(path));
                match result {
                    Ok(name) => {
                        printer.add_client_msg(
                            &format!("Loaded script {}", name),
                            &MsgTarget::CurrentBuffer,
                        );
                        HookStatus::Ok
                    }
                    Err(e) => err(app, ctx, &e),
                }
            }
            None => err(app, ctx, "Usage: /script load <file>"),
        },
        "unload" => match ctx.argv.get(2) {
            Some(name) => match app.scripts.try_borrow_mut() {
                Ok(mut scripts) => {
                    if scripts.unload(app, name) {
                        drop(scripts);
                        printer.add_client_msg(
                            &format!("Unloaded script {}", name),
                            &MsgTarget::CurrentBuffer,
                        );
                        HookStatus::Ok
                    } else {
                        drop(scripts);
                        err(app, ctx, "No such script")
                    }
                }
                Err(_) => {
                    // A script is unloading itself from inside one of its
                    // own callbacks; the unload runs after the current
                    // dispatch frame completes.
                    let app_clone = app.clone();
                    let name = name.clone();
                    tokio::task::spawn_local(async move {
                        let mut scripts = app_clone.scripts.borrow_mut();
                        scripts.unload(&app_clone, &name);
                    });
                    HookStatus::Ok
                }
            },
            None => err(app, ctx, "Usage: /script unload <name>"),
        },
        _ => err(app, ctx, "Usage: /script [list | load <file> | unload <name>]"),
    }
}

fn set(app: &App, ctx: &CommandCtx) -> HookStatus {
    let printer = Printer::new(app);
    if ctx.argv.len() == 1 {
        // List everything.
        for file in [&app.settings.main, &app.settings.irc] {
            let file = file.borrow();
            for section in file.sections() {
                for opt in section.options() {
                    printer.add_client_msg(
                        &format!(
                            "{}.{}.{} = {}",
                            file.name(),
                            section.name(),
                            opt.name(),
                            opt.value_str()
                        ),
                        &MsgTarget::CurrentBuffer,
                    );
                }
            }
        }
        return HookStatus::Ok;
    }

    let full_name = &ctx.argv[1];
    let parts: Vec<&str> = full_name.splitn(3, '.').collect();
    let &[file_name, section, option] = parts.as_slice() else {
        return err(app, ctx, "Option names look like file.section.option");
    };
    let file = match file_name {
        "lattice" => &app.settings.main,
        "irc" => &app.settings.irc,
        _ => return err(app, ctx, "No such config file"),
    };

    if ctx.argv.len() == 2 {
        let file = file.borrow();
        return match file.search(section, option) {
            Some(opt) => {
                printer.add_client_msg(
                    &format!("{} = {}", full_name, opt.value_str()),
                    &MsgTarget::CurrentBuffer,
                );
                HookStatus::Ok
            }
            None => {
                drop(file);
                err(app, ctx, "No such option")
            }
        };
    }

    let value = &ctx.argv_eol[2];
    let result = file.borrow_mut().set(section, option, value, true);
    match result {
        SetResult::Changed => {
            let stored = file
                .borrow()
                .search(section, option)
                .map(|o| o.value().clone());
            if let Some(stored) = stored {
                settings::notify_change(&app.core, full_name, &stored);
            }
            // Core-facing options take effect immediately.
            app.settings.apply_to_core(&app.core);
            printer.add_client_msg(
                &format!("{} set to {}", full_name, value),
                &MsgTarget::CurrentBuffer,
            );
            HookStatus::Ok
        }
        SetResult::SameValue => {
            printer.add_client_msg(
                &format!("{} unchanged", full_name),
                &MsgTarget::CurrentBuffer,
            );
            HookStatus::Ok
        }
        SetResult::NotFound => err(app, ctx, "No such option"),
        SetResult::Error => err(app, ctx, "Invalid value for that option"),
    }
}
