use crate::conn::test_support::{inject, FakeSession};
use crate::settings::Settings;
use crate::App;

use lattice_common::BufferId;
use lattice_core::{Core, SignalData};

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::mpsc;

fn test_app(tag: &str) -> App {
    let dir = std::env::temp_dir().join(format!("lattice_bin_test_{}", tag));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    let settings = Settings::load(&dir).unwrap();

    let core = Core::new();
    settings.apply_to_core(&core);
    let (shutdown_tx, _shutdown_rx) = mpsc::channel(1);
    App {
        core,
        logger: None,
        clients: Rc::new(RefCell::new(Vec::new())),
        settings: Rc::new(settings),
        scripts: Rc::new(RefCell::new(crate::scripts::Scripts::default())),
        shutdown_tx,
    }
}

fn fake_session() -> FakeSession {
    FakeSession {
        serv: "testnet".to_owned(),
        nick: "alice".to_owned(),
        notices: Vec::new(),
    }
}

fn last_line(app: &App, buffer: BufferId) -> String {
    app.core
        .with_buffer(buffer, |b| b.lines.last().map(|l| l.msg.clone()))
        .flatten()
        .unwrap_or_default()
}

#[test]
fn privmsg_lands_in_channel_buffer() {
    let app = test_app("privmsg");
    let mut session = fake_session();

    inject(&app, &mut session, ":alice!a@h JOIN #t");
    let chan_buf = app.core.find_buffer("irc", "testnet/#t").unwrap();

    inject(&app, &mut session, ":bob!b@h PRIVMSG #t :hello world");
    assert_eq!(last_line(&app, chan_buf), "hello world");
    let highlighted = app
        .core
        .with_buffer(chan_buf, |b| b.lines.last().unwrap().highlight)
        .unwrap();
    assert!(!highlighted);
}

#[test]
fn mention_of_own_nick_highlights() {
    let app = test_app("highlight");
    let mut session = fake_session();

    inject(&app, &mut session, ":alice!a@h JOIN #t");
    let chan_buf = app.core.find_buffer("irc", "testnet/#t").unwrap();

    inject(&app, &mut session, ":bob!b@h PRIVMSG #t :hey alice, ping");
    let highlighted = app
        .core
        .with_buffer(chan_buf, |b| b.lines.last().unwrap().highlight)
        .unwrap();
    assert!(highlighted);

    // Messages we sent ourselves never highlight, even with our nick in
    // them.
    inject(&app, &mut session, ":alice!a@h PRIVMSG #t :alice here");
    let highlighted = app
        .core
        .with_buffer(chan_buf, |b| b.lines.last().unwrap().highlight)
        .unwrap();
    assert!(!highlighted);
}

#[test]
fn configured_highlight_patterns_apply() {
    let app = test_app("patterns");
    app.core.set_highlight_patterns(vec!["deploy*".to_owned()]);
    let mut session = fake_session();

    inject(&app, &mut session, ":alice!a@h JOIN #t");
    let chan_buf = app.core.find_buffer("irc", "testnet/#t").unwrap();
    inject(&app, &mut session, ":bob!b@h PRIVMSG #t :deployment rolling");
    let highlighted = app
        .core
        .with_buffer(chan_buf, |b| b.lines.last().unwrap().highlight)
        .unwrap();
    assert!(highlighted);
}

#[test]
fn ctcp_version_gets_a_notice_reply() {
    let app = test_app("ctcp_version");
    let mut session = fake_session();

    inject(&app, &mut session, ":bob!b@h PRIVMSG alice :\x01VERSION\x01");
    assert_eq!(session.notices.len(), 1);
    let (target, reply) = &session.notices[0];
    assert_eq!(target, "bob");
    assert!(reply.starts_with("\x01VERSION lattice"));
}

#[test]
fn ctcp_ping_echoes_payload() {
    let app = test_app("ctcp_ping");
    let mut session = fake_session();

    inject(&app, &mut session, ":bob!b@h PRIVMSG alice :\x01PING 1234\x01");
    assert_eq!(session.notices.len(), 1);
    let (_, reply) = &session.notices[0];
    assert_eq!(reply, "\x01PING 1234\x01");
}

#[test]
fn ctcp_action_renders_as_emote() {
    let app = test_app("ctcp_action");
    let mut session = fake_session();

    inject(&app, &mut session, ":alice!a@h JOIN #t");
    let chan_buf = app.core.find_buffer("irc", "testnet/#t").unwrap();
    inject(
        &app,
        &mut session,
        ":bob!b@h PRIVMSG #t :\x01ACTION waves slowly\x01",
    );
    assert_eq!(last_line(&app, chan_buf), "* bob waves slowly");
}

#[test]
fn whois_numerics_share_the_bracket_formatter() {
    let app = test_app("whois");
    let mut session = fake_session();

    inject(
        &app,
        &mut session,
        ":srv 311 alice bob robert example.org * :Robert",
    );
    let serv_buf = app.core.find_buffer("irc", "testnet").unwrap();
    let line = last_line(&app, serv_buf);
    assert!(line.starts_with("[bob]"), "unexpected line {:?}", line);
    assert!(line.contains("robert"));

    inject(&app, &mut session, ":srv 317 alice bob 42 :seconds idle");
    let line = last_line(&app, serv_buf);
    assert!(line.starts_with("[bob] 42"));
}

#[test]
fn unrouted_numerics_fall_through_to_server_buffer() {
    let app = test_app("fallthrough");
    let mut session = fake_session();

    inject(&app, &mut session, ":srv 900 alice :You are now logged in");
    let serv_buf = app.core.find_buffer("irc", "testnet").unwrap();
    assert!(last_line(&app, serv_buf).contains("logged in"));
}

#[test]
fn inbound_traffic_mirrored_on_signals() {
    let app = test_app("signals");
    let mut session = fake_session();

    let seen: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    app.core.hook_signal(
        None,
        0,
        "testnet,irc_in_*",
        Rc::new(move |_, name, data| {
            if let SignalData::Str(line) = data {
                seen_clone.borrow_mut().push((name.to_owned(), line.clone()));
            }
        }),
    );

    inject(&app, &mut session, ":bob!b@h PRIVMSG alice :psst");
    inject(&app, &mut session, ":bob!b@h JOIN #t");

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "testnet,irc_in_PRIVMSG");
    assert!(seen[0].1.contains("PRIVMSG alice :psst"));
    assert_eq!(seen[1].0, "testnet,irc_in_JOIN");
}

#[test]
fn join_and_part_messages() {
    let app = test_app("joinpart");
    let mut session = fake_session();

    inject(&app, &mut session, ":alice!a@h JOIN #t");
    let chan_buf = app.core.find_buffer("irc", "testnet/#t").unwrap();

    inject(&app, &mut session, ":carol!c@h JOIN #t");
    assert!(last_line(&app, chan_buf).contains("carol joined"));

    inject(&app, &mut session, ":carol!c@h PART #t");
    assert!(last_line(&app, chan_buf).contains("carol left"));

    // Our own PART keeps the buffer for scrollback.
    inject(&app, &mut session, ":alice!a@h PART #t");
    assert!(app.core.find_buffer("irc", "testnet/#t").is_some());
}

#[test]
fn topic_change_shown_on_channel() {
    let app = test_app("topic");
    let mut session = fake_session();

    inject(&app, &mut session, ":alice!a@h JOIN #t");
    let chan_buf = app.core.find_buffer("irc", "testnet/#t").unwrap();
    inject(&app, &mut session, ":op!o@h TOPIC #t :all about lattices");
    assert!(last_line(&app, chan_buf).contains("all about lattices"));
}

#[test]
fn notice_without_open_buffer_goes_to_server() {
    let app = test_app("notice");
    let mut session = fake_session();

    inject(
        &app,
        &mut session,
        ":bob!b@h NOTICE alice :server-wide notice",
    );
    let serv_buf = app.core.find_buffer("irc", "testnet").unwrap();
    assert!(last_line(&app, serv_buf).contains("server-wide notice"));
    // No private buffer was opened for a bare notice.
    assert!(app.core.find_buffer("irc", "testnet/bob").is_none());
}
