use super::*;
use crate::dcc::DccConfig;
use crate::ListThenStop;

use tokio::sync::mpsc;

fn test_config() -> ServerConfig {
    ServerConfig {
        name: "testnet".to_owned(),
        addr: "irc.test.example".to_owned(),
        port: 6667,
        tls: false,
        connector: None,
        pass: None,
        nicks: vec!["alice".to_owned(), "alice_".to_owned(), "alicex".to_owned()],
        username: "alice".to_owned(),
        realname: "Alice".to_owned(),
        auto_join: Vec::new(),
        on_connect_cmds: Vec::new(),
        command_delay: Duration::ZERO,
        reconnect: false,
        reconnect_delay: Duration::from_secs(30),
        ping_interval: Duration::from_secs(60),
        dcc: DccConfig::default(),
    }
}

struct Harness {
    state: State,
    snd_ev: mpsc::Sender<Event>,
    rcv_ev: mpsc::Receiver<Event>,
    snd_msg: mpsc::Sender<String>,
    rcv_msg: mpsc::Receiver<String>,
}

fn harness() -> Harness {
    let (snd_ev, rcv_ev) = mpsc::channel(100);
    let (snd_msg, rcv_msg) = mpsc::channel(100);
    Harness {
        state: State::new(test_config(), Rc::new(ListThenStop)),
        snd_ev,
        rcv_ev,
        snd_msg,
        rcv_msg,
    }
}

impl Harness {
    fn inject(&mut self, line: &str) -> UpdateStatus {
        let mut msg = wire::parse_one_message(line).unwrap();
        let mut snd_ev = self.snd_ev.clone();
        let mut snd_msg = self.snd_msg.clone();
        self.state.update(&mut msg, &mut snd_ev, &mut snd_msg)
    }

    fn drain_outbound(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rcv_msg.try_recv() {
            out.push(msg);
        }
        out
    }

    fn drain_events(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = self.rcv_ev.try_recv() {
            out.push(ev);
        }
        out
    }
}

#[test]
fn ping_answered_with_pong() {
    let mut h = harness();
    h.inject("PING :irc.test.example");
    assert_eq!(h.drain_outbound(), vec!["PONG irc.test.example\r\n"]);
}

#[test]
fn nick_fallback_walks_list_then_gives_up() {
    let mut h = harness();

    let status = h.inject(":srv 433 * alice :Nickname is already in use");
    assert_eq!(status, UpdateStatus::Continue);
    assert_eq!(h.drain_outbound(), vec!["NICK alice_\r\n"]);
    assert_eq!(h.state.get_nick(), "alice_");

    let status = h.inject(":srv 433 * alice_ :Nickname is already in use");
    assert_eq!(status, UpdateStatus::Continue);
    assert_eq!(h.drain_outbound(), vec!["NICK alicex\r\n"]);

    let status = h.inject(":srv 433 * alicex :Nickname is already in use");
    assert_eq!(status, UpdateStatus::Disconnect("all nicks in use".to_owned()));
    assert!(h.drain_outbound().is_empty());
    assert!(h
        .drain_events()
        .iter()
        .any(|ev| matches!(ev, Event::AllNicksInUse)));
}

#[test]
fn welcome_sets_authoritative_nick() {
    let mut h = harness();
    h.inject(":srv 001 alice :Welcome to the Test Network alice");
    assert!(h.state.is_registered());
    assert_eq!(h.state.get_nick(), "alice");

    // 433 after registration is a failed rename, not a fallback trigger.
    let status = h.inject(":srv 433 alice bob :Nickname is already in use");
    assert_eq!(status, UpdateStatus::Continue);
    assert!(h.drain_outbound().is_empty());
}

#[test]
fn join_and_names_populate_channel() {
    let mut h = harness();
    h.inject(":alice!a@h JOIN #t");
    h.inject(":srv 353 alice = #t :alice @op +voiced bob");
    h.inject(":srv 366 alice #t :End of /NAMES list.");

    let nicks = h.state.get_chan_nicks(ChanNameRef::new("#t"));
    assert_eq!(nicks, vec!["alice", "bob", "op", "voiced"]);
    assert_eq!(
        h.state.nick_flags(ChanNameRef::new("#t"), "op"),
        Some(nick_flags::OP)
    );
    assert_eq!(
        h.state.nick_flags(ChanNameRef::new("#t"), "voiced"),
        Some(nick_flags::VOICE)
    );
    assert_eq!(h.state.nick_flags(ChanNameRef::new("#t"), "bob"), Some(0));
    assert_eq!(h.state.joined_chans().len(), 1);
}

#[test]
fn mode_with_parameter_sets_and_clears_flags() {
    let mut h = harness();
    h.inject(":alice!a@h JOIN #t");
    h.inject(":srv 353 alice = #t :alice bob");

    h.inject(":op!u@h MODE #t +o bob");
    assert_eq!(
        h.state.nick_flags(ChanNameRef::new("#t"), "bob"),
        Some(nick_flags::OP)
    );

    h.inject(":op!u@h MODE #t -o+v bob bob");
    assert_eq!(
        h.state.nick_flags(ChanNameRef::new("#t"), "bob"),
        Some(nick_flags::VOICE)
    );
}

#[test]
fn mode_inverse_restores_flags() {
    let mut h = harness();
    h.inject(":alice!a@h JOIN #t");
    h.inject(":srv 353 alice = #t :alice bob");
    let before = h.state.nick_flags(ChanNameRef::new("#t"), "bob");

    h.inject(":op!u@h MODE #t +o bob");
    h.inject(":op!u@h MODE #t -o bob");
    assert_eq!(h.state.nick_flags(ChanNameRef::new("#t"), "bob"), before);
}

#[test]
fn channel_key_and_limit() {
    let mut h = harness();
    h.inject(":alice!a@h JOIN #t");
    h.inject(":op!u@h MODE #t +lk 50 sekrit");
    let inner = h.state.inner.borrow();
    let chan = &inner.chans[0];
    assert_eq!(chan.key.as_deref(), Some("sekrit"));
    assert_eq!(chan.limit, 50);
    drop(inner);

    h.inject(":op!u@h MODE #t -k sekrit");
    let inner = h.state.inner.borrow();
    assert_eq!(inner.chans[0].key, None);
}

#[test]
fn part_and_kick_remove_nicks_and_channels() {
    let mut h = harness();
    h.inject(":alice!a@h JOIN #t");
    h.inject(":srv 353 alice = #t :alice bob carol");

    h.inject(":bob!b@h PART #t");
    assert_eq!(
        h.state.get_chan_nicks(ChanNameRef::new("#t")),
        vec!["alice", "carol"]
    );

    h.inject(":op!u@h KICK #t carol :bye");
    assert_eq!(h.state.get_chan_nicks(ChanNameRef::new("#t")), vec!["alice"]);

    // Kicked ourselves: channel state goes away.
    h.inject(":op!u@h KICK #t alice :bye");
    assert!(h.state.chan_snapshot(ChanNameRef::new("#t")).is_none());
}

#[test]
fn nick_change_updates_all_channels() {
    let mut h = harness();
    h.inject(":alice!a@h JOIN #a");
    h.inject(":srv 353 alice = #a :alice bob");
    h.inject(":alice!a@h JOIN #b");
    h.inject(":srv 353 alice = #b :alice bob");

    let mut msg = wire::parse_one_message(":bob!b@h NICK robert").unwrap();
    let mut snd_ev = h.snd_ev.clone();
    let mut snd_msg = h.snd_msg.clone();
    h.state.update(&mut msg, &mut snd_ev, &mut snd_msg);

    // The channels the user was in are filled in for consumers.
    match msg.cmd {
        wire::Cmd::NICK { chans, .. } => assert_eq!(chans.len(), 2),
        other => panic!("unexpected cmd {:?}", other),
    }
    assert!(h
        .state
        .get_chan_nicks(ChanNameRef::new("#a"))
        .contains(&"robert".to_owned()));
    assert!(h
        .state
        .get_chan_nicks(ChanNameRef::new("#b"))
        .contains(&"robert".to_owned()));
}

#[test]
fn quit_fills_in_channels() {
    let mut h = harness();
    h.inject(":alice!a@h JOIN #a");
    h.inject(":srv 353 alice = #a :alice bob");

    let mut msg = wire::parse_one_message(":bob!b@h QUIT :out").unwrap();
    let mut snd_ev = h.snd_ev.clone();
    let mut snd_msg = h.snd_msg.clone();
    h.state.update(&mut msg, &mut snd_ev, &mut snd_msg);
    match msg.cmd {
        wire::Cmd::QUIT { chans, .. } => assert_eq!(chans.len(), 1),
        other => panic!("unexpected cmd {:?}", other),
    }
    assert_eq!(h.state.get_chan_nicks(ChanNameRef::new("#a")), vec!["alice"]);
}

#[test]
fn server_error_disconnects() {
    let mut h = harness();
    let status = h.inject("ERROR :Closing Link: flooding");
    assert_eq!(
        status,
        UpdateStatus::Disconnect("Closing Link: flooding".to_owned())
    );
}

#[test]
fn kill_on_us_disconnects() {
    let mut h = harness();
    let status = h.inject(":oper!o@h KILL alice :misbehaving");
    assert_eq!(status, UpdateStatus::Disconnect("misbehaving".to_owned()));

    // KILL on someone else is not our problem.
    let status = h.inject(":oper!o@h KILL bob :misbehaving");
    assert_eq!(status, UpdateStatus::Continue);
}

#[test]
fn isupport_feeds_mode_hints() {
    let mut h = harness();
    h.inject(":srv 005 alice PREFIX=(ov)@+ CHANMODES=b,k,l,imnpst :are supported by this server");
    assert_eq!(h.state.isupport_tokens().len(), 2);

    // 'h' is no longer a membership letter per this server's PREFIX, so
    // "+h x" consumes no parameter and sets a plain channel mode.
    h.inject(":alice!a@h JOIN #t");
    h.inject(":srv 353 alice = #t :alice harry");
    h.inject(":op!u@h MODE #t +h harry");
    assert_eq!(h.state.nick_flags(ChanNameRef::new("#t"), "harry"), Some(0));
}

#[test]
fn end_of_motd_joins_configured_channels() {
    let mut config = test_config();
    config.auto_join = vec![
        ChanName::new("#one".to_owned()),
        ChanName::new("#two".to_owned()),
    ];
    let (snd_ev, _rcv_ev) = mpsc::channel(100);
    let (snd_msg, mut rcv_msg) = mpsc::channel(100);
    let state = State::new(config, Rc::new(ListThenStop));

    let mut msg = wire::parse_one_message(":srv 376 alice :End of /MOTD command.").unwrap();
    let mut snd_ev = snd_ev.clone();
    let mut snd_msg2 = snd_msg.clone();
    state.update(&mut msg, &mut snd_ev, &mut snd_msg2);

    assert_eq!(rcv_msg.try_recv().unwrap(), "JOIN #one,#two\r\n");
}

#[test]
fn lag_measured_from_pong() {
    let mut h = harness();
    h.inject(":srv 002 alice :Your host is irc.test.example[1.2.3.4/6667], running version x");
    let mut snd_msg = h.snd_msg.clone();
    h.state.send_ping(&mut snd_msg);
    assert_eq!(h.drain_outbound(), vec!["PING irc.test.example\r\n"]);

    h.inject(":srv PONG irc.test.example :irc.test.example");
    assert!(h.state.lag_ms().is_some());
    assert!(h
        .drain_events()
        .iter()
        .any(|ev| matches!(ev, Event::Lag { .. })));
}

#[test]
fn away_tracking() {
    let mut h = harness();
    h.inject(":alice!a@h JOIN #t");
    h.inject(":srv 353 alice = #t :alice bob");
    h.inject(":srv 301 alice bob :gone fishing");
    assert_eq!(
        h.state.nick_flags(ChanNameRef::new("#t"), "bob"),
        Some(nick_flags::AWAY)
    );
}
