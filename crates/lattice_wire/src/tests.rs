use super::*;
use std::io::Write;

#[test]
fn test_parse_params() {
    assert_eq!(parse_params("p1 p2 p3"), vec!["p1", "p2", "p3"]);
    let empty: Vec<&str> = vec![];
    assert_eq!(parse_params(""), empty);
    assert_eq!(parse_params(":foo bar baz "), vec!["foo bar baz "]);
    assert_eq!(parse_params(":"), vec![""]);
    assert_eq!(parse_params("x:"), vec!["x:"]);
    assert_eq!(parse_params("x:y:z"), vec!["x:y:z"]);
    assert_eq!(parse_params(":::::"), vec!["::::"]);

    let params = parse_params("1 2 3 4 5 6 7 8 9 10 11 12 13 14 blah blah blah");
    assert_eq!(params.len(), 15);
    assert_eq!(params[params.len() - 1], "blah blah blah");

    assert_eq!(parse_params("x y : : :"), vec!["x", "y", " : :"]);
    assert_eq!(parse_params("aaa://aaa"), vec!["aaa://aaa"]);
}

#[test]
fn test_privmsg_parsing() {
    let mut buf = vec![];
    write!(
        &mut buf,
        ":nick!~nick@unaffiliated/nick PRIVMSG me :a b c\r\n"
    )
    .unwrap();
    assert_eq!(
        parse_irc_msg(&mut buf).unwrap().unwrap(),
        Msg {
            pfx: Some(Pfx::User {
                nick: "nick".to_owned(),
                user: "~nick@unaffiliated/nick".to_owned(),
            }),
            cmd: Cmd::PRIVMSG {
                target: MsgTarget::User("me".to_owned()),
                msg: "a b c".to_owned(),
                is_notice: false,
                ctcp: None,
            },
        }
    );
    assert_eq!(buf.len(), 0);
}

#[test]
fn test_notice_parsing() {
    let mut buf = vec![];
    write!(
        &mut buf,
        ":irc.example.net NOTICE * :*** Looking up your hostname...\r\n"
    )
    .unwrap();
    assert_eq!(
        parse_irc_msg(&mut buf).unwrap().unwrap(),
        Msg {
            pfx: Some(Pfx::Server("irc.example.net".to_owned())),
            cmd: Cmd::PRIVMSG {
                target: MsgTarget::User("*".to_owned()),
                msg: "*** Looking up your hostname...".to_owned(),
                is_notice: true,
                ctcp: None,
            },
        }
    );
}

#[test]
fn test_numeric_parsing() {
    let mut buf = vec![];
    write!(
        &mut buf,
        ":irc.example.net 001 me :Welcome to the Example Internet Relay Chat Network me\r\n"
    )
    .unwrap();
    write!(
        &mut buf,
        ":irc.example.net 005 me CHANTYPES=# PREFIX=(ov)@+ CASEMAPPING=rfc1459 \
         :are supported by this server\r\n"
    )
    .unwrap();

    let mut msgs = vec![];
    while let Some(Ok(msg)) = parse_irc_msg(&mut buf) {
        assert_eq!(msg.pfx, Some(Pfx::Server("irc.example.net".to_owned())));
        msgs.push(msg);
    }

    assert_eq!(msgs.len(), 2);
    assert!(matches!(msgs[0].cmd, Cmd::Reply { num: 1, .. }));
    assert!(matches!(msgs[1].cmd, Cmd::Reply { num: 5, .. }));
}

#[test]
fn test_ctcp_action_parsing() {
    let mut buf = vec![];
    write!(
        &mut buf,
        ":dan!u@localhost PRIVMSG #chan :\x01ACTION writes some specs!\x01\r\n"
    )
    .unwrap();
    assert_eq!(
        parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
        Cmd::PRIVMSG {
            target: MsgTarget::Chan(ChanName::new("#chan".to_owned())),
            msg: "writes some specs!".to_owned(),
            is_notice: false,
            ctcp: Some(Ctcp::Action),
        }
    );

    // Missing closing delimiter is tolerated.
    let mut buf = vec![];
    write!(&mut buf, ":a!b@c PRIVMSG target :\x01ACTION waves\r\n").unwrap();
    assert_eq!(
        parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
        Cmd::PRIVMSG {
            target: MsgTarget::User("target".to_owned()),
            msg: "waves".to_owned(),
            is_notice: false,
            ctcp: Some(Ctcp::Action),
        }
    );
}

#[test]
fn test_mode_parsing() {
    let mut buf = vec![];
    write!(&mut buf, ":op!u@h MODE #t -o+v bob bob\r\n").unwrap();
    assert_eq!(
        parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
        Cmd::MODE {
            target: "#t".to_owned(),
            modes: "-o+v bob bob".to_owned(),
        }
    );
}

#[test]
fn test_kick_parsing() {
    let mut buf = vec![];
    write!(&mut buf, ":op!u@h KICK #t bob :bye\r\n").unwrap();
    assert_eq!(
        parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
        Cmd::KICK {
            chan: ChanName::new("#t".to_owned()),
            nick: "bob".to_owned(),
            msg: Some("bye".to_owned()),
        }
    );
}

#[test]
fn test_error_parsing() {
    let mut buf = vec![];
    write!(&mut buf, "ERROR :Closing Link: 10.0.0.1 (Excess Flood)\r\n").unwrap();
    assert_eq!(
        parse_irc_msg(&mut buf).unwrap().unwrap(),
        Msg {
            pfx: None,
            cmd: Cmd::ERROR {
                msg: "Closing Link: 10.0.0.1 (Excess Flood)".to_owned(),
            },
        },
    );
}

#[test]
fn test_parse_pfx() {
    use Pfx::*;
    assert_eq!(parse_pfx("xyz"), Ambiguous("xyz".to_string()));
    assert_eq!(parse_pfx("xy.z"), Server("xy.z".to_string()));
    assert_eq!(
        parse_pfx("xyz[m]"),
        User {
            nick: "xyz[m]".to_string(),
            user: "".to_string()
        }
    );
    assert_eq!(
        parse_pfx("nick!user@x.y.example"),
        User {
            nick: "nick".to_string(),
            user: "user@x.y.example".to_string(),
        }
    );
}

// Framing: three writes, the first ending in a bare CR that might be half a
// CRLF. Nothing may dispatch until the second write arrives; in total
// exactly three messages come out, in order.
#[test]
fn test_framing_split_writes() {
    let mut buf: Vec<u8> = Vec::new();

    buf.extend_from_slice(b":a PRIVMSG #c :hi\r");
    assert_eq!(parse_irc_msg(&mut buf), None);

    buf.extend_from_slice(b":b PART #c\r\n");
    let m1 = parse_irc_msg(&mut buf).unwrap().unwrap();
    assert_eq!(m1.pfx, Some(Pfx::Ambiguous("a".to_owned())));
    assert!(matches!(m1.cmd, Cmd::PRIVMSG { .. }));
    let m2 = parse_irc_msg(&mut buf).unwrap().unwrap();
    assert_eq!(m2.pfx, Some(Pfx::Ambiguous("b".to_owned())));
    assert!(matches!(m2.cmd, Cmd::PART { .. }));
    assert_eq!(parse_irc_msg(&mut buf), None);

    buf.extend_from_slice(b":d PRIVMSG #c :ho\r\n");
    let m3 = parse_irc_msg(&mut buf).unwrap().unwrap();
    assert_eq!(m3.pfx, Some(Pfx::Ambiguous("d".to_owned())));
    assert!(matches!(m3.cmd, Cmd::PRIVMSG { .. }));
    assert_eq!(buf.len(), 0);
}

#[test]
fn test_framing_bare_lf() {
    let mut buf: Vec<u8> = b":a PING x\n:b PING y\n".to_vec();
    assert!(parse_irc_msg(&mut buf).unwrap().is_ok());
    assert!(parse_irc_msg(&mut buf).unwrap().is_ok());
    assert_eq!(parse_irc_msg(&mut buf), None);
}

#[test]
fn test_framing_skips_empty_lines() {
    let mut buf: Vec<u8> = b"\r\n\r\nPING x\r\n".to_vec();
    let msg = parse_irc_msg(&mut buf).unwrap().unwrap();
    assert!(matches!(msg.cmd, Cmd::PING { .. }));
}

#[test]
fn test_enforce_line_len() {
    let mut short = "PRIVMSG #c :hi\r\n".to_owned();
    assert!(!enforce_line_len(&mut short));
    assert_eq!(short, "PRIVMSG #c :hi\r\n");

    let mut long = format!("PRIVMSG #c :{}\r\n", "x".repeat(600));
    assert!(enforce_line_len(&mut long));
    assert_eq!(long.len(), MAX_LINE_LEN);
    assert!(long.ends_with("\r\n"));
}

#[test]
fn test_drop_nick_prefix() {
    assert_eq!(drop_nick_prefix("@op"), "op");
    assert_eq!(drop_nick_prefix("+voiced"), "voiced");
    assert_eq!(drop_nick_prefix("plain"), "plain");
}
