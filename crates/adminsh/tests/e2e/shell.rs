use super::common::{TEST_USER, TestServer, collect, exec, open_shell, read_until, send};

#[tokio::test]
async fn test_shell_round_trip() {
    let server = TestServer::start().await;
    let session = server.login().await;

    let mut channel = open_shell(&session, false).await;
    send(&channel, "start 1\n").await;
    let out = read_until(&mut channel, "[1] Started\r\n").await;
    assert_eq!(out, "[1] Started\r\n");
    assert!(server.servers().snapshot(1).expect("server 1").running);

    send(&channel, "setconf 1 motd hello\ngetconf 1 motd\n").await;
    read_until(&mut channel, "[1] motd = hello\r\n[1] motd = hello\r\n").await;

    let info = server.state().sessions.sessions();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].user, TEST_USER);
    assert_eq!(info[0].commands, 3);

    send(&channel, "exit\n").await;
    let rest = collect(&mut channel).await;
    assert!(rest.stdout.is_empty(), "unexpected output: {:?}", rest.stdout);
    assert_eq!(rest.exit_status, Some(0));
    assert!(rest.eof);

    server.wait_for_sessions(0).await;
    server.stop().await;
}

#[tokio::test]
async fn test_errors_keep_shell_open() {
    let server = TestServer::start().await;
    let session = server.login().await;

    let mut channel = open_shell(&session, false).await;
    send(&channel, "frob\n").await;
    read_until(&mut channel, "error: unknown command\r\n").await;

    send(&channel, "start 99\n").await;
    read_until(&mut channel, "error: no such server\r\n").await;

    send(&channel, "help start\n").await;
    let out = read_until(&mut channel, "    Starts the server\r\n").await;
    assert!(out.contains(" start <id>\r\n"), "unexpected help: {out:?}");

    send(&channel, "quit\n").await;
    let rest = collect(&mut channel).await;
    assert_eq!(rest.exit_status, Some(0));
    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_channels_share_servers() {
    let server = TestServer::start().await;
    let session = server.login().await;

    let started = exec(&session, "start 1").await;
    assert_eq!(started.stdout, "[1] Started\r\n");

    let mut first = open_shell(&session, false).await;
    let mut second = open_shell(&session, false).await;
    server.wait_for_sessions(2).await;

    send(&first, "stop 1\n").await;
    send(&second, "stop 1\n").await;
    let a = read_until(&mut first, "\r\n").await;
    let b = read_until(&mut second, "\r\n").await;

    let mut replies = [a, b];
    replies.sort();
    assert_eq!(
        replies,
        [
            "[1] Stopped\r\n".to_string(),
            "error: unable to stop: server is not running\r\n".to_string(),
        ]
    );
    assert!(!server.servers().snapshot(1).expect("server 1").running);

    send(&first, "exit\n").await;
    collect(&mut first).await;
    server.wait_for_sessions(1).await;

    // The other channel is unaffected by its sibling closing.
    send(&second, "start 2\n").await;
    read_until(&mut second, "[2] Started\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn test_pty_shell_prompts_and_echoes() {
    let server = TestServer::start_with(|b| b.prompt("admin> ")).await;
    let session = server.login().await;

    let mut channel = open_shell(&session, true).await;
    read_until(&mut channel, "admin> ").await;

    send(&channel, "getconf 2 k\r").await;
    let out = read_until(&mut channel, "[2] k = \r\nadmin> ").await;
    assert_eq!(out, "getconf 2 k\r\n[2] k = \r\nadmin> ");

    send(&channel, "stx\x7fart 2\r").await;
    let out = read_until(&mut channel, "[2] Started\r\nadmin> ").await;
    assert!(out.contains("\x08 \x08"), "backspace not echoed: {out:?}");

    send(&channel, "\x04").await;
    let rest = collect(&mut channel).await;
    assert_eq!(rest.exit_status, Some(0));
    server.stop().await;
}
