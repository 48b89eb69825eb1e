use super::common::{TestServer, collect, exec, open_shell, read_until, send};

#[tokio::test]
async fn test_direct_tcpip_refused() {
    let server = TestServer::start().await;
    let session = server.login().await;

    let result = session
        .channel_open_direct_tcpip("127.0.0.1", 22, "127.0.0.1", 40000)
        .await;
    assert!(result.is_err(), "port forwarding was accepted");

    // The connection survives the refusal.
    let out = exec(&session, "start 1").await;
    assert_eq!(out.stdout, "[1] Started\r\n");

    server.stop().await;
}

#[tokio::test]
async fn test_session_ceiling() {
    let server = TestServer::start_with(|b| b.max_sessions(1)).await;
    let session = server.login().await;

    let mut first = open_shell(&session, false).await;
    server.wait_for_sessions(1).await;

    assert!(
        session.channel_open_session().await.is_err(),
        "second session opened past the ceiling"
    );

    send(&first, "exit\n").await;
    collect(&mut first).await;
    server.wait_for_sessions(0).await;

    let out = exec(&session, "start 2").await;
    assert_eq!(out.stdout, "[2] Started\r\n");

    server.stop().await;
}

#[tokio::test]
async fn test_abrupt_disconnect_is_isolated() {
    let server = TestServer::start().await;

    let doomed = server.login().await;
    let doomed_channel = open_shell(&doomed, false).await;

    let survivor = server.login().await;
    let mut channel = open_shell(&survivor, false).await;
    server.wait_for_sessions(2).await;

    drop(doomed_channel);
    drop(doomed);
    server.wait_for_sessions(1).await;

    send(&channel, "start 1\n").await;
    read_until(&mut channel, "[1] Started\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn test_connection_ids_are_unique() {
    let server = TestServer::start().await;

    let a = server.login().await;
    let b = server.login().await;
    let _ca = open_shell(&a, false).await;
    let _cb = open_shell(&b, false).await;
    server.wait_for_sessions(2).await;

    let sessions = server.state().sessions.sessions();
    assert_ne!(sessions[0].connection_id, sessions[1].connection_id);
    assert_ne!(sessions[0].id, sessions[1].id);

    server.stop().await;
}
