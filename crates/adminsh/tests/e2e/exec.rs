use super::common::{TestServer, exec};

#[tokio::test]
async fn test_exec_reports_success() {
    let server = TestServer::start().await;
    let session = server.login().await;

    let out = exec(&session, "setconf 2 motd hello").await;
    assert_eq!(out.stdout, "[2] motd = hello\r\n");
    assert_eq!(out.exit_status, Some(0));

    let out = exec(&session, "getconf 2 motd").await;
    assert_eq!(out.stdout, "[2] motd = hello\r\n");
    assert_eq!(out.exit_status, Some(0));

    let out = exec(&session, "clearconf 2 motd").await;
    assert_eq!(out.stdout, "[2] Cleared value for motd\r\n");
    assert_eq!(out.exit_status, Some(0));

    let out = exec(&session, "getconf 2 motd").await;
    assert_eq!(out.stdout, "[2] motd = \r\n");

    server.wait_for_sessions(0).await;
    server.stop().await;
}

#[tokio::test]
async fn test_exec_reports_failure() {
    let server = TestServer::start().await;
    let session = server.login().await;

    let out = exec(&session, "start 99").await;
    assert_eq!(out.stdout, "error: no such server\r\n");
    assert_eq!(out.exit_status, Some(1));

    let out = exec(&session, "launch 1").await;
    assert_eq!(out.stdout, "error: unknown command\r\n");
    assert_eq!(out.exit_status, Some(1));

    let out = exec(&session, "stop").await;
    assert_eq!(out.stdout, "error: argument count mismatch\r\n");
    assert_eq!(out.exit_status, Some(1));

    server.stop().await;
}

#[tokio::test]
async fn test_exec_without_output() {
    let server = TestServer::start().await;
    let session = server.login().await;

    for line in ["", "   ", "exit"] {
        let out = exec(&session, line).await;
        assert!(out.stdout.is_empty(), "{line:?} wrote {:?}", out.stdout);
        assert_eq!(out.exit_status, Some(0));
    }

    server.stop().await;
}
