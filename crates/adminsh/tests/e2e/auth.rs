use std::time::Duration;

use tokio::time::{sleep, timeout};

use super::common::{
    DEFAULT_TIMEOUT, TEST_PASSWORD, TEST_USER, TestServer, open_shell, read_until, send,
};

#[tokio::test]
async fn test_wrong_password_rejected() {
    let server = TestServer::start().await;
    let mut session = server.connect().await;

    let ok = session
        .authenticate_password(TEST_USER, "wrong")
        .await
        .expect("authenticate");
    assert!(!ok, "wrong password accepted");

    let ok = session
        .authenticate_password("nobody", TEST_PASSWORD)
        .await
        .expect("authenticate");
    assert!(!ok, "unknown user accepted");

    let ok = session
        .authenticate_password(TEST_USER, TEST_PASSWORD)
        .await
        .expect("authenticate");
    assert!(ok, "correct password rejected after earlier failures");

    server.stop().await;
}

#[tokio::test]
async fn test_retry_after_wrong_password() {
    let server = TestServer::start().await;
    let mut session = server.connect().await;

    let ok = session
        .authenticate_password(TEST_USER, "hunter3")
        .await
        .expect("first attempt");
    assert!(!ok);

    let ok = session
        .authenticate_password(TEST_USER, TEST_PASSWORD)
        .await
        .expect("second attempt");
    assert!(ok, "retry on the same connection failed");

    let mut channel = open_shell(&session, false).await;
    send(&channel, "getconf 1 motd\n").await;
    read_until(&mut channel, "[1] motd = \r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn test_connection_dropped_after_attempt_limit() {
    let server = TestServer::start_with(|builder| builder.max_auth_attempts(2)).await;
    let mut session = server.connect().await;

    for _ in 0..2 {
        let result = session.authenticate_password(TEST_USER, "wrong").await;
        assert!(!matches!(result, Ok(true)));
    }

    let result = session.authenticate_password(TEST_USER, TEST_PASSWORD).await;
    assert!(!matches!(result, Ok(true)), "login accepted after the attempt limit");

    timeout(DEFAULT_TIMEOUT, async {
        while !session.is_closed() {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("connection still open after the attempt limit");

    // The limit is per connection.
    let _fresh = server.login().await;

    server.stop().await;
}
