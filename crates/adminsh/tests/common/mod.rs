#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use adminsh::{Credentials, MemoryServers, ServerBuilder, ServerState};
use async_trait::async_trait;
use russh::client;
use russh::{Channel, ChannelMsg};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

pub const TEST_USER: &str = "admin";
pub const TEST_PASSWORD: &str = "hunter2";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client handler that trusts any host key.
pub struct TestClient;

#[async_trait]
impl client::Handler for TestClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub type ClientHandle = client::Handle<TestClient>;

/// A console bound to an ephemeral local port.
pub struct TestServer {
    port: u16,
    state: Arc<ServerState>,
    servers: Arc<MemoryServers>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Starts a console with two managed servers and one known user.
    pub async fn start() -> Self {
        Self::start_with(|builder| builder).await
    }

    /// Starts a console after letting the caller adjust the builder.
    pub async fn start_with(configure: impl FnOnce(ServerBuilder) -> ServerBuilder) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let servers = MemoryServers::new()
            .with_server(1, "alpha")
            .with_server(2, "beta")
            .into_shared();

        let builder = ServerBuilder::new()
            .authenticator(Credentials::new(TEST_USER, TEST_PASSWORD))
            .auth_rejection_delay(0)
            .servers(servers.clone());
        let server = configure(builder).build().expect("build console server");
        let state = server.state();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();

        let handle = tokio::spawn(async move {
            if let Err(err) = server.serve(listener).await {
                eprintln!("console server error: {err}");
            }
        });

        Self {
            port,
            state,
            servers,
            handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn servers(&self) -> &Arc<MemoryServers> {
        &self.servers
    }

    /// Connects without authenticating.
    pub async fn connect(&self) -> ClientHandle {
        let config = Arc::new(client::Config::default());
        timeout(
            DEFAULT_TIMEOUT,
            client::connect(config, ("127.0.0.1", self.port), TestClient),
        )
        .await
        .expect("connect timed out")
        .expect("connect")
    }

    /// Connects and logs in as the test user.
    pub async fn login(&self) -> ClientHandle {
        let mut session = self.connect().await;
        let ok = session
            .authenticate_password(TEST_USER, TEST_PASSWORD)
            .await
            .expect("authenticate");
        assert!(ok, "password authentication failed");
        session
    }

    /// Waits until the session tracker reports `count` open sessions.
    pub async fn wait_for_sessions(&self, count: usize) {
        for _ in 0..200 {
            if self.state.sessions.session_count() == count {
                return;
            }
            sleep(Duration::from_millis(25)).await;
        }
        panic!(
            "expected {count} sessions, found {}",
            self.state.sessions.session_count()
        );
    }

    pub async fn stop(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

/// Opens a session channel and starts a shell on it.
pub async fn open_shell(session: &ClientHandle, pty: bool) -> Channel<client::Msg> {
    let channel = session.channel_open_session().await.expect("open session");
    if pty {
        channel
            .request_pty(true, "xterm", 80, 24, 0, 0, &[])
            .await
            .expect("request pty");
    }
    channel.request_shell(true).await.expect("request shell");
    channel
}

/// Sends raw bytes on a channel.
pub async fn send(channel: &Channel<client::Msg>, data: &str) {
    channel.data(data.as_bytes()).await.expect("send data");
}

/// Reads channel output until it contains `needle`.
pub async fn read_until(channel: &mut Channel<client::Msg>, needle: &str) -> String {
    let mut out = String::new();
    let result = timeout(DEFAULT_TIMEOUT, async {
        while !out.contains(needle) {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => out.push_str(&String::from_utf8_lossy(&data)),
                Some(ChannelMsg::Eof | ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {needle:?}; got {out:?}");
    assert!(out.contains(needle), "channel closed before {needle:?}; got {out:?}");
    out
}

/// Everything a channel produced until it closed.
#[derive(Debug, Default)]
pub struct ChannelOutput {
    pub stdout: String,
    pub exit_status: Option<u32>,
    pub eof: bool,
}

/// Collects output until the server closes the channel.
pub async fn collect(channel: &mut Channel<client::Msg>) -> ChannelOutput {
    let mut output = ChannelOutput::default();
    timeout(DEFAULT_TIMEOUT, async {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    output.stdout.push_str(&String::from_utf8_lossy(&data));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    output.exit_status = Some(exit_status);
                }
                Some(ChannelMsg::Eof) => output.eof = true,
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
    })
    .await
    .expect("timed out waiting for channel close");
    output
}

/// Runs one command line over an exec request.
pub async fn exec(session: &ClientHandle, line: &str) -> ChannelOutput {
    let mut channel = session.channel_open_session().await.expect("open session");
    channel.exec(true, line).await.expect("exec");
    collect(&mut channel).await
}
