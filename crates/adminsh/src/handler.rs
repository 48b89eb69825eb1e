//! russh Handler implementation for the console.
//!
//! One [`ConsoleHandler`] drives one SSH connection. It authenticates the
//! peer, accepts `session` channels only, and starts a [`Shell`] task for
//! each channel that asks for a shell or an exec.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use russh::server::{Auth, Handle, Handler as RusshHandler, Msg, Session as RusshSession};
use russh::{Channel, ChannelId, MethodSet};
use tokio::io::AsyncWriteExt;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::auth::{ConnectionId, LoginAttempt};
use crate::session::{SessionConfig, SessionLease, SessionManager};
use crate::shell::{Outcome, Shell, ShellExit, ShellOptions};
use crate::{Error, ServerOptions};

// Re-export russh server types for use by Server
pub use russh::server::{Config as RusshConfig, run_stream};

/// Shared state for all connections to a server.
pub struct ServerState {
    /// Server options.
    pub options: ServerOptions,
    /// Live session tracking.
    pub sessions: Arc<SessionManager>,
    connection_counter: AtomicU64,
}

impl ServerState {
    /// Creates new server state from options.
    pub fn new(options: ServerOptions) -> Self {
        let sessions = Arc::new(SessionManager::new(SessionConfig {
            max_sessions: options.max_sessions,
        }));
        Self {
            options,
            sessions,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Returns the next connection ID.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.connection_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn shell(&self, options: ShellOptions) -> Shell {
        Shell::new(
            Arc::clone(&self.options.commands),
            Arc::clone(&self.options.servers),
        )
        .with_options(options)
    }
}

/// Per-channel state tracking.
struct ChannelState {
    /// The channel, until a shell or exec takes it.
    channel: Option<Channel<Msg>>,
    /// Session slot held while the channel is open.
    lease: Option<SessionLease>,
    /// Terminal type, if the client asked for a PTY.
    term: Option<String>,
}

impl ChannelState {
    fn started(&self) -> bool {
        self.channel.is_none()
    }
}

/// Closes a channel when the task that owns it finishes, however it ends.
struct ChannelRelease {
    handle: Handle,
    channel: ChannelId,
    exit_status: Option<u32>,
}

impl Drop for ChannelRelease {
    fn drop(&mut self) {
        let handle = self.handle.clone();
        let channel = self.channel;
        let exit_status = self.exit_status.take();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            if let Some(code) = exit_status {
                let _ = handle.exit_status_request(channel, code).await;
            }
            let _ = handle.eof(channel).await;
            let _ = handle.close(channel).await;
        });
    }
}

/// Handler for a single SSH connection.
pub struct ConsoleHandler {
    /// Connection ID for logging.
    connection_id: ConnectionId,
    /// Remote address.
    remote_addr: SocketAddr,
    /// User after authentication.
    user: Option<String>,
    /// Server-level shared state.
    server_state: Arc<ServerState>,
    /// Open session channels.
    channels: HashMap<ChannelId, ChannelState>,
    /// Password attempts made on this connection.
    auth_attempts: u32,
}

impl ConsoleHandler {
    /// Creates a new handler for a connection.
    pub fn new(remote_addr: SocketAddr, server_state: Arc<ServerState>) -> Self {
        let connection_id = server_state.next_connection_id();
        debug!(
            connection_id = %connection_id,
            remote_addr = %remote_addr,
            "New connection handler created"
        );

        Self {
            connection_id,
            remote_addr,
            user: None,
            server_state,
            channels: HashMap::new(),
            auth_attempts: 0,
        }
    }

    /// Returns the connection ID.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Returns the authenticated user, once authentication succeeded.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Counts a password attempt and returns its number.
    ///
    /// # Errors
    ///
    /// [`Error::TooManyAuthAttempts`] once the per-connection limit has been
    /// used up, which ends the connection.
    fn begin_auth_attempt(&mut self) -> Result<u32, Error> {
        let max = self.server_state.options.max_auth_attempts;
        if self.auth_attempts >= max {
            warn!(
                connection_id = %self.connection_id,
                remote_addr = %self.remote_addr,
                attempts = self.auth_attempts,
                "Too many authentication attempts"
            );
            return Err(Error::TooManyAuthAttempts(max));
        }
        self.auth_attempts += 1;
        Ok(self.auth_attempts)
    }

    /// Turns an authenticator verdict into the russh reply.
    ///
    /// A rejection keeps `password` on offer while attempts remain. The last
    /// rejection offers no methods, so the client gives up.
    fn auth_verdict(&mut self, user: &str, accepted: bool) -> Auth {
        if accepted {
            info!(
                connection_id = %self.connection_id,
                user = user,
                attempt = self.auth_attempts,
                "Authentication accepted"
            );
            self.user = Some(user.to_string());
            return Auth::Accept;
        }

        let remaining = self
            .server_state
            .options
            .max_auth_attempts
            .saturating_sub(self.auth_attempts);
        debug!(
            connection_id = %self.connection_id,
            user = user,
            attempt = self.auth_attempts,
            remaining,
            "Authentication rejected"
        );
        let methods = if remaining > 0 {
            MethodSet::PASSWORD
        } else {
            MethodSet::empty()
        };
        Auth::Reject {
            proceed_with_methods: Some(methods),
        }
    }

    /// Takes a parked channel for a shell or exec request.
    ///
    /// Sends `channel_failure` and returns `None` if the channel is unknown or
    /// already started.
    fn take_channel(
        &mut self,
        channel: ChannelId,
        session: &mut RusshSession,
    ) -> Option<(Channel<Msg>, Option<SessionLease>, Option<String>)> {
        let Some(state) = self.channels.get_mut(&channel) else {
            session.channel_failure(channel);
            return None;
        };
        if state.started() {
            warn!(
                connection_id = %self.connection_id,
                channel = ?channel,
                "Channel already started"
            );
            session.channel_failure(channel);
            return None;
        }
        let chan = state.channel.take()?;
        Some((chan, state.lease.take(), state.term.clone()))
    }
}

#[async_trait]
impl RusshHandler for ConsoleHandler {
    type Error = Error;

    /// Handle password authentication.
    async fn auth_password(
        &mut self,
        user: &str,
        password: &str,
    ) -> std::result::Result<Auth, Self::Error> {
        debug!(
            connection_id = %self.connection_id,
            user = user,
            "Password auth attempt"
        );

        let attempt = self.begin_auth_attempt()?;
        let accepted = match self.server_state.options.authenticator.clone() {
            Some(authenticator) => {
                let login = LoginAttempt {
                    username: user,
                    remote_addr: self.remote_addr,
                    connection_id: self.connection_id,
                    attempt,
                };
                authenticator.authenticate(&login, password).await
            }
            None => false,
        };
        Ok(self.auth_verdict(user, accepted))
    }

    /// Handle new session channel.
    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut RusshSession,
    ) -> std::result::Result<bool, Self::Error> {
        let channel_id = channel.id();
        let user = self.user.clone().unwrap_or_default();

        let lease = match self
            .server_state
            .sessions
            .open(self.connection_id, user, self.remote_addr)
        {
            Ok(lease) => lease,
            Err(e) => {
                warn!(
                    connection_id = %self.connection_id,
                    channel = ?channel_id,
                    error = %e,
                    "Session channel refused"
                );
                return Ok(false);
            }
        };

        debug!(
            connection_id = %self.connection_id,
            channel = ?channel_id,
            session_id = %lease.id(),
            "Session channel opened"
        );

        self.channels.insert(
            channel_id,
            ChannelState {
                channel: Some(channel),
                lease: Some(lease),
                term: None,
            },
        );
        Ok(true)
    }

    /// Refuse port forwarding; the console only speaks on session channels.
    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut RusshSession,
    ) -> std::result::Result<bool, Self::Error> {
        info!(
            connection_id = %self.connection_id,
            channel = ?channel.id(),
            host = host_to_connect,
            port = port_to_connect,
            "Rejected direct-tcpip channel"
        );
        Ok(false)
    }

    /// Handle PTY request.
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut RusshSession,
    ) -> std::result::Result<(), Self::Error> {
        debug!(
            connection_id = %self.connection_id,
            channel = ?channel,
            term = term,
            width = col_width,
            height = row_height,
            "PTY request"
        );

        match self.channels.get_mut(&channel) {
            Some(state) if !state.started() => {
                state.term = Some(term.to_string());
                session.channel_success(channel);
            }
            _ => session.channel_failure(channel),
        }
        Ok(())
    }

    /// Handle shell request.
    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut RusshSession,
    ) -> std::result::Result<(), Self::Error> {
        debug!(
            connection_id = %self.connection_id,
            channel = ?channel,
            "Shell request"
        );

        let Some((chan, lease, term)) = self.take_channel(channel, session) else {
            return Ok(());
        };

        let options = if term.is_some() {
            ShellOptions::interactive().with_prompt(self.server_state.options.prompt.clone())
        } else {
            ShellOptions::default()
        };
        let mut shell = self.server_state.shell(options);
        if let Some(lease) = lease {
            shell = shell.with_lease(lease);
        }

        let mut release = ChannelRelease {
            handle: session.handle(),
            channel,
            exit_status: None,
        };
        let span = info_span!(
            "console",
            connection_id = %self.connection_id,
            channel = ?channel,
            user = self.user.as_deref().unwrap_or_default()
        );

        tokio::spawn(
            async move {
                let mut stream = chan.into_stream();
                debug!("Shell started");
                let exit = shell.run(&mut stream).await;
                release.exit_status = Some(exit.exit_status());
                match exit {
                    ShellExit::ReadError(e) => warn!(error = %e, "Shell ended on read error"),
                    ShellExit::WriteError(e) => debug!(error = %e, "Shell ended on write error"),
                    exit => debug!(reason = %exit, "Shell ended"),
                }
                drop(release);
            }
            .instrument(span),
        );

        session.channel_success(channel);
        Ok(())
    }

    /// Handle exec request: run one command line and close.
    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut RusshSession,
    ) -> std::result::Result<(), Self::Error> {
        let line = String::from_utf8_lossy(data).into_owned();
        debug!(
            connection_id = %self.connection_id,
            channel = ?channel,
            command = %line,
            "Exec request"
        );

        let Some((chan, lease, _term)) = self.take_channel(channel, session) else {
            return Ok(());
        };

        let mut shell = self.server_state.shell(ShellOptions::default());
        if let Some(lease) = lease {
            shell = shell.with_lease(lease);
        }

        let mut release = ChannelRelease {
            handle: session.handle(),
            channel,
            exit_status: None,
        };
        let span = info_span!(
            "console",
            connection_id = %self.connection_id,
            channel = ?channel,
            user = self.user.as_deref().unwrap_or_default()
        );

        tokio::spawn(
            async move {
                let mut stream = chan.into_stream();
                let outcome = shell.dispatch(&line).await;
                release.exit_status = Some(outcome.exit_status());
                if let Outcome::Failed(ref err) = outcome {
                    debug!(error = %err, "Exec command failed");
                }
                let written = async {
                    shell.write_outcome(&outcome, &mut stream).await?;
                    stream.flush().await
                };
                if let Err(e) = written.await {
                    debug!(error = %e, "Exec reply write failed");
                }
                drop(release);
            }
            .instrument(span),
        );

        session.channel_success(channel);
        Ok(())
    }

    /// Subsystems are not offered.
    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut RusshSession,
    ) -> std::result::Result<(), Self::Error> {
        debug!(
            connection_id = %self.connection_id,
            channel = ?channel,
            subsystem = name,
            "Subsystem request refused"
        );
        session.channel_failure(channel);
        Ok(())
    }

    /// Window size is not used by the line shell; only logged.
    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut RusshSession,
    ) -> std::result::Result<(), Self::Error> {
        trace!(
            connection_id = %self.connection_id,
            channel = ?channel,
            width = col_width,
            height = row_height,
            "Window change request"
        );
        Ok(())
    }

    /// Handle channel EOF.
    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut RusshSession,
    ) -> std::result::Result<(), Self::Error> {
        debug!(
            connection_id = %self.connection_id,
            channel = ?channel,
            "Channel EOF"
        );
        Ok(())
    }

    /// Handle channel close.
    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut RusshSession,
    ) -> std::result::Result<(), Self::Error> {
        debug!(
            connection_id = %self.connection_id,
            channel = ?channel,
            "Channel closed"
        );

        self.channels.remove(&channel);
        Ok(())
    }
}

/// Factory for creating ConsoleHandler instances.
pub struct ConsoleHandlerFactory {
    server_state: Arc<ServerState>,
}

impl ConsoleHandlerFactory {
    /// Creates a new handler factory.
    pub fn new(options: ServerOptions) -> Self {
        Self {
            server_state: Arc::new(ServerState::new(options)),
        }
    }

    /// Returns the shared server state.
    pub fn state(&self) -> &Arc<ServerState> {
        &self.server_state
    }

    /// Creates a handler for a new connection.
    pub fn create_handler(&self, remote_addr: SocketAddr) -> ConsoleHandler {
        ConsoleHandler::new(remote_addr, Arc::clone(&self.server_state))
    }
}
