#![forbid(unsafe_code)]
// Allow pedantic lints for early-stage API ergonomics.
#![allow(clippy::doc_markdown)]
#![allow(clippy::nursery)]
#![allow(clippy::pedantic)]

//! # adminsh
//!
//! An SSH administrative console for long-running server processes.
//!
//! Operators connect with any SSH client, authenticate, and type line
//! commands (`start 1`, `getconf 1 motd`, ...) that are dispatched to a
//! [`ServerRegistry`](servers::ServerRegistry) holding the managed servers.
//!
//! ## Architecture
//!
//! - **Acceptor** ([`Server`]): accepts TCP connections and runs each SSH
//!   handshake in its own task.
//! - **Multiplexer** ([`ConsoleHandler`]): one per connection; accepts only
//!   `session` channels and starts a shell per channel.
//! - **Shell** ([`shell::Shell`]): reads lines, dispatches commands, writes
//!   replies.
//! - **Registry** ([`command::CommandRegistry`]): the command table, built
//!   before serving and shared read-only.
//!
//! ## Example
//!
//! ```rust,ignore
//! use adminsh::auth::Credentials;
//! use adminsh::servers::MemoryServers;
//! use adminsh::ServerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), adminsh::Error> {
//!     let servers = MemoryServers::new().with_server(1, "alpha").into_shared();
//!
//!     let server = ServerBuilder::new()
//!         .address("127.0.0.1:2222")
//!         .authenticator(Credentials::new("admin", "secret"))
//!         .servers(servers)
//!         .build()?;
//!
//!     server.listen().await
//! }
//! ```

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

pub mod auth;
pub mod command;
mod handler;
pub mod servers;
pub mod session;
pub mod shell;
pub mod terminal;

pub use auth::{Authenticator, ConnectionId, Credentials, LoginAttempt};
pub use command::{Arity, Command, CommandError, CommandHandler, CommandRegistry, Invocation};
pub use handler::{ConsoleHandler, ConsoleHandlerFactory, RusshConfig, ServerState, run_stream};
pub use servers::{ConfigUpdate, MemoryServers, ServerError, ServerId, ServerRegistry};

// -----------------------------------------------------------------------------
// Error Types
// -----------------------------------------------------------------------------

/// Errors that can occur in the console server library.
///
/// # Recovery Strategies
///
/// | Error Variant | Recovery Strategy |
/// |--------------|-------------------|
/// | [`Io`](Error::Io) | Check permissions, port availability |
/// | [`Russh`](Error::Russh) | Logged per connection; other connections continue |
/// | [`Key`](Error::Key) | Regenerate keys or check permissions |
/// | [`KeyLoad`](Error::KeyLoad) | Verify key file format |
/// | [`Configuration`](Error::Configuration) | Fix server configuration |
/// | [`Session`](Error::Session) | Channel refused; retry later |
/// | [`AddrParse`](Error::AddrParse) | Validate address format |
/// | [`TooManyAuthAttempts`](Error::TooManyAuthAttempts) | Connection dropped; the peer may reconnect |
/// | [`DuplicateCommand`](Error::DuplicateCommand) | Rename the command |
/// | [`ReservedCommand`](Error::ReservedCommand) | Rename the command |
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during server operations.
    ///
    /// Commonly occurs when:
    /// - The bind address is already in use
    /// - Permission denied on privileged ports
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Underlying russh library error.
    #[error("russh error: {0}")]
    Russh(#[from] russh::Error),

    /// Key generation or management error.
    #[error("key error: {0}")]
    Key(String),

    /// Key loading error from russh-keys.
    ///
    /// Common causes: file not found, invalid format, permission denied.
    #[error("key loading error: {0}")]
    KeyLoad(#[from] russh_keys::Error),

    /// Server configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Session error, such as the session ceiling being reached.
    #[error("session error: {0}")]
    Session(String),

    /// Address parse error.
    #[error("address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// A connection used up its password attempts.
    #[error("too many authentication attempts (limit {0})")]
    TooManyAuthAttempts(u32),

    /// A command with this name is already registered.
    #[error("duplicate command: {0}")]
    DuplicateCommand(String),

    /// The name is handled by the shell itself and cannot be registered.
    #[error("reserved command name: {0}")]
    ReservedCommand(String),
}

/// A specialized [`Result`] type for console operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns true if `err` means the peer simply went away.
///
/// Such errors are expected (a client closing mid-handshake, a port scanner)
/// and are logged at debug level instead of as failures.
pub fn is_disconnect(err: &Error) -> bool {
    match err {
        Error::Io(e) => is_disconnect_io(e),
        Error::Russh(russh::Error::IO(e)) => is_disconnect_io(e),
        Error::Russh(russh::Error::Disconnect | russh::Error::HUP) => true,
        _ => false,
    }
}

fn is_disconnect_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

// -----------------------------------------------------------------------------
// Server Options
// -----------------------------------------------------------------------------

/// Default listen address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:2222";

/// Default SSH identification string.
pub const DEFAULT_VERSION: &str = "SSH-2.0-adminsh";

/// Delay after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Options for configuring the console server.
#[derive(Clone)]
pub struct ServerOptions {
    /// Listen address.
    pub address: String,
    /// Server version string.
    pub version: String,
    /// Static banner shown before authentication.
    pub banner: Option<String>,
    /// Host key path.
    pub host_key_path: Option<String>,
    /// Host key PEM data.
    pub host_key_pem: Option<Vec<u8>>,
    /// Password check for the operator identity. Required.
    pub authenticator: Option<Arc<dyn Authenticator>>,
    /// Connections idle for longer than this are closed.
    pub idle_timeout: Option<Duration>,
    /// Ceiling on concurrent sessions across all connections.
    pub max_sessions: Option<usize>,
    /// Password attempts allowed per connection before it is dropped.
    pub max_auth_attempts: u32,
    /// Minimum time before a rejected attempt is answered, in milliseconds.
    pub auth_rejection_delay_ms: u64,
    /// Prompt shown to interactive sessions.
    pub prompt: String,
    /// Command table.
    pub commands: Arc<CommandRegistry>,
    /// Managed servers the commands operate on.
    pub servers: Arc<dyn ServerRegistry>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            version: DEFAULT_VERSION.to_string(),
            banner: None,
            host_key_path: None,
            host_key_pem: None,
            authenticator: None,
            idle_timeout: None,
            max_sessions: None,
            max_auth_attempts: auth::DEFAULT_MAX_AUTH_ATTEMPTS,
            auth_rejection_delay_ms: auth::DEFAULT_AUTH_REJECTION_DELAY_MS,
            prompt: shell::DEFAULT_PROMPT.to_string(),
            commands: Arc::new(CommandRegistry::with_builtins()),
            servers: Arc::new(MemoryServers::new()),
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("address", &self.address)
            .field("version", &self.version)
            .field("banner", &self.banner)
            .field("host_key_path", &self.host_key_path)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_sessions", &self.max_sessions)
            .field("max_auth_attempts", &self.max_auth_attempts)
            .field("commands", &self.commands.names())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Server
// -----------------------------------------------------------------------------

/// The console's connection acceptor.
pub struct Server {
    factory: ConsoleHandlerFactory,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("options", &self.options())
            .finish()
    }
}

impl Server {
    /// Creates a server from options.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if no authenticator is set or no password
    /// attempts are allowed.
    pub fn new(options: ServerOptions) -> Result<Self> {
        if options.authenticator.is_none() {
            return Err(Error::Configuration(
                "an authenticator is required".to_string(),
            ));
        }
        if options.max_auth_attempts == 0 {
            return Err(Error::Configuration(
                "max_auth_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            factory: ConsoleHandlerFactory::new(options),
        })
    }

    /// Returns the server options.
    pub fn options(&self) -> &ServerOptions {
        &self.factory.state().options
    }

    /// Returns the listen address.
    pub fn address(&self) -> &str {
        &self.options().address
    }

    /// Returns the shared connection state, including the session tracker.
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(self.factory.state())
    }

    /// Binds the configured address and serves connections.
    ///
    /// # Errors
    ///
    /// Address parse, bind, or host key errors. Per-connection failures are
    /// logged and never returned.
    pub async fn listen(&self) -> Result<()> {
        let addr: SocketAddr = self.options().address.parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    ///
    /// # Errors
    ///
    /// Host key errors while building the SSH configuration.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let config = Arc::new(self.create_russh_config()?);
        let local = listener.local_addr()?;
        info!(addr = %local, "Console listening");

        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    debug!(peer_addr = %peer_addr, "Accepted connection");
                    if let Err(e) = socket.set_nodelay(true) {
                        debug!(peer_addr = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let config = Arc::clone(&config);
                    let handler = self.factory.create_handler(peer_addr);
                    let connection_id = handler.connection_id();

                    tokio::spawn(async move {
                        let session = match run_stream(config, socket, handler).await {
                            Ok(session) => session,
                            Err(e) if is_disconnect(&e) => {
                                debug!(%connection_id, peer_addr = %peer_addr, "Peer left during handshake");
                                return;
                            }
                            Err(e) => {
                                warn!(%connection_id, peer_addr = %peer_addr, error = %e, "SSH handshake failed");
                                return;
                            }
                        };

                        match session.await {
                            Ok(()) => {
                                debug!(%connection_id, peer_addr = %peer_addr, "Connection closed");
                            }
                            Err(e) if is_disconnect(&e) => {
                                debug!(%connection_id, peer_addr = %peer_addr, "Peer disconnected");
                            }
                            Err(Error::TooManyAuthAttempts(_)) => {
                                info!(%connection_id, peer_addr = %peer_addr, "Dropped after too many authentication attempts");
                            }
                            Err(e) => {
                                warn!(%connection_id, peer_addr = %peer_addr, error = %e, "Connection error");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Creates the russh server configuration.
    fn create_russh_config(&self) -> Result<RusshConfig> {
        use russh::MethodSet;
        use russh_keys::key::KeyPair;

        let options = self.options();
        let mut config = RusshConfig::default();

        config.server_id = russh::SshId::Standard(options.version.clone());

        if let Some(timeout) = options.idle_timeout {
            config.inactivity_timeout = Some(timeout);
        }

        // Attempt limits are counted by the connection handler.
        config.auth_rejection_time = Duration::from_millis(options.auth_rejection_delay_ms);
        config.methods = MethodSet::PASSWORD;

        let key = if let Some(ref pem) = options.host_key_pem {
            russh_keys::decode_secret_key(
                std::str::from_utf8(pem).map_err(|e| Error::Key(e.to_string()))?,
                None,
            )?
        } else if let Some(ref path) = options.host_key_path {
            russh_keys::load_secret_key(path, None)?
        } else {
            info!("Generating ephemeral Ed25519 host key");
            KeyPair::generate_ed25519()
        };
        config.keys.push(key);

        if let Some(ref banner) = options.banner {
            // russh wants a &'static str; the server lives for the whole process.
            let banner: &'static str = Box::leak(banner.clone().into_boxed_str());
            config.auth_banner = Some(banner);
        }

        Ok(config)
    }
}

// -----------------------------------------------------------------------------
// Server Builder
// -----------------------------------------------------------------------------

/// Builder for creating a console server.
#[derive(Default)]
pub struct ServerBuilder {
    options: ServerOptions,
}

impl ServerBuilder {
    /// Creates a new server builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listen address.
    pub fn address(mut self, addr: impl Into<String>) -> Self {
        self.options.address = addr.into();
        self
    }

    /// Sets the server version string.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.options.version = version.into();
        self
    }

    /// Sets a static pre-authentication banner.
    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.options.banner = Some(banner.into());
        self
    }

    /// Sets the host key path.
    pub fn host_key_path(mut self, path: impl Into<String>) -> Self {
        self.options.host_key_path = Some(path.into());
        self
    }

    /// Sets the host key from PEM data.
    pub fn host_key_pem(mut self, pem: Vec<u8>) -> Self {
        self.options.host_key_pem = Some(pem);
        self
    }

    /// Sets the password check.
    pub fn authenticator<A: Authenticator + 'static>(mut self, authenticator: A) -> Self {
        self.options.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Sets the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.options.idle_timeout = Some(timeout);
        self
    }

    /// Sets the concurrent session ceiling.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.options.max_sessions = Some(max);
        self
    }

    /// Sets the password attempts allowed per connection.
    pub fn max_auth_attempts(mut self, max: u32) -> Self {
        self.options.max_auth_attempts = max;
        self
    }

    /// Sets the authentication rejection delay in milliseconds.
    pub fn auth_rejection_delay(mut self, delay_ms: u64) -> Self {
        self.options.auth_rejection_delay_ms = delay_ms;
        self
    }

    /// Sets the interactive prompt.
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.prompt = prompt.into();
        self
    }

    /// Sets the command table.
    pub fn commands(mut self, commands: CommandRegistry) -> Self {
        self.options.commands = Arc::new(commands);
        self
    }

    /// Sets the managed server registry.
    pub fn servers(mut self, servers: Arc<dyn ServerRegistry>) -> Self {
        self.options.servers = servers;
        self
    }

    /// Returns the options built so far.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Builds the server.
    ///
    /// # Errors
    ///
    /// Same as [`Server::new`].
    pub fn build(self) -> Result<Server> {
        Server::new(self.options)
    }
}
