//! Authentication for console connections.
//!
//! The console has one operator identity. Every connection must prove it
//! with a password before it can open a channel; the server hands each
//! attempt to an [`Authenticator`].
//!
//! Attempt limits and the rejection delay are enforced per connection by the
//! server, not by the authenticator.
//!
//! # Example
//!
//! ```rust,ignore
//! use adminsh::auth::Credentials;
//! use adminsh::ServerBuilder;
//!
//! let server = ServerBuilder::new()
//!     .authenticator(Credentials::new("admin", "hunter2"))
//!     .max_auth_attempts(3)
//!     .build()?;
//! ```

mod credentials;

pub use credentials::Credentials;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;

/// Delay before a rejected attempt is answered.
pub const DEFAULT_AUTH_REJECTION_DELAY_MS: u64 = 100;

/// Password attempts allowed on one connection before it is dropped.
pub const DEFAULT_MAX_AUTH_ATTEMPTS: u32 = 6;

/// Identifier of one SSH connection, used to correlate log lines and
/// authentication attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One password attempt, as seen by an [`Authenticator`].
#[derive(Debug, Clone, Copy)]
pub struct LoginAttempt<'a> {
    /// Username the peer claims.
    pub username: &'a str,
    /// Peer address.
    pub remote_addr: SocketAddr,
    /// Connection the attempt arrived on.
    pub connection_id: ConnectionId,
    /// 1-based attempt number on this connection.
    pub attempt: u32,
}

/// Decides whether a password attempt proves the operator identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns true if `password` is valid for `login.username`.
    async fn authenticate(&self, login: &LoginAttempt<'_>, password: &str) -> bool;
}
