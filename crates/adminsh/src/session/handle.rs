//! Session handle and info types.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::auth::ConnectionId;

/// Identifier of one console session (one session channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bookkeeping for an active console session.
#[derive(Debug)]
pub struct SessionHandle {
    /// Unique session identifier.
    pub id: SessionId,
    /// Connection the session's channel belongs to.
    pub connection_id: ConnectionId,
    /// Authenticated username.
    pub user: String,
    /// Client's remote address.
    pub remote_addr: SocketAddr,
    /// When the channel was opened.
    pub started_at: Instant,
    /// Commands dispatched so far.
    commands: AtomicU64,
}

impl SessionHandle {
    /// Creates a new session handle.
    pub fn new(
        id: SessionId,
        connection_id: ConnectionId,
        user: String,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            id,
            connection_id,
            user,
            remote_addr,
            started_at: Instant::now(),
            commands: AtomicU64::new(0),
        }
    }

    /// Records one dispatched command.
    pub fn record_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of dispatched commands.
    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    /// Returns the total session duration.
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Creates a SessionInfo snapshot for external consumption.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            connection_id: self.connection_id,
            user: self.user.clone(),
            remote_addr: self.remote_addr,
            started_at: SystemTime::now() - self.started_at.elapsed(),
            duration: self.duration(),
            commands: self.commands(),
        }
    }
}

/// Information about an active session (snapshot for inspection/logging).
#[derive(Clone, Debug)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub id: SessionId,
    /// Connection the session's channel belongs to.
    pub connection_id: ConnectionId,
    /// Authenticated username.
    pub user: String,
    /// Client's remote address.
    pub remote_addr: SocketAddr,
    /// When the session was established.
    pub started_at: SystemTime,
    /// Total session duration.
    pub duration: Duration,
    /// Commands dispatched so far.
    pub commands: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 22222)
    }

    #[test]
    fn test_session_handle_new() {
        let handle = SessionHandle::new(
            SessionId(1),
            ConnectionId(3),
            "operator".to_string(),
            test_addr(),
        );

        assert_eq!(handle.id, SessionId(1));
        assert_eq!(handle.connection_id, ConnectionId(3));
        assert_eq!(handle.user, "operator");
        assert_eq!(handle.commands(), 0);
    }

    #[test]
    fn test_session_handle_commands() {
        let handle = SessionHandle::new(SessionId(1), ConnectionId(1), "a".into(), test_addr());
        handle.record_command();
        handle.record_command();
        assert_eq!(handle.commands(), 2);
    }

    #[test]
    fn test_session_info() {
        let handle = SessionHandle::new(SessionId(42), ConnectionId(9), "alice".into(), test_addr());
        handle.record_command();

        let info = handle.info();
        assert_eq!(info.id, SessionId(42));
        assert_eq!(info.connection_id, ConnectionId(9));
        assert_eq!(info.user, "alice");
        assert_eq!(info.commands, 1);
        assert!(info.started_at <= SystemTime::now());
    }
}
