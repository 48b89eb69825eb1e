//! Session manager for tracking console sessions.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::handle::{SessionHandle, SessionId, SessionInfo};
use crate::Error;
use crate::auth::ConnectionId;

/// Configuration for the session manager.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Maximum number of concurrent sessions across all connections.
    /// `None` means unlimited.
    pub max_sessions: Option<usize>,
}

/// Tracks every open console session.
///
/// A slot is taken when a session channel is opened and released when the
/// returned [`SessionLease`] is dropped.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    config: SessionConfig,
    next_id: AtomicU64,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("active", &self.session_count())
            .finish()
    }
}

impl SessionManager {
    /// Creates a new session manager with the given configuration.
    pub fn new(config: SessionConfig) -> Self {
        debug!(max_sessions = ?config.max_sessions, "Session manager initialized");
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Opens a session for a newly opened channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the session ceiling is reached.
    pub fn open(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        user: impl Into<String>,
        remote_addr: SocketAddr,
    ) -> Result<SessionLease, Error> {
        let user = user.into();
        let mut sessions = self.sessions.write();

        if let Some(max) = self.config.max_sessions
            && sessions.len() >= max
        {
            warn!(
                max,
                current = sessions.len(),
                connection_id = %connection_id,
                user = %user,
                addr = %remote_addr,
                "Maximum sessions reached, rejecting channel"
            );
            return Err(Error::Session("maximum sessions reached".to_string()));
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        info!(
            session_id = %id,
            connection_id = %connection_id,
            user = %user,
            addr = %remote_addr,
            total_sessions = sessions.len() + 1,
            "Session opened"
        );
        sessions.insert(id, SessionHandle::new(id, connection_id, user, remote_addr));

        Ok(SessionLease {
            manager: Arc::clone(self),
            id,
        })
    }

    fn release(&self, id: SessionId) {
        let mut sessions = self.sessions.write();
        if let Some(handle) = sessions.remove(&id) {
            info!(
                session_id = %id,
                connection_id = %handle.connection_id,
                user = %handle.user,
                commands = handle.commands(),
                duration_secs = handle.duration().as_secs(),
                remaining_sessions = sessions.len(),
                "Session closed"
            );
        }
    }

    fn record_command(&self, id: SessionId) {
        if let Some(handle) = self.sessions.read().get(&id) {
            handle.record_command();
        }
    }

    /// Returns information about all active sessions, ordered by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> =
            self.sessions.read().values().map(SessionHandle::info).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Returns information about a specific session.
    pub fn session(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.read().get(&id).map(SessionHandle::info)
    }

    /// Returns the number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

/// An open session slot. Dropping it closes the session.
pub struct SessionLease {
    manager: Arc<SessionManager>,
    id: SessionId,
}

impl SessionLease {
    /// Returns the session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Records one dispatched command against the session.
    pub fn record_command(&self) {
        self.manager.record_command(self.id);
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease").field("id", &self.id).finish()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.manager.release(self.id);
    }
}
