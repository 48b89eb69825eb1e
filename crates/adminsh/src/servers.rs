//! Managed server registry.
//!
//! The console does not own the servers it administers. Command handlers
//! reach them through the [`ServerRegistry`] trait, keyed by integer id.
//! [`MemoryServers`] is a thread-safe in-memory implementation used by the
//! daemon and by tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Identifier of a managed server.
pub type ServerId = i64;

/// Capacity of each server's config-update channel.
const CONFIG_UPDATE_CAPACITY: usize = 64;

/// Errors reported by a server registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// No server is registered under the id.
    #[error("no such server")]
    NotFound,

    /// The server is already running.
    #[error("server is already running")]
    AlreadyRunning,

    /// The server is not running.
    #[error("server is not running")]
    NotRunning,

    /// Any other failure reported by the server.
    #[error("{0}")]
    Failed(String),
}

/// A configuration change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// The configuration key.
    pub key: String,
    /// The new value, or `None` when the key was reset to its default.
    pub value: Option<String>,
}

impl ConfigUpdate {
    /// A key was set to `value`.
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// A key was reset to its default.
    pub fn reset(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Returns true if this update is a reset.
    pub fn is_reset(&self) -> bool {
        self.value.is_none()
    }
}

/// Operations the console performs on managed servers.
///
/// Implementations provide their own synchronization; the console treats
/// every call as atomic.
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    /// Returns true if a server is registered under `id`.
    fn exists(&self, id: ServerId) -> bool;

    /// Starts the server.
    async fn start(&self, id: ServerId) -> Result<(), ServerError>;

    /// Stops the server.
    async fn stop(&self, id: ServerId) -> Result<(), ServerError>;

    /// Sets the privileged-user password.
    fn set_superuser_password(&self, id: ServerId, password: &str);

    /// Reads a configuration value. Unknown keys yield the default or an
    /// empty string.
    fn get_config(&self, id: ServerId, key: &str) -> String;

    /// Sets a configuration value.
    fn set_config(&self, id: ServerId, key: &str, value: &str);

    /// Resets a configuration value to its default.
    fn reset_config(&self, id: ServerId, key: &str);

    /// Publishes a configuration change to the server's listeners.
    fn publish_config_update(&self, id: ServerId, update: ConfigUpdate);
}

/// State of one server held by [`MemoryServers`].
#[derive(Debug)]
struct ManagedServer {
    name: String,
    running: bool,
    superuser_password: Option<String>,
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
    updates: broadcast::Sender<ConfigUpdate>,
}

/// Point-in-time view of a server held by [`MemoryServers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSnapshot {
    /// Server id.
    pub id: ServerId,
    /// Display name.
    pub name: String,
    /// Whether the server is running.
    pub running: bool,
    /// Whether a superuser password has been set.
    pub has_superuser_password: bool,
}

/// In-memory server registry.
#[derive(Debug, Default)]
pub struct MemoryServers {
    servers: RwLock<BTreeMap<ServerId, ManagedServer>>,
}

impl MemoryServers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stopped server with the given defaults, replacing any server
    /// already registered under `id`.
    pub fn insert<I, K, V>(&self, id: ServerId, name: impl Into<String>, defaults: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let (updates, _) = broadcast::channel(CONFIG_UPDATE_CAPACITY);
        let server = ManagedServer {
            name: name.into(),
            running: false,
            superuser_password: None,
            defaults: defaults
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            overrides: HashMap::new(),
            updates,
        };
        debug!(server_id = id, name = %server.name, "Server registered");
        self.servers.write().insert(id, server);
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_server(self, id: ServerId, name: impl Into<String>) -> Self {
        self.insert(id, name, std::iter::empty::<(String, String)>());
        self
    }

    /// Subscribes to configuration updates for a server.
    pub fn subscribe(&self, id: ServerId) -> Option<broadcast::Receiver<ConfigUpdate>> {
        self.servers.read().get(&id).map(|s| s.updates.subscribe())
    }

    /// Returns the number of registered servers.
    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    /// Returns true if no servers are registered.
    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }

    /// Returns a snapshot of one server.
    pub fn snapshot(&self, id: ServerId) -> Option<ServerSnapshot> {
        self.servers.read().get(&id).map(|s| ServerSnapshot {
            id,
            name: s.name.clone(),
            running: s.running,
            has_superuser_password: s.superuser_password.is_some(),
        })
    }

    /// Returns snapshots of all servers ordered by id.
    pub fn snapshots(&self) -> Vec<ServerSnapshot> {
        let ids: Vec<ServerId> = self.servers.read().keys().copied().collect();
        ids.into_iter().filter_map(|id| self.snapshot(id)).collect()
    }

    /// Returns true if the stored superuser password equals `password`.
    pub fn check_superuser_password(&self, id: ServerId, password: &str) -> bool {
        self.servers
            .read()
            .get(&id)
            .and_then(|s| s.superuser_password.as_deref())
            .is_some_and(|stored| stored == password)
    }

    /// Wraps the registry for sharing with the console.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn set_running(&self, id: ServerId, running: bool) -> Result<(), ServerError> {
        let mut servers = self.servers.write();
        let server = servers.get_mut(&id).ok_or(ServerError::NotFound)?;
        match (server.running, running) {
            (true, true) => Err(ServerError::AlreadyRunning),
            (false, false) => Err(ServerError::NotRunning),
            _ => {
                server.running = running;
                info!(server_id = id, name = %server.name, running, "Server state changed");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ServerRegistry for MemoryServers {
    fn exists(&self, id: ServerId) -> bool {
        self.servers.read().contains_key(&id)
    }

    async fn start(&self, id: ServerId) -> Result<(), ServerError> {
        self.set_running(id, true)
    }

    async fn stop(&self, id: ServerId) -> Result<(), ServerError> {
        self.set_running(id, false)
    }

    fn set_superuser_password(&self, id: ServerId, password: &str) {
        if let Some(server) = self.servers.write().get_mut(&id) {
            server.superuser_password = Some(password.to_string());
        }
    }

    fn get_config(&self, id: ServerId, key: &str) -> String {
        self.servers
            .read()
            .get(&id)
            .and_then(|s| s.overrides.get(key).or_else(|| s.defaults.get(key)).cloned())
            .unwrap_or_default()
    }

    fn set_config(&self, id: ServerId, key: &str, value: &str) {
        if let Some(server) = self.servers.write().get_mut(&id) {
            server.overrides.insert(key.to_string(), value.to_string());
        }
    }

    fn reset_config(&self, id: ServerId, key: &str) {
        if let Some(server) = self.servers.write().get_mut(&id) {
            server.overrides.remove(key);
        }
    }

    fn publish_config_update(&self, id: ServerId, update: ConfigUpdate) {
        if let Some(server) = self.servers.read().get(&id) {
            // No subscribers is not an error.
            let _ = server.updates.send(update);
        }
    }
}
