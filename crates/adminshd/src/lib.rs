#![forbid(unsafe_code)]
#![allow(clippy::nursery)]
#![allow(clippy::pedantic)]

//! # adminshd
//!
//! Daemon wrapper around the [`adminsh`] console: resolves configuration,
//! seeds the managed server registry, wires password authentication and
//! serves until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! adminshd --config /etc/adminsh.toml
//! ssh -p 2222 admin@localhost
//! ```

pub mod cli;
pub mod config;
pub mod logging;

use std::sync::Arc;

use adminsh::{ConfigUpdate, Credentials, MemoryServers, Server, ServerBuilder, ServerId};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

pub use cli::{Cli, LogLevel};
pub use config::{Config, ConfigError, FileConfig, ServerEntry};

/// Errors that stop the daemon.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The console failed to start or serve.
    #[error("console error: {0}")]
    Console(#[from] adminsh::Error),
}

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Creates the in-memory registry holding the configured servers.
pub fn seed_servers(entries: &[ServerEntry]) -> Arc<MemoryServers> {
    let servers = MemoryServers::new();
    for entry in entries {
        servers.insert(entry.id, entry.name.clone(), entry.defaults.clone());
    }
    servers.into_shared()
}

/// Builds the console server from resolved settings.
///
/// # Errors
///
/// [`Error::Console`] if the console rejects the options.
pub fn build_server(config: &Config, servers: Arc<MemoryServers>) -> Result<Server> {
    let (username, password, is_default) = config.credentials();
    if is_default {
        warn!(
            username,
            "No password configured; using the built-in default. Set ADMINSH_PASSWORD or [auth] password."
        );
    }

    let mut builder = ServerBuilder::new()
        .address(config.address.clone())
        .version(config.version.clone())
        .prompt(config.prompt.clone())
        .authenticator(Credentials::new(username, password))
        .auth_rejection_delay(config.rejection_delay_ms)
        .max_auth_attempts(config.max_auth_attempts)
        .servers(servers);

    if let Some(path) = &config.host_key {
        builder = builder.host_key_path(path.display().to_string());
    }
    if let Some(banner) = &config.banner {
        builder = builder.banner(banner.clone());
    }
    if let Some(timeout) = config.idle_timeout {
        builder = builder.idle_timeout(timeout);
    }
    if let Some(max) = config.max_sessions {
        builder = builder.max_sessions(max);
    }

    Ok(builder.build()?)
}

/// Logs every configuration change published for the managed servers.
///
/// One task per server; each ends when its server's update channel closes.
pub fn spawn_update_loggers(servers: &MemoryServers) {
    for snapshot in servers.snapshots() {
        let Some(mut updates) = servers.subscribe(snapshot.id) else {
            continue;
        };
        let id = snapshot.id;
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => log_update(id, &update),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(server_id = id, missed, "Config update log fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

fn log_update(id: ServerId, update: &ConfigUpdate) {
    match &update.value {
        Some(value) => info!(server_id = id, key = %update.key, value = %value, "Config updated"),
        None => info!(server_id = id, key = %update.key, "Config reset to default"),
    }
}

/// One-line description of what the daemon would serve.
pub fn summary(config: &Config) -> String {
    format!(
        "address={} user={} servers={} host_key={} max_sessions={} idle_timeout={}",
        config.address,
        config.username,
        config.servers.len(),
        config
            .host_key
            .as_ref()
            .map_or_else(|| "ephemeral".to_string(), |p| p.display().to_string()),
        config
            .max_sessions
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string()),
        config
            .idle_timeout
            .map_or_else(|| "none".to_string(), |d| format!("{}s", d.as_secs())),
    )
}

/// Serves the console until Ctrl-C.
///
/// # Errors
///
/// Startup failures: bad options, bind failures, host key errors.
pub async fn run(config: Config) -> Result<()> {
    let servers = seed_servers(&config.servers);
    if servers.is_empty() {
        warn!("No managed servers configured; console commands will report no such server");
    }
    spawn_update_loggers(&servers);

    let server = build_server(&config, servers)?;
    info!(summary = %summary(&config), "Starting console");

    tokio::select! {
        result = server.listen() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }
    Ok(())
}
