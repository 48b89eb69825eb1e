//! Daemon configuration.
//!
//! Settings come from an optional TOML file and from the command line (which
//! includes its environment fallbacks). Command-line values win. The merged
//! result is a [`Config`], the single place the rest of the daemon reads
//! settings from.
//!
//! ```toml
//! [ssh]
//! address = "0.0.0.0:2222"
//! host_key = "/var/lib/adminsh/host_key"
//! idle_timeout_secs = 600
//! max_sessions = 32
//!
//! [auth]
//! username = "admin"
//! password = "secret"
//!
//! [[servers]]
//! id = 1
//! name = "alpha"
//! [servers.defaults]
//! motd = "hello"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use adminsh::{DEFAULT_ADDRESS, DEFAULT_VERSION, ServerId};
use adminsh::auth::{DEFAULT_AUTH_REJECTION_DELAY_MS, DEFAULT_MAX_AUTH_ATTEMPTS};
use adminsh::shell::DEFAULT_PROMPT;
use serde::Deserialize;
use thiserror::Error;

use crate::cli::Cli;

/// Login name used when none is configured.
pub const DEFAULT_USERNAME: &str = "admin";

/// Password used when none is configured.
pub const DEFAULT_PASSWORD: &str = "admin";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `[ssh]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SshSection {
    /// Listen address.
    pub address: Option<String>,
    /// Host key path.
    pub host_key: Option<PathBuf>,
    /// SSH identification string.
    pub version: Option<String>,
    /// Banner shown before authentication.
    pub banner: Option<String>,
    /// Prompt for interactive sessions.
    pub prompt: Option<String>,
    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: Option<u64>,
    /// Concurrent session ceiling.
    pub max_sessions: Option<usize>,
}

/// `[auth]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSection {
    /// Login name.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Delay before a rejected attempt is answered.
    pub rejection_delay_ms: Option<u64>,
    /// Attempts allowed per connection.
    pub max_attempts: Option<u32>,
}

/// One `[[servers]]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerEntry {
    /// Server id used in console commands.
    pub id: ServerId,
    /// Display name.
    pub name: String,
    /// Default configuration values.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

/// The configuration file as written.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// `[ssh]`
    pub ssh: SshSection,
    /// `[auth]`
    pub auth: AuthSection,
    /// `[[servers]]`
    pub servers: Vec<ServerEntry>,
}

impl FileConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed or unknown fields.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved daemon settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listen address, always `host:port`.
    pub address: String,
    /// Host key path; ephemeral key when `None`.
    pub host_key: Option<PathBuf>,
    /// SSH identification string.
    pub version: String,
    /// Banner shown before authentication.
    pub banner: Option<String>,
    /// Prompt for interactive sessions.
    pub prompt: String,
    /// Idle connection timeout.
    pub idle_timeout: Option<Duration>,
    /// Concurrent session ceiling.
    pub max_sessions: Option<usize>,
    /// Login name.
    pub username: String,
    /// Login password; `None` means the built-in default is in use.
    pub password: Option<String>,
    /// Delay before a rejected attempt is answered, in milliseconds.
    pub rejection_delay_ms: u64,
    /// Attempts allowed per connection.
    pub max_auth_attempts: u32,
    /// Servers the console manages.
    pub servers: Vec<ServerEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(FileConfig::default(), &Cli::default())
    }
}

impl Config {
    /// Loads the file named by `cli` (if any), merges, and validates.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`].
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let config = Self::merge(file, cli);
        config.validate()?;
        Ok(config)
    }

    /// Combines file settings with command-line overrides.
    pub fn merge(file: FileConfig, cli: &Cli) -> Self {
        let FileConfig { ssh, auth, servers } = file;

        let address = cli
            .addr
            .clone()
            .or(ssh.address)
            .map_or_else(|| DEFAULT_ADDRESS.to_string(), |a| normalize_address(&a));

        Self {
            address,
            host_key: cli.host_key.clone().or(ssh.host_key),
            version: ssh.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            banner: ssh.banner,
            prompt: ssh.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            idle_timeout: cli
                .idle_timeout
                .or(ssh.idle_timeout_secs)
                .map(Duration::from_secs),
            max_sessions: cli.max_sessions.or(ssh.max_sessions),
            username: cli
                .username
                .clone()
                .or(auth.username)
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: cli.password.clone().or(auth.password),
            rejection_delay_ms: auth
                .rejection_delay_ms
                .unwrap_or(DEFAULT_AUTH_REJECTION_DELAY_MS),
            max_auth_attempts: auth.max_attempts.unwrap_or(DEFAULT_MAX_AUTH_ATTEMPTS),
            servers,
        }
    }

    /// Checks values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "listen address '{}' is not host:port",
                self.address
            )));
        }
        if !self.version.starts_with("SSH-2.0-") {
            return Err(ConfigError::Invalid(format!(
                "version '{}' must start with SSH-2.0-",
                self.version
            )));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Invalid("username is empty".to_string()));
        }
        if self.password.as_deref() == Some("") {
            return Err(ConfigError::Invalid("password is empty".to_string()));
        }
        if self.max_sessions == Some(0) {
            return Err(ConfigError::Invalid("max_sessions must be at least 1".to_string()));
        }
        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid(
                "idle timeout must be at least 1 second".to_string(),
            ));
        }
        if self.max_auth_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.id) {
                return Err(ConfigError::Invalid(format!(
                    "server id {} is defined twice",
                    server.id
                )));
            }
        }
        Ok(())
    }

    /// Returns the password to check logins against, and whether it is the
    /// built-in default.
    pub fn credentials(&self) -> (&str, &str, bool) {
        match &self.password {
            Some(password) => (&self.username, password, false),
            None => (&self.username, DEFAULT_PASSWORD, true),
        }
    }
}

/// Handles addresses like ":2222" by prepending "0.0.0.0".
fn normalize_address(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
