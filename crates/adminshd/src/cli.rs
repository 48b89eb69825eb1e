//! Command-line interface for `adminshd`.
//!
//! Every option can also come from the environment; values given here
//! override the configuration file.
//!
//! # Examples
//!
//! ```bash
//! # Listen on the default address with an ephemeral host key
//! ADMINSH_PASSWORD=secret adminshd
//!
//! # Use a config file and a persistent host key
//! adminshd --config /etc/adminsh.toml --host-key /var/lib/adminsh/host_key
//!
//! # Validate the configuration without serving
//! adminshd --config /etc/adminsh.toml --check
//! ```

use std::path::PathBuf;

use clap::Parser;

/// SSH administrative console for managed servers.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "adminshd",
    author,
    version,
    about = "SSH administrative console for managed servers"
)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short = 'c', env = "ADMINSH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (e.g. "0.0.0.0:2222" or ":2222")
    #[arg(long, env = "ADMINSH_ADDR")]
    pub addr: Option<String>,

    /// Path to the SSH host key (OpenSSH or PEM)
    ///
    /// An ephemeral Ed25519 key is generated when omitted
    #[arg(long, env = "ADMINSH_HOST_KEY")]
    pub host_key: Option<PathBuf>,

    /// Console login name
    #[arg(long, env = "ADMINSH_USERNAME")]
    pub username: Option<String>,

    /// Console login password
    #[arg(long, env = "ADMINSH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Close connections idle for this many seconds
    #[arg(long, env = "ADMINSH_IDLE_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    /// Maximum concurrent console sessions
    #[arg(long, env = "ADMINSH_MAX_SESSIONS")]
    pub max_sessions: Option<usize>,

    /// Validate the configuration, print a summary and exit
    #[arg(long)]
    pub check: bool,

    /// Only log warnings and errors
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command line arguments.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create CLI from iterator (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if argument parsing fails.
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Get log level based on verbosity.
    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        if self.quiet {
            return LogLevel::Warn;
        }
        match self.verbose {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Log level for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Only show warnings and errors
    Warn,
    /// Show info messages
    Info,
    /// Show debug messages
    Debug,
    /// Show all messages including trace
    Trace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_defaults() {
        let cli = Cli::try_parse_from(["adminshd"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.addr.is_none());
        assert!(cli.password.is_none());
        assert!(!cli.check);
        assert_eq!(cli.log_level(), LogLevel::Info);
    }

    #[test]
    fn cli_parses_options() {
        let cli = Cli::try_parse_from([
            "adminshd",
            "-c",
            "/etc/adminsh.toml",
            "--addr",
            ":2022",
            "--host-key",
            "/tmp/key",
            "--username",
            "ops",
            "--password",
            "pw",
            "--idle-timeout",
            "300",
            "--max-sessions",
            "4",
            "--check",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/adminsh.toml")));
        assert_eq!(cli.addr.as_deref(), Some(":2022"));
        assert_eq!(cli.host_key, Some(PathBuf::from("/tmp/key")));
        assert_eq!(cli.username.as_deref(), Some("ops"));
        assert_eq!(cli.password.as_deref(), Some("pw"));
        assert_eq!(cli.idle_timeout, Some(300));
        assert_eq!(cli.max_sessions, Some(4));
        assert!(cli.check);
    }

    #[test]
    fn cli_parses_verbose() {
        let cli = Cli::try_parse_from(["adminshd", "-v"]).unwrap();
        assert_eq!(cli.log_level(), LogLevel::Debug);

        let cli = Cli::try_parse_from(["adminshd", "-vvv"]).unwrap();
        assert_eq!(cli.log_level(), LogLevel::Trace);

        let cli = Cli::try_parse_from(["adminshd", "-q"]).unwrap();
        assert_eq!(cli.log_level(), LogLevel::Warn);
    }

    #[test]
    fn cli_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["adminshd", "-q", "-v"]).is_err());
    }

    #[test]
    fn cli_rejects_bad_numbers() {
        assert!(Cli::try_parse_from(["adminshd", "--max-sessions", "many"]).is_err());
        assert!(Cli::try_parse_from(["adminshd", "--idle-timeout", "-1"]).is_err());
    }
}
