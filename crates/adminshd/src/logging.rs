//! Logging bootstrap.

use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

impl LogLevel {
    /// Filter directive used when `RUST_LOG` is not set.
    ///
    /// russh is held one step quieter than the console itself until trace.
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Info => "info,russh=warn",
            Self::Debug => "debug,russh=info",
            Self::Trace => "trace",
        }
    }
}

/// Builds the filter: `RUST_LOG` wins, otherwise `level`.
#[must_use]
pub fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()))
}

/// Installs the global subscriber, writing to stderr.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
}
