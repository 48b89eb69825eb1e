//! Console session tracking.
//!
//! Each session channel holds a [`SessionLease`] for as long as it is open.
//! The [`SessionManager`] enforces the concurrent session ceiling and keeps
//! per-session bookkeeping for logs and inspection.
//!
//! # Example
//!
//! ```rust,ignore
//! use adminsh::session::{SessionConfig, SessionManager};
//! use std::sync::Arc;
//!
//! let manager = Arc::new(SessionManager::new(SessionConfig {
//!     max_sessions: Some(16),
//! }));
//!
//! let lease = manager.open(connection_id, "admin", addr)?;
//! lease.record_command();
//! drop(lease); // session closed
//! ```

mod handle;
mod manager;

pub use handle::{SessionHandle, SessionId, SessionInfo};
pub use manager::{SessionConfig, SessionLease, SessionManager};
