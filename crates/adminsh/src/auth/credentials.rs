//! The operator credential.

use std::fmt;

use async_trait::async_trait;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::{Authenticator, LoginAttempt};

/// A single username and password pair.
///
/// Both fields are compared in constant time, and the password is compared
/// even when the username is wrong, so a rejection reveals nothing about
/// which half was off.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates the credential the console accepts.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the accepted username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Checks a username and password pair.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = username.as_bytes().ct_eq(self.username.as_bytes());
        let password_ok = password.as_bytes().ct_eq(self.password.as_bytes());
        bool::from(user_ok & password_ok)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl Authenticator for Credentials {
    async fn authenticate(&self, login: &LoginAttempt<'_>, password: &str) -> bool {
        let ok = self.verify(login.username, password);
        debug!(
            connection_id = %login.connection_id,
            username = login.username,
            attempt = login.attempt,
            ok,
            "Checked operator credentials"
        );
        ok
    }
}
