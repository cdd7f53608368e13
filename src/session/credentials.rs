//! In-memory credentials of the logged-in user
//!
//! The backend authenticates data requests with HTTP Basic auth plus the CSRF
//! token handed out at login. The password only ever lives here, in memory;
//! it is not persisted and never logged.

use std::fmt;
use std::sync::RwLock;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    /// Unknown after a restart, since it is never persisted
    pub password: Option<String>,
    pub csrf_token: String,
    pub logout_token: Option<String>,
}

impl Credentials {
    /// `Authorization` header value, when the password is known
    pub fn basic_auth(&self) -> Option<String> {
        let password = self.password.as_ref()?;
        let raw = format!("{}:{}", self.username, password);
        Some(format!("Basic {}", data_encoding::BASE64.encode(raw.as_bytes())))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("csrf_token", &"[REDACTED]")
            .field("logout_token", &self.logout_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Shared slot for the current credentials
#[derive(Debug, Default)]
pub struct CredentialVault {
    slot: RwLock<Option<Credentials>>,
}

impl CredentialVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Credentials> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, credentials: Credentials) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(credentials);
    }

    /// Remove and return the current credentials
    pub fn take(&self) -> Option<Credentials> {
        self.slot.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn has_csrf_token(&self) -> bool {
        self.get().map(|c| !c.csrf_token.is_empty()).unwrap_or(false)
    }
}
