//! Backend client
//!
//! Thin layer over the relay that knows how to authenticate requests with the
//! credentials of the current session.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{PortalError, RelayError};
use crate::relay::{Relay, RelayRequest};
use crate::session::CredentialVault;

pub const JSON: &str = "application/json";
pub const JSON_API: &str = "application/vnd.api+json";

const SESSION_EXPIRED: &str = "Session expired. Please login again.";

/// Relay plus the credentials needed for authenticated calls
#[derive(Clone)]
pub struct BackendClient {
    relay: Arc<dyn Relay>,
    vault: Arc<CredentialVault>,
}

impl BackendClient {
    pub fn new(relay: Arc<dyn Relay>, vault: Arc<CredentialVault>) -> Self {
        Self { relay, vault }
    }

    pub fn relay(&self) -> &Arc<dyn Relay> {
        &self.relay
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    /// Unauthenticated request
    pub async fn fetch(&self, request: RelayRequest) -> Result<Value, RelayError> {
        self.relay.fetch(request).await
    }

    /// Basic auth header for the current user, if the password is known
    pub fn basic_auth(&self) -> Option<String> {
        self.vault.get().and_then(|credentials| credentials.basic_auth())
    }

    /// Request carrying Basic auth only (author lookups)
    pub async fn fetch_with_basic(&self, request: RelayRequest) -> Result<Value, PortalError> {
        let authorization = self
            .basic_auth()
            .ok_or(PortalError::NotAuthenticated("missing credentials"))?;
        let value = self
            .relay
            .fetch(request.header("Authorization", authorization))
            .await?;
        Ok(value)
    }

    /// Request carrying the CSRF token and Basic auth
    ///
    /// A 401/403 from the backend means the backend no longer accepts the
    /// session; a 404 names the endpoint that is missing.
    pub async fn fetch_authenticated(&self, request: RelayRequest) -> Result<Value, PortalError> {
        let credentials = self
            .vault
            .get()
            .ok_or(PortalError::NotAuthenticated("missing CSRF token"))?;
        if credentials.csrf_token.is_empty() {
            return Err(PortalError::NotAuthenticated("missing CSRF token"));
        }
        let authorization = credentials
            .basic_auth()
            .ok_or(PortalError::NotAuthenticated("missing credentials"))?;

        let endpoint = request.endpoint.clone();
        let mut authenticated = RelayRequest::new(request.method, endpoint.as_str())
            .header("Content-Type", JSON)
            .header("Accept", JSON)
            .header("X-CSRF-Token", credentials.csrf_token.as_str())
            .header("Authorization", authorization);
        authenticated.data = request.data;
        // Caller headers win over the defaults
        for (name, value) in request.headers {
            authenticated
                .headers
                .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
            authenticated.headers.insert(name, value);
        }

        match self.relay.fetch(authenticated).await {
            Ok(value) => Ok(value),
            Err(RelayError::Status { status: 401 | 403, .. }) => {
                tracing::warn!(endpoint = %endpoint, "Backend rejected session credentials");
                Err(PortalError::Authentication(SESSION_EXPIRED.to_string()))
            }
            Err(err) if err.is_not_found() => {
                Err(PortalError::NotFound(format!("Endpoint not found: {}", endpoint)))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Decode a backend payload into a typed value
pub fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, PortalError> {
    serde_json::from_value(value)
        .map_err(|e| PortalError::Validation(format!("Unexpected {} payload: {}", what, e)))
}
