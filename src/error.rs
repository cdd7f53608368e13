//! Error types
//!
//! Two layers of errors exist in the portal:
//! - `RelayError` describes what went wrong while talking to the backend
//!   through the proxy relay (transport failure, non-success status, HTML page
//!   where JSON was expected).
//! - `PortalError` is the taxonomy surfaced to callers of the portal
//!   operations. Reference-data lookups never surface it; they degrade to
//!   placeholders instead.

/// Failure while relaying a request to the backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The backend could not be reached at all (status 0)
    #[error("Request failed: {0}")]
    Transport(String),

    /// The backend answered with an HTML page instead of JSON
    #[error("Server returned HTML instead of JSON")]
    Html { status: u16, details: String },

    /// The backend answered with a non-success status
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The caller asked for a method the relay does not forward
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}

impl RelayError {
    /// HTTP status associated with the failure, 0 when the backend was unreachable
    pub fn status(&self) -> u16 {
        match self {
            RelayError::Transport(_) => 0,
            RelayError::Html { status, .. } | RelayError::Status { status, .. } => *status,
            RelayError::UnsupportedMethod(_) => 400,
        }
    }

    /// Backend detail text for the failure
    pub fn details(&self) -> Option<&str> {
        match self {
            RelayError::Html { details, .. } => Some(details),
            RelayError::Transport(message) => Some(message),
            _ => None,
        }
    }

    /// Whether the backend reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, RelayError::Status { status: 404, .. })
    }
}

/// Errors surfaced by portal operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortalError {
    /// Credentials rejected or session no longer accepted by the backend
    #[error("{0}")]
    Authentication(String),

    /// Malformed or incomplete backend payload
    #[error("{0}")]
    Validation(String),

    /// Backend unreachable
    #[error("{0}")]
    Connectivity(String),

    /// Backend reported the resource as absent
    #[error("{0}")]
    NotFound(String),

    /// Backend answered with HTML where JSON was expected
    #[error("{message}")]
    ServerFormat { status: u16, message: String },

    /// Any other backend failure
    #[error("{message}")]
    Api { status: u16, message: String },

    /// No active session holds the credentials this operation needs
    #[error("Not authenticated - {0}")]
    NotAuthenticated(&'static str),
}

impl PortalError {
    /// HTTP-like status of the error, 0 for connectivity failures
    pub fn status(&self) -> u16 {
        match self {
            PortalError::Authentication(_) | PortalError::NotAuthenticated(_) => 401,
            PortalError::Validation(_) => 400,
            PortalError::Connectivity(_) => 0,
            PortalError::NotFound(_) => 404,
            PortalError::ServerFormat { status, .. } | PortalError::Api { status, .. } => *status,
        }
    }

    /// Prefix the message with the failed operation, keeping the error kind
    pub fn with_context(self, operation: &str) -> Self {
        let prefix = |message: String| format!("{}: {}", operation, message);
        match self {
            PortalError::Authentication(m) => PortalError::Authentication(prefix(m)),
            PortalError::Validation(m) => PortalError::Validation(prefix(m)),
            PortalError::Connectivity(m) => PortalError::Connectivity(prefix(m)),
            PortalError::NotFound(m) => PortalError::NotFound(prefix(m)),
            PortalError::ServerFormat { status, message } => PortalError::ServerFormat {
                status,
                message: prefix(message),
            },
            PortalError::Api { status, message } => PortalError::Api {
                status,
                message: prefix(message),
            },
            other @ PortalError::NotAuthenticated(_) => other,
        }
    }
}

impl From<RelayError> for PortalError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Transport(_) => PortalError::Connectivity(err.to_string()),
            RelayError::Html { status, details } => PortalError::ServerFormat {
                status,
                message: format!("Server returned HTML instead of JSON ({})", details),
            },
            RelayError::Status { status: 404, message } => PortalError::NotFound(message),
            RelayError::Status { status, message } => PortalError::Api { status, message },
            RelayError::UnsupportedMethod(_) => PortalError::Validation(err.to_string()),
        }
    }
}
