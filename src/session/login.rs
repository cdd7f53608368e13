//! Login response validation and failure classification

use crate::error::RelayError;
use crate::models::LoginResponse;

pub const INVALID_CREDENTIALS: &str = "Invalid Credentials!!";
const SERVER_FORMAT: &str = "Server is not responding correctly. Please try again later.";
const CONNECTIVITY: &str = "Unable to connect to the server. Please check your internet connection.";
const GENERIC: &str = "Login failed. Please try again.";

/// Fragments that mark a 400 answer as a credentials rejection
const CREDENTIAL_PATTERNS: [&str; 5] = [
    "invalid username or password",
    "invalid credentials",
    "authentication failed",
    "bad credentials",
    "unrecognized username or password",
];

/// Why a login attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginFailure {
    InvalidCredentials,
    /// The backend accepted the login but answered with an unusable payload
    Validation(String),
    ServerFormat,
    BadRequest(String),
    Connectivity,
    Other(String),
}

impl LoginFailure {
    pub fn classify(err: &RelayError) -> Self {
        match err {
            RelayError::Status { status: 401 | 403, .. } => LoginFailure::InvalidCredentials,
            RelayError::Status { status: 400, message } if is_credential_message(message) => {
                LoginFailure::InvalidCredentials
            }
            RelayError::Status { status: 400, message } => {
                LoginFailure::BadRequest(message.clone())
            }
            RelayError::Html { .. } => LoginFailure::ServerFormat,
            RelayError::Transport(_) => LoginFailure::Connectivity,
            other => LoginFailure::Other(other.to_string()),
        }
    }

    /// Message shown to the user; backend wording never leaks for credential errors
    pub fn user_message(&self) -> String {
        match self {
            LoginFailure::InvalidCredentials => INVALID_CREDENTIALS.to_string(),
            LoginFailure::Validation(detail) | LoginFailure::BadRequest(detail) => {
                format!("Login error: {}", detail)
            }
            LoginFailure::ServerFormat => SERVER_FORMAT.to_string(),
            LoginFailure::Connectivity => CONNECTIVITY.to_string(),
            LoginFailure::Other(_) => GENERIC.to_string(),
        }
    }
}

fn is_credential_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CREDENTIAL_PATTERNS.iter().any(|pattern| lowered.contains(pattern))
}

/// Login answer that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedLogin {
    pub uid: String,
    pub name: String,
    pub csrf_token: String,
    pub logout_token: Option<String>,
}

/// Check that the backend returned a user and a CSRF token
pub fn validate(response: LoginResponse) -> Result<AcceptedLogin, LoginFailure> {
    let user = response.current_user.ok_or_else(|| {
        LoginFailure::Validation("Invalid login response - missing user data".to_string())
    })?;

    let uid = user.uid_string();
    let name = user.name.filter(|name| !name.is_empty());
    let (uid, name) = match (uid, name) {
        (Some(uid), Some(name)) => (uid, name),
        _ => {
            return Err(LoginFailure::Validation(
                "Invalid login response - incomplete user data".to_string(),
            ))
        }
    };

    let csrf_token = response
        .csrf_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            LoginFailure::Validation("Invalid login response - missing CSRF token".to_string())
        })?;

    Ok(AcceptedLogin {
        uid,
        name,
        csrf_token,
        logout_token: response.logout_token.filter(|token| !token.is_empty()),
    })
}

/// New session identifier: `session_<epoch-ms>_<random>`
pub fn generate_session_id(now_ms: i64) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", now_ms, &random[..9])
}
