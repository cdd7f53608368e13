//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session held while a user is logged in
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedSession {
    pub session_id: String,
    pub user_id: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub login_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity_timestamp: DateTime<Utc>,
}

impl AuthenticatedSession {
    /// Both the age and the idle time must stay below `duration`
    pub fn is_valid_at(&self, now: DateTime<Utc>, duration: Duration) -> bool {
        now - self.login_timestamp < duration && now - self.last_activity_timestamp < duration
    }

    /// Time left before the session reaches its maximum age (may be negative)
    pub fn remaining_at(&self, now: DateTime<Utc>, duration: Duration) -> Duration {
        duration - (now - self.login_timestamp)
    }
}

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Active,
    /// Active, with less than the warning threshold left
    Warning,
    Expired,
}

/// Snapshot of the session for the UI layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    /// Milliseconds left, 0 when no session is active
    pub remaining_ms: i64,
    pub warning: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
}

/// Public view of the logged-in user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub uid: String,
    pub name: String,
    pub session_id: String,
}

impl From<&AuthenticatedSession> for SessionUser {
    fn from(session: &AuthenticatedSession) -> Self {
        Self {
            uid: session.user_id.clone(),
            name: session.display_name.clone(),
            session_id: session.session_id.clone(),
        }
    }
}

/// Credentials posted to the backend login endpoint
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub name: String,
    pub pass: String,
}

/// Backend login answer; every part is optional until validated
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub current_user: Option<CurrentUser>,
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default)]
    pub logout_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentUser {
    /// Drupal sends the uid as a string or a number
    #[serde(default)]
    pub uid: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
}

impl CurrentUser {
    pub fn uid_string(&self) -> Option<String> {
        match self.uid.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Outcome of a login attempt; login never fails outward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResult {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}
