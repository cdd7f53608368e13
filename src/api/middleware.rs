//! API middleware
//!
//! Contains:
//! - Application state shared by every handler
//! - The `ApiError` JSON envelope and its mapping from portal errors
//! - Session gate for endpoints that need an active session

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::PortalError;
use crate::portal::Portal;

/// Application state containing the portal context
#[derive(Clone)]
pub struct AppState {
    pub portal: Arc<Portal>,
}

impl AppState {
    pub fn new(portal: Arc<Portal>) -> Self {
        Self { portal }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONNECTIVITY_ERROR" => StatusCode::SERVICE_UNAVAILABLE,
            "SERVER_FORMAT_ERROR" | "BACKEND_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        let message = err.to_string();
        match err {
            PortalError::Authentication(_) | PortalError::NotAuthenticated(_) => {
                ApiError::unauthorized(message)
            }
            PortalError::Validation(_) => ApiError::validation_error(message),
            PortalError::NotFound(_) => ApiError::not_found(message),
            PortalError::Connectivity(_) => ApiError::new("CONNECTIVITY_ERROR", message),
            PortalError::ServerFormat { status, .. } => ApiError::with_details(
                "SERVER_FORMAT_ERROR",
                message,
                serde_json::json!({ "status": status }),
            ),
            PortalError::Api { status, .. } => ApiError::with_details(
                "BACKEND_ERROR",
                message,
                serde_json::json!({ "status": status }),
            ),
        }
    }
}

/// Session gate
///
/// Rejects the request unless a session is active. Every admitted request
/// counts as user activity.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.portal.session().is_active() {
        return Err(ApiError::unauthorized("No active session"));
    }
    state.portal.record_activity();
    Ok(next.run(request).await)
}
