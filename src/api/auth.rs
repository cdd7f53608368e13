//! Authentication and session API endpoints
//!
//! - POST /api/auth/login - Log in against the backend
//! - POST /api/auth/logout - Log out (local first, server best-effort)
//! - GET /api/session - Session status projection
//! - POST /api/session/activity - Record user activity

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{LoginResult, SessionStatus};

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Auth routes; none of them need an active session
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/session", get(session_status))
        .route("/session/activity", post(record_activity))
}

/// POST /api/auth/login
///
/// Answers 200 on success and 401 otherwise; the body is always the login
/// result.
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::validation_error("Username and password are required"));
    }

    let result: LoginResult = state.portal.login(body.username.trim(), &body.password).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    Ok((status, Json(result)))
}

/// POST /api/auth/logout
async fn logout(State(state): State<AppState>) -> Json<LogoutResponse> {
    // The server-side logout keeps running in the background
    drop(state.portal.logout());
    Json(LogoutResponse { success: true })
}

/// GET /api/session
async fn session_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.portal.status())
}

/// POST /api/session/activity
async fn record_activity(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if !state.portal.session().is_active() {
        return Err(ApiError::unauthorized("No active session"));
    }
    state.portal.record_activity();
    Ok(StatusCode::NO_CONTENT)
}
