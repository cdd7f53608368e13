//! Account API endpoints (active session required)
//!
//! - GET /api/profile
//! - GET /api/reservations
//! - GET /api/borrowed
//! - GET /api/credits

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{BorrowedBook, CreditBalance, Reservation, UserProfile};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/reservations", get(list_reservations))
        .route("/borrowed", get(list_borrowed))
        .route("/credits", get(get_credits))
}

async fn get_profile(State(state): State<AppState>) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.portal.get_user_profile().await?))
}

async fn list_reservations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    Ok(Json(state.portal.get_user_reservations().await?))
}

async fn list_borrowed(State(state): State<AppState>) -> Result<Json<Vec<BorrowedBook>>, ApiError> {
    Ok(Json(state.portal.get_user_borrowed_books().await?))
}

async fn get_credits(State(state): State<AppState>) -> Result<Json<CreditBalance>, ApiError> {
    Ok(Json(state.portal.check_user_credits().await?))
}
