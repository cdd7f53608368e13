//! Book and reference-data API endpoints
//!
//! All routes need an active session:
//! - GET /api/books - List books (query: search, search_field, category, author)
//! - GET /api/books/{id} - Book details
//! - POST /api/books/{id}/reserve|borrow|return|renew - Circulation commands
//! - POST /api/reservations/{id}/cancel - Cancel a reservation
//! - GET /api/authors, /api/authors/{id}
//! - GET /api/publications, /api/publications/{book_id}
//! - GET /api/categories
//! - GET /api/search/suggestions?q=...

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{Book, BookFilter, CirculationReceipt, ReferenceRecord};
use crate::services::Circulation;

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    #[serde(default)]
    pub q: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books))
        .route("/books/{id}", get(get_book))
        .route("/books/{id}/reserve", post(reserve_book))
        .route("/books/{id}/borrow", post(borrow_book))
        .route("/books/{id}/return", post(return_book))
        .route("/books/{id}/renew", post(renew_book))
        .route("/reservations/{id}/cancel", post(cancel_reservation))
        .route("/authors", get(list_authors))
        .route("/authors/{id}", get(get_author))
        .route("/publications", get(list_publications))
        .route("/publications/{book_id}", get(get_publication))
        .route("/categories", get(list_categories))
        .route("/search/suggestions", get(search_suggestions))
}

async fn list_books(
    State(state): State<AppState>,
    Query(filter): Query<BookFilter>,
) -> Result<Json<Vec<Book>>, ApiError> {
    Ok(Json(state.portal.get_books(&filter).await?))
}

async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Book>, ApiError> {
    Ok(Json(state.portal.get_book_details(&id).await?))
}

async fn circulate(
    state: &AppState,
    command: Circulation,
    id: &str,
) -> Result<Json<CirculationReceipt>, ApiError> {
    Ok(Json(state.portal.circulate(command, id).await?))
}

async fn reserve_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CirculationReceipt>, ApiError> {
    circulate(&state, Circulation::Reserve, &id).await
}

async fn borrow_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CirculationReceipt>, ApiError> {
    circulate(&state, Circulation::Borrow, &id).await
}

async fn return_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CirculationReceipt>, ApiError> {
    circulate(&state, Circulation::Return, &id).await
}

async fn renew_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CirculationReceipt>, ApiError> {
    circulate(&state, Circulation::Renew, &id).await
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CirculationReceipt>, ApiError> {
    circulate(&state, Circulation::CancelReservation, &id).await
}

async fn list_authors(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReferenceRecord>>, ApiError> {
    Ok(Json(state.portal.get_authors().await?))
}

async fn get_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReferenceRecord>, ApiError> {
    Ok(Json(state.portal.get_author(&id).await?))
}

async fn list_publications(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReferenceRecord>>, ApiError> {
    Ok(Json(state.portal.get_publications()?))
}

async fn get_publication(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<ReferenceRecord>, ApiError> {
    Ok(Json(state.portal.get_publication(&book_id).await?))
}

async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReferenceRecord>>, ApiError> {
    Ok(Json(state.portal.get_categories().await?))
}

async fn search_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.portal.search_suggestions(&query.q).await?))
}
