//! Proxy relay endpoints
//!
//! - POST /api/proxy - relay `{endpoint, method?, headers?, data?}`
//! - GET /api/proxy?endpoint=... - plain GET pass-through
//!
//! Backend successes answer 200 with the relay envelope; backend failures
//! keep the backend status, and unreachable backends answer 500.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::api::middleware::AppState;
use crate::error::RelayError;
use crate::relay::{RelayFailure, RelayMethod, RelayRequest};

const ENDPOINT_REQUIRED: &str = "Endpoint parameter required";

/// Body of a relayed request
#[derive(Debug, Deserialize)]
pub struct ProxyBody {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    #[serde(default)]
    pub endpoint: Option<String>,
}

pub async fn relay_post(State(state): State<AppState>, Json(body): Json<ProxyBody>) -> Response {
    let Some(endpoint) = body.endpoint.filter(|e| !e.is_empty()) else {
        return endpoint_required();
    };
    let method = match body.method.as_deref() {
        None => RelayMethod::Get,
        Some(raw) => match raw.parse::<RelayMethod>() {
            Ok(method) => method,
            Err(err) => return failure(&err),
        },
    };

    let mut request = RelayRequest::new(method, endpoint);
    request.headers = body.headers;
    request.data = body.data;
    relay(&state, request).await
}

pub async fn relay_get(State(state): State<AppState>, Query(query): Query<ProxyQuery>) -> Response {
    match query.endpoint.filter(|e| !e.is_empty()) {
        Some(endpoint) => relay(&state, RelayRequest::get(endpoint)).await,
        None => endpoint_required(),
    }
}

async fn relay(state: &AppState, request: RelayRequest) -> Response {
    let endpoint = request.endpoint.clone();
    match state.portal.relay().send(request).await {
        Ok(response) => {
            let status = if response.success {
                StatusCode::OK
            } else {
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY)
            };
            (status, Json(response)).into_response()
        }
        Err(err) => {
            match &err {
                RelayError::Transport(message) => {
                    tracing::error!(endpoint = %endpoint, "Proxy request failed: {}", message)
                }
                other => tracing::warn!(endpoint = %endpoint, "Proxy request rejected: {}", other),
            }
            failure(&err)
        }
    }
}

fn failure(err: &RelayError) -> Response {
    let status = match err.status() {
        0 => StatusCode::INTERNAL_SERVER_ERROR,
        code => StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    };
    (status, Json(RelayFailure::from(err))).into_response()
}

fn endpoint_required() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": ENDPOINT_REQUIRED }))).into_response()
}
