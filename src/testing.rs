//! In-process backend stand-in for tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::RelayError;
use crate::relay::{Relay, RelayRequest, RelayResponse};

/// Canned answer for one endpoint
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(u16, Value),
    Html(u16),
    Offline,
}

/// Relay answering from a routing table keyed by exact endpoint
///
/// Unrouted endpoints answer 404. Every request is recorded.
#[derive(Debug, Default)]
pub(crate) struct StubRelay {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<RelayRequest>>,
}

impl StubRelay {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(&self, endpoint: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), reply);
        self
    }

    pub(crate) fn ok(&self, endpoint: &str, body: Value) -> &Self {
        self.route(endpoint, Reply::Json(200, body))
    }

    pub(crate) fn calls(&self) -> Vec<RelayRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Requests sent to exactly `endpoint`
    pub(crate) fn count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.endpoint == endpoint)
            .count()
    }

    /// Requests whose endpoint starts with `prefix`
    pub(crate) fn count_prefix(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.endpoint.starts_with(prefix))
            .count()
    }

    pub(crate) fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

#[async_trait]
impl Relay for StubRelay {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        let reply = self.routes.lock().unwrap().get(&request.endpoint).cloned();
        let endpoint = request.endpoint.clone();
        self.calls.lock().unwrap().push(request);

        match reply {
            Some(Reply::Json(status, data)) => Ok(RelayResponse {
                data,
                success: (200..300).contains(&status),
                status,
                status_text: reason(status).to_string(),
            }),
            Some(Reply::Html(status)) => Err(RelayError::Html {
                status,
                details: format!(
                    "HTTP {}: The server may be down or the endpoint may not exist",
                    status
                ),
            }),
            Some(Reply::Offline) => Err(RelayError::Transport("connection refused".to_string())),
            None => Ok(RelayResponse {
                data: json!({ "message": format!("No route for {}", endpoint) }),
                success: false,
                status: 404,
                status_text: reason(404).to_string(),
            }),
        }
    }
}
