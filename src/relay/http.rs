//! HTTP relay to the backend origin
//!
//! Rewrites the logical endpoint onto the configured origin, injects the
//! default `Accept`/`User-Agent` headers, sets `Content-Type` only when a body
//! is sent, and passes caller headers (including `Authorization`) through
//! unchanged. HTML error pages are reported as `RelayError::Html` instead of
//! being forwarded as malformed JSON.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;
use std::time::Duration;

use super::{Relay, RelayMethod, RelayRequest, RelayResponse};
use crate::config::BackendConfig;
use crate::error::RelayError;

impl From<RelayMethod> for reqwest::Method {
    fn from(method: RelayMethod) -> Self {
        match method {
            RelayMethod::Get => reqwest::Method::GET,
            RelayMethod::Post => reqwest::Method::POST,
            RelayMethod::Put => reqwest::Method::PUT,
            RelayMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/// Relay backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
    origin: String,
    user_agent: String,
}

impl HttpRelay {
    /// Create a relay for the configured backend
    pub fn new(config: &BackendConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RelayError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            origin: config.origin.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        })
    }

    /// Backend origin requests are rewritten onto
    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.origin, endpoint)
        } else {
            format!("{}/{}", self.origin, endpoint)
        }
    }

    fn headers_for(&self, request: &RelayRequest, with_body: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        if with_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!("Dropping invalid header '{}' for {}", name, request.endpoint),
            }
        }

        headers
    }
}

/// Heuristic for error pages served in place of JSON
fn looks_like_html(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    lowered.contains("<html") || lowered.contains("<!doctype")
}

#[async_trait]
impl Relay for HttpRelay {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        let url = self.url_for(&request.endpoint);
        let body = request.data.as_ref().filter(|_| request.method.carries_body());
        let headers = self.headers_for(&request, body.is_some());

        let authorization = if request.header_value("authorization").is_some() {
            "[REDACTED]"
        } else {
            "none"
        };
        tracing::debug!(
            method = %request.method,
            endpoint = %request.endpoint,
            has_body = body.is_some(),
            authorization,
            "Relaying request"
        );

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .headers(headers);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(|e| {
                RelayError::Transport(format!("Failed to encode request body: {}", e))
            })?;
            builder = builder.body(bytes);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to read response body: {}", e)))?;

        tracing::debug!(
            endpoint = %request.endpoint,
            status = status.as_u16(),
            length = text.len(),
            "Relay response received"
        );

        let data = match serde_json::from_str::<Value>(&text) {
            Ok(data) => data,
            Err(_) if looks_like_html(&text) => {
                return Err(RelayError::Html {
                    status: status.as_u16(),
                    details: format!(
                        "HTTP {}: The server may be down or the endpoint may not exist",
                        status.as_u16()
                    ),
                });
            }
            Err(_) => Value::String(text),
        };

        Ok(RelayResponse {
            data,
            success: status.is_success(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
        })
    }
}
