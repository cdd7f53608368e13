//! Proxy relay
//!
//! The relay forwards a logical `{endpoint, method, headers, data}` request to
//! the fixed backend origin and hands back `{data, success, status, statusText}`.
//! Everything that talks to the backend goes through the `Relay` trait, so the
//! portal can run against the real HTTP relay or an in-process stand-in.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RelayError;

pub use http::HttpRelay;

/// HTTP methods the relay forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
}

impl RelayMethod {
    /// Whether a request body is forwarded for this method
    pub fn carries_body(self) -> bool {
        matches!(self, RelayMethod::Post | RelayMethod::Put | RelayMethod::Patch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelayMethod::Get => "GET",
            RelayMethod::Post => "POST",
            RelayMethod::Put => "PUT",
            RelayMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for RelayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayMethod {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(RelayMethod::Get),
            "POST" => Ok(RelayMethod::Post),
            "PUT" => Ok(RelayMethod::Put),
            "PATCH" => Ok(RelayMethod::Patch),
            other => Err(RelayError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Logical request handed to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Path and query on the backend origin
    pub endpoint: String,
    #[serde(default)]
    pub method: RelayMethod,
    /// Caller headers, forwarded verbatim and overriding the relay defaults
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RelayRequest {
    pub fn new(method: RelayMethod, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            headers: BTreeMap::new(),
            data: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(RelayMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(RelayMethod::Post, endpoint)
    }

    /// Add or replace a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn json(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Header lookup ignoring case
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Relay answer for a request the backend actually responded to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    /// Parsed JSON body, or the raw text as a JSON string when it was not JSON
    pub data: Value,
    pub success: bool,
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
}

impl RelayResponse {
    /// Unwrap the payload of a successful response
    ///
    /// Non-success responses become `RelayError::Status`, carrying the
    /// backend's own `message` when it sent one.
    pub fn into_data(self) -> Result<Value, RelayError> {
        if self.success {
            return Ok(self.data);
        }

        let message = backend_message(&self.data).unwrap_or_else(|| {
            let text = if self.status_text.is_empty() {
                "Unknown error"
            } else {
                self.status_text.as_str()
            };
            format!("{} {}", self.status, text)
        });

        Err(RelayError::Status {
            status: self.status,
            message,
        })
    }
}

/// Failure envelope returned by the relay endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub success: bool,
    pub status: u16,
}

impl From<&RelayError> for RelayFailure {
    fn from(err: &RelayError) -> Self {
        let (error, details) = match err {
            RelayError::Transport(message) => {
                ("Proxy request failed".to_string(), Some(message.clone()))
            }
            RelayError::Html { details, .. } => (err.to_string(), Some(details.clone())),
            RelayError::Status { message, .. } => (message.clone(), None),
            RelayError::UnsupportedMethod(_) => (err.to_string(), None),
        };

        Self {
            error,
            details,
            success: false,
            status: err.status(),
        }
    }
}

/// Error text the backend put in its JSON body, if any
fn backend_message(data: &Value) -> Option<String> {
    ["message", "error", "details"]
        .iter()
        .filter_map(|key| data.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
}

/// Transport to the backend
#[async_trait]
pub trait Relay: Send + Sync {
    /// Forward a request and return the backend's answer
    ///
    /// `Err` is reserved for requests that produced no usable answer:
    /// unreachable backend, HTML error page, unsupported method.
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, RelayError>;

    /// Forward a request and unwrap the payload of a successful answer
    async fn fetch(&self, request: RelayRequest) -> Result<Value, RelayError> {
        self.send(request).await?.into_data()
    }
}
