//! Configuration management
//!
//! This module handles loading and parsing configuration for the library portal.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Backend (remote library system) configuration
    #[serde(default)]
    pub backend: BackendConfig,
    /// Session lifetime configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Reference-data population configuration
    #[serde(default)]
    pub reference: ReferenceConfig,
    /// Persisted session state configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the portal UI)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Fixed origin every relayed endpoint is rewritten onto
    #[serde(default = "default_origin")]
    pub origin: String,
    /// User-Agent sent with every relayed request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_origin() -> String {
    "https://lib.prayalabs.com".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; Library-PWA/1.0)".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Session lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum session age and maximum idle time, in seconds
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u64,
    /// Remaining time below which the session is in its warning window
    #[serde(default = "default_warning_seconds")]
    pub warning_seconds: u64,
    /// Countdown tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Activity reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval_seconds")]
    pub reconcile_interval_seconds: u64,
    /// Persisted activity is adopted when it drifts more than this from memory
    #[serde(default = "default_activity_sync_threshold_seconds")]
    pub activity_sync_threshold_seconds: u64,
    /// Minimum spacing between two recorded activity events, in milliseconds
    #[serde(default = "default_activity_debounce_ms")]
    pub activity_debounce_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_seconds: default_duration_seconds(),
            warning_seconds: default_warning_seconds(),
            tick_interval_ms: default_tick_interval_ms(),
            reconcile_interval_seconds: default_reconcile_interval_seconds(),
            activity_sync_threshold_seconds: default_activity_sync_threshold_seconds(),
            activity_debounce_ms: default_activity_debounce_ms(),
        }
    }
}

impl SessionConfig {
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.duration_seconds as i64)
    }

    pub fn warning(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.warning_seconds as i64)
    }

    pub fn activity_sync_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.activity_sync_threshold_seconds as i64)
    }

    pub fn activity_debounce(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.activity_debounce_ms as i64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_seconds)
    }
}

fn default_duration_seconds() -> u64 {
    10 * 60 // 10 minutes
}

fn default_warning_seconds() -> u64 {
    2 * 60 // 2 minutes
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_reconcile_interval_seconds() -> u64 {
    30
}

fn default_activity_sync_threshold_seconds() -> u64 {
    10
}

fn default_activity_debounce_ms() -> u64 {
    1000
}

/// Reference-data population configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Author IDs probed when the author cache is first populated
    #[serde(default = "default_author_probe_ids")]
    pub author_probe_ids: Vec<String>,
    /// Number of books whose publisher/category relationships are fetched
    #[serde(default = "default_relationship_fanout")]
    pub relationship_fanout: usize,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            author_probe_ids: default_author_probe_ids(),
            relationship_fanout: default_relationship_fanout(),
        }
    }
}

fn default_author_probe_ids() -> Vec<String> {
    [
        "7", "8", "13", "1", "2", "3", "4", "5", "6", "9", "10", "11", "12", "14", "15",
    ]
    .iter()
    .map(|id| id.to_string())
    .collect()
}

fn default_relationship_fanout() -> usize {
    10
}

/// Persisted session state configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding persisted session state; in-memory when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        // Handle empty file - return defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - LIBPORTAL_SERVER_HOST
    /// - LIBPORTAL_SERVER_PORT
    /// - LIBPORTAL_SERVER_CORS_ORIGIN
    /// - LIBPORTAL_BACKEND_ORIGIN
    /// - LIBPORTAL_BACKEND_TIMEOUT_SECONDS
    /// - LIBPORTAL_SESSION_DURATION_SECONDS
    /// - LIBPORTAL_SESSION_WARNING_SECONDS
    /// - LIBPORTAL_REFERENCE_AUTHOR_PROBE_IDS (comma separated)
    /// - LIBPORTAL_REFERENCE_RELATIONSHIP_FANOUT
    /// - LIBPORTAL_STORAGE_PATH
    pub fn load_with_env(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("LIBPORTAL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("LIBPORTAL_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("LIBPORTAL_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Backend configuration
        if let Ok(origin) = std::env::var("LIBPORTAL_BACKEND_ORIGIN") {
            self.backend.origin = origin;
        }
        if let Ok(timeout) = std::env::var("LIBPORTAL_BACKEND_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.backend.timeout_seconds = timeout;
            }
        }

        // Session configuration
        if let Ok(duration) = std::env::var("LIBPORTAL_SESSION_DURATION_SECONDS") {
            if let Ok(duration) = duration.parse::<u64>() {
                self.session.duration_seconds = duration;
            }
        }
        if let Ok(warning) = std::env::var("LIBPORTAL_SESSION_WARNING_SECONDS") {
            if let Ok(warning) = warning.parse::<u64>() {
                self.session.warning_seconds = warning;
            }
        }

        // Reference configuration
        if let Ok(ids) = std::env::var("LIBPORTAL_REFERENCE_AUTHOR_PROBE_IDS") {
            let ids: Vec<String> = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect();
            if !ids.is_empty() {
                self.reference.author_probe_ids = ids;
            }
        }
        if let Ok(fanout) = std::env::var("LIBPORTAL_REFERENCE_RELATIONSHIP_FANOUT") {
            if let Ok(fanout) = fanout.parse::<usize>() {
                self.reference.relationship_fanout = fanout;
            }
        }

        // Storage configuration
        if let Ok(path) = std::env::var("LIBPORTAL_STORAGE_PATH") {
            self.storage.path = if path.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
    }

    /// Reject settings the session state machine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.duration_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "session.duration_seconds must be greater than zero".to_string(),
            ));
        }
        if self.session.warning_seconds >= self.session.duration_seconds {
            return Err(ConfigError::ValidationError(
                "session.warning_seconds must be shorter than session.duration_seconds".to_string(),
            ));
        }
        if self.session.tick_interval_ms == 0 || self.session.reconcile_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "session timer intervals must be greater than zero".to_string(),
            ));
        }
        if self.reference.relationship_fanout == 0 {
            return Err(ConfigError::ValidationError(
                "reference.relationship_fanout must be greater than zero".to_string(),
            ));
        }
        let origin = &self.backend.origin;
        if !origin.starts_with("http://") && !origin.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "backend.origin must be an http(s) URL, got '{}'",
                self.backend.origin
            )));
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Any session section written to YAML loads back unchanged,
        /// with every unspecified section at its default.
        #[test]
        fn session_section_roundtrip(
            duration in 60u64..7200,
            warning in 1u64..60,
            fanout in 1usize..50,
        ) {
            let mut file = NamedTempFile::new().unwrap();
            write!(
                file,
                "session:\n  duration_seconds: {}\n  warning_seconds: {}\n\
                 reference:\n  relationship_fanout: {}\n",
                duration, warning, fanout
            )
            .unwrap();

            let config = Config::load(file.path()).unwrap();
            prop_assert_eq!(config.session.duration_seconds, duration);
            prop_assert_eq!(config.session.warning_seconds, warning);
            prop_assert_eq!(config.reference.relationship_fanout, fanout);
            prop_assert_eq!(config.server.port, 8080);
            prop_assert!(config.validate().is_ok());
        }
    }
}
