//! Persisted session state
//!
//! A small string key-value store standing in for browser local storage.
//! The session manager keeps the logged-in user, the CSRF token, the logout
//! token and the session id here so a restart can resume the session.
//!
//! Two backends:
//! - `MemorySessionStore` (default) - state lives as long as the process
//! - `FileSessionStore` - state mirrored to a JSON file on every write

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::StorageConfig;

pub const USER_KEY: &str = "library_user";
pub const CSRF_TOKEN_KEY: &str = "library_csrf_token";
pub const LOGOUT_TOKEN_KEY: &str = "library_logout_token";
pub const SESSION_ID_KEY: &str = "library_session_id";

/// Every key owned by the session; all are removed together
pub const SESSION_KEYS: [&str; 4] = [USER_KEY, CSRF_TOKEN_KEY, LOGOUT_TOKEN_KEY, SESSION_ID_KEY];

/// Persisted form of the logged-in user (timestamps in epoch milliseconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub uid: String,
    pub name: String,
    pub session_id: String,
    pub login_time: i64,
    pub last_activity: i64,
}

/// String key-value store for session state
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every session key, logging failures
    fn clear_session(&self) {
        for key in SESSION_KEYS {
            if let Err(e) = self.remove(key) {
                tracing::warn!(key, "Failed to remove persisted session key: {:#}", e);
            }
        }
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Store mirrored to a JSON object on disk
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileSessionStore {
    /// Open the store, starting empty when the file is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read(&path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring unreadable session file: {:#}", e);
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Result<BTreeMap<String, String>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(entries).context("Failed to encode session state")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// Store selected by configuration
pub fn open_store(config: &StorageConfig) -> Arc<dyn SessionStore> {
    match &config.path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Using file session store");
            Arc::new(FileSessionStore::open(path))
        }
        None => {
            tracing::info!("Using in-memory session store");
            Arc::new(MemorySessionStore::new())
        }
    }
}
