//! Reference-data population
//!
//! Fills the reference cache from the backend:
//! - Authors are bootstrapped by probing a configured list of IDs, since the
//!   backend has no author listing usable before normalization
//! - Publishers and categories are fetched per book through the book's
//!   relationship endpoints and stored under the target record's ID
//! - Misses found while normalizing are backfilled in the background
//!
//! Individual lookup failures are logged and absorbed; an absent record is
//! the only signal callers ever see.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::client::{BackendClient, JSON, JSON_API};
use super::normalizer::MissingReference;
use super::shape::{rich_text, scalar, text, to_id};
use crate::cache::ReferenceCache;
use crate::config::ReferenceConfig;
use crate::error::PortalError;
use crate::models::{ReferenceKind, ReferenceRecord};
use crate::relay::RelayRequest;

pub fn author_endpoint(id: &str) -> String {
    format!("/web/lmsbookauthor/{}?_format=json", id)
}

/// Relationship endpoint of a book for a publisher or category
pub fn relationship_endpoint(kind: ReferenceKind, book_id: &str) -> String {
    let relationship = match kind {
        ReferenceKind::Publisher => "lmspublication",
        ReferenceKind::Category => "lmsbook_category",
        ReferenceKind::Author => "uid",
    };
    format!("/web/jsonapi/lmsbook/lmsbook/{}/{}", book_id, relationship)
}

/// Decode a flat Drupal author entity
pub fn decode_author(value: &Value) -> Result<ReferenceRecord, PortalError> {
    if !value.is_object() {
        return Err(PortalError::Validation("Unexpected author payload".to_string()));
    }
    Ok(ReferenceRecord {
        id: to_id(value.get("id")).unwrap_or_default(),
        display_name: text(value.get("title")).unwrap_or_default(),
        description: rich_text(value.get("text_long")).unwrap_or_default(),
        created_at: text(value.get("created")),
        uuid: text(value.get("uuid")),
    })
}

/// Decode the `data` member of a publisher or category document
///
/// JSON:API resources carry their fields under `attributes`; flat Drupal
/// entities are accepted as well.
pub fn decode_related(kind: ReferenceKind, data: &Value) -> ReferenceRecord {
    match data.get("attributes") {
        Some(attributes @ Value::Object(_)) => ReferenceRecord {
            id: attributes
                .get("drupal_internal__id")
                .and_then(scalar)
                .or_else(|| data.get("id").and_then(scalar))
                .unwrap_or_default(),
            display_name: attributes
                .get("title")
                .and_then(scalar)
                .unwrap_or_else(|| kind.placeholder().to_string()),
            description: rich_text(attributes.get("text_long")).unwrap_or_default(),
            created_at: attributes.get("created").and_then(scalar),
            uuid: data.get("id").and_then(scalar),
        },
        _ => ReferenceRecord {
            id: to_id(data.get("id")).unwrap_or_default(),
            display_name: text(data.get("title"))
                .unwrap_or_else(|| kind.placeholder().to_string()),
            description: rich_text(data.get("text_long")).unwrap_or_default(),
            created_at: text(data.get("created")),
            uuid: text(data.get("uuid")),
        },
    }
}

/// Population and backfill of the reference cache
pub struct ReferenceService {
    client: BackendClient,
    cache: Arc<ReferenceCache>,
    config: ReferenceConfig,
    author_gate: Mutex<()>,
    publisher_gate: Mutex<()>,
    category_gate: Mutex<()>,
}

impl ReferenceService {
    pub fn new(client: BackendClient, cache: Arc<ReferenceCache>, config: ReferenceConfig) -> Self {
        Self {
            client,
            cache,
            config,
            author_gate: Mutex::new(()),
            publisher_gate: Mutex::new(()),
            category_gate: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<ReferenceCache> {
        &self.cache
    }

    pub fn config(&self) -> &ReferenceConfig {
        &self.config
    }

    fn gate(&self, kind: ReferenceKind) -> &Mutex<()> {
        match kind {
            ReferenceKind::Author => &self.author_gate,
            ReferenceKind::Publisher => &self.publisher_gate,
            ReferenceKind::Category => &self.category_gate,
        }
    }

    // ========================================================================
    // Single lookups
    // ========================================================================

    /// Fetch one author with the current user's Basic credentials
    pub async fn fetch_author(&self, id: &str) -> Result<ReferenceRecord, PortalError> {
        let request = RelayRequest::get(author_endpoint(id)).header("Accept", JSON);
        let value = self.client.fetch_with_basic(request).await?;
        decode_author(&value)
    }

    /// Fetch the publisher or category a book points at
    ///
    /// `Ok(None)` when the book has no such relationship.
    pub async fn fetch_relationship(
        &self,
        kind: ReferenceKind,
        book_id: &str,
    ) -> Result<Option<ReferenceRecord>, PortalError> {
        let request =
            RelayRequest::get(relationship_endpoint(kind, book_id)).header("Accept", JSON_API);
        let document = self.client.fetch(request).await?;
        match document.get("data") {
            Some(data @ Value::Object(_)) => Ok(Some(decode_related(kind, data))),
            _ => Ok(None),
        }
    }

    // ========================================================================
    // Bulk population
    // ========================================================================

    /// Probe the configured author IDs, at most once per session
    ///
    /// Probes run one at a time. The loaded flag is set when the pass ends,
    /// whatever the individual outcomes, so failures never trigger a retry.
    pub async fn ensure_authors_populated(&self) {
        if self.cache.is_loaded(ReferenceKind::Author) {
            return;
        }
        let _gate = self.gate(ReferenceKind::Author).lock().await;
        if self.cache.is_loaded(ReferenceKind::Author) {
            return;
        }

        let generation = self.cache.generation();
        if self.client.basic_auth().is_none() {
            tracing::info!("Skipping author population: no credentials");
            self.cache.mark_loaded(ReferenceKind::Author, generation);
            return;
        }

        let mut loaded = 0usize;
        let mut failed = 0usize;
        for id in &self.config.author_probe_ids {
            match self.fetch_author(id).await {
                Ok(author) => {
                    tracing::debug!(id = %id, name = %author.display_name, "Author loaded");
                    self.cache.upsert(ReferenceKind::Author, id, author, generation);
                    loaded += 1;
                }
                Err(PortalError::NotFound(_)) => {
                    tracing::debug!(id = %id, "Author not found, skipping");
                    failed += 1;
                }
                Err(err) => {
                    tracing::warn!(id = %id, "Failed to fetch author: {}", err);
                    failed += 1;
                }
            }
        }

        self.cache.mark_loaded(ReferenceKind::Author, generation);
        tracing::info!(
            loaded,
            failed,
            cached = self.cache.len(ReferenceKind::Author),
            "Author population completed"
        );
    }

    /// Load the publishers of the given books, at most once per session
    pub async fn load_publishers_for(&self, book_ids: &[String]) {
        self.load_related_for(ReferenceKind::Publisher, book_ids).await
    }

    /// Load the categories of the given books, at most once per session
    pub async fn load_categories_for(&self, book_ids: &[String]) {
        self.load_related_for(ReferenceKind::Category, book_ids).await
    }

    async fn load_related_for(&self, kind: ReferenceKind, book_ids: &[String]) {
        if book_ids.is_empty() || self.cache.is_loaded(kind) {
            return;
        }
        let _gate = self.gate(kind).lock().await;
        if self.cache.is_loaded(kind) {
            return;
        }

        let generation = self.cache.generation();
        let mut loaded = 0usize;
        let mut failed = 0usize;
        for book_id in book_ids {
            match self.fetch_relationship(kind, book_id).await {
                Ok(Some(record)) => {
                    let id = record.id.clone();
                    tracing::debug!(kind = %kind, id = %id, book = %book_id, "Reference loaded");
                    self.cache.upsert(kind, &id, record, generation);
                    loaded += 1;
                }
                Ok(None) => {
                    tracing::debug!(
                        kind = %kind,
                        book = %book_id,
                        "Book has no reference, skipping"
                    );
                }
                Err(PortalError::NotFound(_)) => {
                    tracing::debug!(kind = %kind, book = %book_id, "Reference not found, skipping");
                    failed += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        kind = %kind,
                        book = %book_id,
                        "Failed to fetch reference: {}",
                        err
                    );
                    failed += 1;
                }
            }
        }

        self.cache.mark_loaded(kind, generation);
        tracing::info!(
            kind = %kind,
            loaded,
            failed,
            cached = self.cache.len(kind),
            "Reference population completed"
        );
    }

    // ========================================================================
    // Backfill
    // ========================================================================

    /// Fetch a record that was missing during normalization, in the background
    ///
    /// The result lands in the cache for later lookups only. Concurrent
    /// backfills of the same ID may race; the first stored record wins and
    /// the others are dropped.
    pub fn fetch_missing(self: &Arc<Self>, missing: MissingReference) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.backfill(missing).await })
    }

    async fn backfill(&self, missing: MissingReference) {
        if self.cache.contains(missing.kind, &missing.id) {
            return;
        }
        let generation = self.cache.generation();

        let fetched = match missing.kind {
            ReferenceKind::Author => {
                if self.client.basic_auth().is_none() {
                    tracing::debug!(id = %missing.id, "Cannot backfill author without credentials");
                    return;
                }
                self.fetch_author(&missing.id).await.map(Some)
            }
            kind => self.fetch_relationship(kind, &missing.book_id).await,
        };

        match fetched {
            Ok(Some(record)) => {
                let id = match missing.kind {
                    ReferenceKind::Author => missing.id.clone(),
                    _ => record.id.clone(),
                };
                if self.cache.upsert(missing.kind, &id, record, generation) {
                    tracing::debug!(kind = %missing.kind, id = %id, "Backfilled reference");
                }
            }
            Ok(None) => {
                tracing::debug!(kind = %missing.kind, id = %missing.id, "Backfill found no record");
            }
            Err(PortalError::NotFound(_)) => {
                tracing::debug!(
                    kind = %missing.kind,
                    id = %missing.id,
                    "Backfill target not found"
                );
            }
            Err(err) => {
                tracing::warn!(kind = %missing.kind, id = %missing.id, "Backfill failed: {}", err);
            }
        }
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Cached authors, populating them first if needed
    pub async fn get_authors(&self) -> Vec<ReferenceRecord> {
        self.ensure_authors_populated().await;
        self.cache.records(ReferenceKind::Author)
    }

    /// Records of one kind currently cached
    pub fn records(&self, kind: ReferenceKind) -> Vec<ReferenceRecord> {
        self.cache.records(kind)
    }

    /// Single author, fetched directly and not cached
    pub async fn get_author(&self, id: &str) -> Result<ReferenceRecord, PortalError> {
        self.fetch_author(id)
            .await
            .map_err(|e| e.with_context("Failed to fetch author details"))
    }

    /// Publisher of one book, fetched directly and not cached
    pub async fn get_publication(&self, book_id: &str) -> Result<ReferenceRecord, PortalError> {
        self.fetch_relationship(ReferenceKind::Publisher, book_id)
            .await
            .and_then(|found| {
                found.ok_or_else(|| PortalError::NotFound("No publication data found".to_string()))
            })
            .map_err(|e| e.with_context("Failed to fetch publication details"))
    }
}
