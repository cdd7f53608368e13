//! Reference-data cache
//!
//! Three independent ID -> record stores (authors, publishers, categories),
//! each with a "loaded" flag recording whether its bulk population ran during
//! the current session.
//!
//! Writes are insert-if-absent, so once an ID is cached it resolves to the
//! same record until `clear()`. Every `clear()` bumps a generation counter;
//! background fetches capture the generation when they start and their
//! results are dropped if the cache was cleared in the meantime. Writes hold
//! the read side of a gate across the generation check and the insert, and
//! `clear()` holds the write side, so a write never lands after a clear that
//! started once its check passed.

pub mod memory;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

use crate::models::{ReferenceKind, ReferenceRecord};

pub use memory::RecordCache;

#[derive(Debug, Default)]
struct KindStore {
    records: RecordCache,
    loaded: AtomicBool,
}

/// Session-scoped cache of reference records
#[derive(Debug, Default)]
pub struct ReferenceCache {
    authors: KindStore,
    publishers: KindStore,
    categories: KindStore,
    generation: AtomicU64,
    gate: RwLock<()>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self, kind: ReferenceKind) -> &KindStore {
        match kind {
            ReferenceKind::Author => &self.authors,
            ReferenceKind::Publisher => &self.publishers,
            ReferenceKind::Category => &self.categories,
        }
    }

    /// Synchronous lookup; never blocks and never fetches
    pub fn resolve(&self, kind: ReferenceKind, id: &str) -> Option<ReferenceRecord> {
        let record = self.store(kind).records.get(id);
        tracing::debug!(kind = %kind, id, hit = record.is_some(), "Reference lookup");
        record
    }

    pub fn contains(&self, kind: ReferenceKind, id: &str) -> bool {
        self.store(kind).records.contains(id)
    }

    /// Current session generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn write_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a record fetched during `generation`
    ///
    /// Returns `true` when the record was stored. Records from an earlier
    /// generation, and IDs that are already cached, are left untouched.
    pub fn upsert(
        &self,
        kind: ReferenceKind,
        id: &str,
        record: ReferenceRecord,
        generation: u64,
    ) -> bool {
        if id.is_empty() {
            return false;
        }
        let _gate = self.write_gate();
        if generation != self.generation() {
            return false;
        }
        self.store(kind).records.insert_if_absent(id, record)
    }

    /// All records of one kind
    pub fn records(&self, kind: ReferenceKind) -> Vec<ReferenceRecord> {
        self.store(kind).records.records()
    }

    pub fn len(&self, kind: ReferenceKind) -> usize {
        self.store(kind).records.len()
    }

    /// Whether the bulk population of `kind` already ran this session
    pub fn is_loaded(&self, kind: ReferenceKind) -> bool {
        self.store(kind).loaded.load(Ordering::SeqCst)
    }

    /// Flag `kind` as populated, unless the cache was cleared since `generation`
    pub fn mark_loaded(&self, kind: ReferenceKind, generation: u64) {
        let _gate = self.write_gate();
        if generation == self.generation() {
            self.store(kind).loaded.store(true, Ordering::SeqCst);
        }
    }

    /// Drop every record and reset every loaded flag
    pub fn clear(&self) {
        let generation = {
            let _gate = self.gate.write().unwrap_or_else(|e| e.into_inner());
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            for kind in ReferenceKind::ALL {
                let store = self.store(kind);
                store.loaded.store(false, Ordering::SeqCst);
                store.records.clear();
            }
            generation
        };
        tracing::debug!(generation, "Reference cache cleared");
    }
}
