//! In-memory record store using moka
//!
//! One `RecordCache` holds the reference records of a single kind.
//!
//! # Features
//! - Insert-if-absent writes: the first record stored for an ID wins
//! - No TTL and no capacity bound, so entries are never evicted individually
//! - Thread-safe concurrent access

use moka::sync::Cache;

use crate::models::ReferenceRecord;

/// Key -> record map for one reference kind
#[derive(Clone)]
pub struct RecordCache {
    /// The underlying moka cache instance
    cache: Cache<String, ReferenceRecord>,
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("entry_count", &self.len())
            .finish()
    }
}

impl RecordCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
        }
    }

    /// Synchronous lookup, never fetches
    pub fn get(&self, id: &str) -> Option<ReferenceRecord> {
        self.cache.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    /// Store a record unless one is already cached under `id`
    ///
    /// Returns `true` when the record was inserted.
    pub fn insert_if_absent(&self, id: &str, record: ReferenceRecord) -> bool {
        self.cache
            .entry(id.to_string())
            .or_insert(record)
            .is_fresh()
    }

    /// All cached records, ordered by ID (numeric IDs in numeric order)
    pub fn records(&self) -> Vec<ReferenceRecord> {
        let mut records: Vec<ReferenceRecord> =
            self.cache.iter().map(|(_, record)| record).collect();
        records.sort_by(|a, b| a.id.len().cmp(&b.id.len()).then_with(|| a.id.cmp(&b.id)));
        records
    }

    pub fn len(&self) -> usize {
        self.cache.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        // Invalidate key by key: `invalidate_all` would also hide entries
        // inserted later within the same clock tick.
        let keys: Vec<String> = self.cache.iter().map(|(key, _)| key.as_ref().clone()).collect();
        for key in keys {
            self.cache.invalidate(&key);
        }
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = RecordCache::new();
        assert!(cache.insert_if_absent("7", ReferenceRecord::new("7", "Frank Herbert")));
        assert_eq!(cache.get("7").unwrap().display_name, "Frank Herbert");
        assert!(cache.contains("7"));
        assert!(cache.get("8").is_none());
    }

    #[test]
    fn test_first_write_wins() {
        let cache = RecordCache::new();
        assert!(cache.insert_if_absent("7", ReferenceRecord::new("7", "Frank Herbert")));
        assert!(!cache.insert_if_absent("7", ReferenceRecord::new("7", "Someone Else")));
        assert_eq!(cache.get("7").unwrap().display_name, "Frank Herbert");
    }

    #[test]
    fn test_records_are_ordered_by_id() {
        let cache = RecordCache::new();
        for id in ["10", "2", "13", "1"] {
            cache.insert_if_absent(id, ReferenceRecord::new(id, format!("Author {}", id)));
        }
        let ids: Vec<String> = cache.records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "2", "10", "13"]);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_clear_then_reinsert() {
        let cache = RecordCache::new();
        cache.insert_if_absent("1", ReferenceRecord::new("1", "Old"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("1").is_none());

        assert!(cache.insert_if_absent("1", ReferenceRecord::new("1", "New")));
        assert_eq!(cache.get("1").unwrap().display_name, "New");
    }
}
