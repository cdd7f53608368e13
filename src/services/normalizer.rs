//! Book normalizer
//!
//! Turns one raw backend book record into a flat `Book`, resolving foreign
//! keys through a snapshot of the reference cache. The function is pure: the
//! foreign keys it could not resolve are returned alongside the book so the
//! caller can schedule backfills.

use serde_json::Value;

use super::shape::{relationship_target, relationship_targets, rich_text, text, to_id};
use crate::cache::ReferenceCache;
use crate::models::{Book, BookStatus, ReferenceKind};

const DEFAULT_TITLE: &str = "Unknown Title";
const DEFAULT_COPIES: u32 = 1;

/// Relationship names on a book record
const AUTHOR_FIELD: &str = "uid";
const PUBLISHER_FIELD: &str = "lmspublication";
const CATEGORY_FIELD: &str = "lmsbook_category";

/// A foreign key that was not in the cache when a book was normalized
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MissingReference {
    pub kind: ReferenceKind,
    /// ID of the referenced record
    pub id: String,
    /// Book holding the reference; publisher and category lookups go through it
    pub book_id: String,
}

/// Result of normalizing one record
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub book: Book,
    pub missing: Vec<MissingReference>,
}

/// Normalize a raw book record against the current cache contents
pub fn normalize(record: &Value, cache: &ReferenceCache) -> Normalized {
    let attributes = match record.get("attributes") {
        Some(attributes @ Value::Object(_)) => attributes,
        _ => record,
    };

    let id = to_id(record.get("id"))
        .or_else(|| to_id(attributes.get("id")))
        .or_else(|| to_id(attributes.get("uuid")))
        .or_else(|| to_id(attributes.get("nid")))
        .unwrap_or_default();

    let title = text(attributes.get("title")).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let copies = text(attributes.get("copies"))
        .and_then(|raw| parse_copies(&raw))
        .unwrap_or(DEFAULT_COPIES);

    let mut missing = Vec::new();
    let mut note_missing = |kind: ReferenceKind, target: &str| {
        let reference = MissingReference {
            kind,
            id: target.to_string(),
            book_id: id.clone(),
        };
        if !missing.contains(&reference) {
            missing.push(reference);
        }
    };

    let author_ids = relationship_targets(record, AUTHOR_FIELD);
    let mut author_names = Vec::new();
    for author_id in &author_ids {
        match cache.resolve(ReferenceKind::Author, author_id) {
            Some(author) if !author.display_name.is_empty() => {
                author_names.push(author.display_name)
            }
            Some(_) => {}
            None => note_missing(ReferenceKind::Author, author_id),
        }
    }
    let author = if author_names.is_empty() {
        ReferenceKind::Author.placeholder().to_string()
    } else {
        author_names.join(", ")
    };

    let mut resolve_single = |kind: ReferenceKind, field: &str| -> String {
        let Some(target) = relationship_target(record, field) else {
            return kind.placeholder().to_string();
        };
        match cache.resolve(kind, &target) {
            Some(found) if !found.display_name.is_empty() => found.display_name,
            Some(_) => kind.placeholder().to_string(),
            None => {
                note_missing(kind, &target);
                kind.placeholder().to_string()
            }
        }
    };
    let publisher = resolve_single(ReferenceKind::Publisher, PUBLISHER_FIELD);
    let category = resolve_single(ReferenceKind::Category, CATEGORY_FIELD);

    let book = Book {
        id,
        title,
        author,
        isbn: text(attributes.get("isbn")).unwrap_or_default(),
        category,
        publisher,
        status: BookStatus::from_copies(copies),
        copies,
        books_available: copies,
        books_issued: 0,
        description: rich_text(attributes.get("details")).unwrap_or_default(),
        price: text(attributes.get("price")).unwrap_or_default(),
        featured_image: text(attributes.get("featured_image")).unwrap_or_default(),
        author_ids,
    };

    Normalized { book, missing }
}

/// Leading-integer parse of a copy count
///
/// `"3"` and `"3 copies"` give 3, negative counts clamp to 0, and input
/// without leading digits gives `None`.
fn parse_copies(raw: &str) -> Option<u32> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if negative {
        return Some(0);
    }
    Some(digits.parse::<u32>().unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReferenceRecord;
    use serde_json::json;

    fn dune() -> Value {
        json!({
            "id": "b1",
            "attributes": {
                "title": [{ "value": "Dune" }],
                "copies": [{ "value": "3" }]
            },
            "relationships": {
                "uid": { "data": [{ "meta": { "drupal_internal__target_id": 7 } }] }
            }
        })
    }

    #[test]
    fn test_unresolved_author_uses_placeholder() {
        let cache = ReferenceCache::new();
        let normalized = normalize(&dune(), &cache);

        assert_eq!(normalized.book.id, "b1");
        assert_eq!(normalized.book.title, "Dune");
        assert_eq!(normalized.book.author, "Unknown Author");
        assert_eq!(normalized.book.status, BookStatus::Available);
        assert_eq!(normalized.book.copies, 3);
        assert_eq!(normalized.book.books_available, 3);
        assert_eq!(normalized.book.author_ids, vec!["7"]);
        assert_eq!(
            normalized.missing,
            vec![MissingReference {
                kind: ReferenceKind::Author,
                id: "7".into(),
                book_id: "b1".into()
            }]
        );
    }

    #[test]
    fn test_cached_author_is_resolved() {
        let cache = ReferenceCache::new();
        cache.upsert(
            ReferenceKind::Author,
            "7",
            ReferenceRecord::new("7", "Frank Herbert"),
            cache.generation(),
        );

        let normalized = normalize(&dune(), &cache);
        assert_eq!(normalized.book.author, "Frank Herbert");
        assert!(normalized.missing.is_empty());
    }

    #[test]
    fn test_multiple_authors_are_joined() {
        let cache = ReferenceCache::new();
        let gen = cache.generation();
        cache.upsert(ReferenceKind::Author, "1", ReferenceRecord::new("1", "Terry Pratchett"), gen);
        cache.upsert(ReferenceKind::Author, "2", ReferenceRecord::new("2", "Neil Gaiman"), gen);

        let record = json!({
            "id": "b2",
            "attributes": { "title": [{ "value": "Good Omens" }] },
            "relationships": { "uid": { "data": [
                { "meta": { "drupal_internal__target_id": 1 } },
                { "meta": { "drupal_internal__target_id": 3 } },
                { "meta": { "drupal_internal__target_id": 2 } }
            ]}}
        });

        let normalized = normalize(&record, &cache);
        assert_eq!(normalized.book.author, "Terry Pratchett, Neil Gaiman");
        assert_eq!(normalized.missing.len(), 1);
        assert_eq!(normalized.missing[0].id, "3");
    }

    #[test]
    fn test_publisher_and_category_resolution() {
        let cache = ReferenceCache::new();
        cache.upsert(
            ReferenceKind::Category,
            "4",
            ReferenceRecord::new("4", "Science Fiction"),
            cache.generation(),
        );

        let record = json!({
            "id": "uuid-b3",
            "attributes": {
                "title": [{ "value": "Foundation" }],
                "isbn": [{ "value": "9780553293357" }],
                "price": [{ "value": "12.99" }],
                "details": { "value": "<p>raw</p>", "processed": "<p>Psychohistory</p>" }
            },
            "relationships": {
                "lmspublication": { "data": { "meta": { "drupal_internal__target_id": 2 } } },
                "lmsbook_category": { "data": { "meta": { "drupal_internal__target_id": 4 } } }
            }
        });

        let normalized = normalize(&record, &cache);
        let book = &normalized.book;
        assert_eq!(book.category, "Science Fiction");
        assert_eq!(book.publisher, "Unknown Publisher");
        assert_eq!(book.isbn, "9780553293357");
        assert_eq!(book.price, "12.99");
        assert_eq!(book.description, "<p>Psychohistory</p>");
        assert_eq!(
            normalized.missing,
            vec![MissingReference {
                kind: ReferenceKind::Publisher,
                id: "2".into(),
                book_id: "uuid-b3".into()
            }]
        );
    }

    #[test]
    fn test_flat_record_defaults() {
        let cache = ReferenceCache::new();
        let record = json!({
            "id": [{ "value": 12 }],
            "uid": [{ "target_id": 8 }],
            "copies": [{ "value": "none" }]
        });

        let book = normalize(&record, &cache).book;
        assert_eq!(book.id, "12");
        assert_eq!(book.title, "Unknown Title");
        assert_eq!(book.author, "Unknown Author");
        assert_eq!(book.category, "General");
        assert_eq!(book.publisher, "Unknown Publisher");
        assert_eq!(book.copies, 1);
        assert_eq!(book.books_issued, 0);
        assert_eq!(book.author_ids, vec!["8"]);
    }

    #[test]
    fn test_zero_copies_is_borrowed() {
        let cache = ReferenceCache::new();
        let record = json!({ "id": "b4", "attributes": { "copies": [{ "value": "0" }] } });
        let book = normalize(&record, &cache).book;
        assert_eq!(book.copies, 0);
        assert_eq!(book.status, BookStatus::Borrowed);
    }

    #[test]
    fn test_duplicate_missing_ids_are_reported_once() {
        let cache = ReferenceCache::new();
        let record = json!({
            "id": "b5",
            "relationships": { "uid": { "data": [
                { "meta": { "drupal_internal__target_id": 7 } },
                { "meta": { "drupal_internal__target_id": 7 } }
            ]}}
        });
        assert_eq!(normalize(&record, &cache).missing.len(), 1);
    }

    #[test]
    fn test_parse_copies() {
        assert_eq!(parse_copies("3"), Some(3));
        assert_eq!(parse_copies(" 12 copies"), Some(12));
        assert_eq!(parse_copies("-2"), Some(0));
        assert_eq!(parse_copies("abc"), None);
        assert_eq!(parse_copies(""), None);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_record() -> impl Strategy<Value = Value> {
            (
                "[a-z0-9-]{1,12}",
                proptest::option::of("[A-Za-z ]{0,20}"),
                proptest::option::of("[0-9]{1,3}|[a-z]{1,3}"),
                proptest::collection::vec(1u32..20, 0..4),
                proptest::option::of(1u32..6),
            )
                .prop_map(|(id, title, copies, authors, publisher)| {
                    let mut attributes = serde_json::Map::new();
                    if let Some(title) = title {
                        attributes.insert("title".into(), json!([{ "value": title }]));
                    }
                    if let Some(copies) = copies {
                        attributes.insert("copies".into(), json!([{ "value": copies }]));
                    }
                    let authors: Vec<Value> = authors
                        .into_iter()
                        .map(|a| json!({ "meta": { "drupal_internal__target_id": a } }))
                        .collect();
                    let mut relationships = json!({ "uid": { "data": authors } });
                    if let Some(p) = publisher {
                        relationships["lmspublication"] =
                            json!({ "data": { "meta": { "drupal_internal__target_id": p } } });
                    }
                    json!({ "id": id, "attributes": attributes, "relationships": relationships })
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            /// Normalizing the same record twice against an unchanged cache
            /// gives identical results.
            #[test]
            fn normalization_is_idempotent(
                record in arb_record(),
                cached in proptest::collection::vec(1u32..20, 0..8),
            ) {
                let cache = ReferenceCache::new();
                let gen = cache.generation();
                for id in cached {
                    let id = id.to_string();
                    let record = ReferenceRecord::new(id.clone(), format!("Author {}", id));
                    cache.upsert(ReferenceKind::Author, &id, record, gen);
                }

                let first = normalize(&record, &cache);
                let second = normalize(&record, &cache);
                prop_assert_eq!(first, second);
            }

            /// Against an empty cache every distinct author ID is reported
            /// missing exactly once and the placeholder is shown.
            #[test]
            fn unresolved_authors_are_reported(record in arb_record()) {
                let cache = ReferenceCache::new();
                let normalized = normalize(&record, &cache);

                let expected: std::collections::HashSet<_> =
                    normalized.book.author_ids.iter().cloned().collect();
                let reported: Vec<_> = normalized
                    .missing
                    .iter()
                    .filter(|m| m.kind == ReferenceKind::Author)
                    .map(|m| m.id.clone())
                    .collect();

                prop_assert_eq!(reported.len(), expected.len());
                prop_assert!(reported.iter().all(|id| expected.contains(id)));
                prop_assert_eq!(normalized.book.author.as_str(), "Unknown Author");
            }
        }
    }
}
