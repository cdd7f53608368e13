//! Book operations
//!
//! Listing, details and circulation commands. Listings are normalized against
//! the reference cache; references that were missing are backfilled in the
//! background and show up on the next fetch.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use super::client::{decode, BackendClient, JSON_API};
use super::normalizer::{normalize, Normalized};
use super::reference::ReferenceService;
use super::shape::scalar;
use crate::error::PortalError;
use crate::models::{Book, BookFilter, CirculationReceipt, ReferenceKind, ReferenceRecord};
use crate::relay::RelayRequest;

pub const BOOKS_ENDPOINT: &str = "/web/jsonapi/lmsbook/lmsbook?fields[lmsbook--lmsbook]=title,uid,isbn,lmsbook_category,lmspublication,copies,price,details,featured_image,author";

/// Category names offered when neither the cache nor the listing yields any
pub const DEFAULT_CATEGORIES: [&str; 11] = [
    "Fiction",
    "Non-Fiction",
    "Science",
    "History",
    "Biography",
    "Technology",
    "Business",
    "Arts",
    "Philosophy",
    "Religion",
    "General",
];

pub fn book_endpoint(id: &str) -> String {
    format!("/web/lmsbook/{}?_format=json", id)
}

/// Circulation commands, each an authenticated POST without a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Circulation {
    Reserve,
    CancelReservation,
    Borrow,
    Return,
    Renew,
}

impl Circulation {
    /// Backend endpoint for the command; `id` is a book ID, or a
    /// reservation ID for cancellation
    pub fn endpoint(self, id: &str) -> String {
        match self {
            Circulation::Reserve => format!("/web/books/{}/reserve?_format=json", id),
            Circulation::CancelReservation => {
                format!("/web/reservations/{}/cancel?_format=json", id)
            }
            Circulation::Borrow => format!("/web/books/{}/borrow?_format=json", id),
            Circulation::Return => format!("/web/books/{}/return?_format=json", id),
            Circulation::Renew => format!("/web/books/{}/renew?_format=json", id),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Circulation::Reserve => "reserve",
            Circulation::CancelReservation => "cancel reservation",
            Circulation::Borrow => "borrow",
            Circulation::Return => "return",
            Circulation::Renew => "renew",
        }
    }
}

/// Book service
pub struct BookService {
    client: BackendClient,
    references: Arc<ReferenceService>,
}

impl BookService {
    pub fn new(client: BackendClient, references: Arc<ReferenceService>) -> Self {
        Self { client, references }
    }

    pub fn references(&self) -> &Arc<ReferenceService> {
        &self.references
    }

    /// List books, then filter them client-side
    pub async fn get_books(&self, filter: &BookFilter) -> Result<Vec<Book>, PortalError> {
        self.references.ensure_authors_populated().await;

        let request = RelayRequest::get(BOOKS_ENDPOINT).header("Accept", JSON_API);
        let document = self
            .client
            .fetch(request)
            .await
            .map_err(|e| PortalError::from(e).with_context("Failed to fetch books"))?;

        let Some(records) = document.get("data").and_then(Value::as_array) else {
            tracing::info!("Book listing carried no data array");
            return Ok(Vec::new());
        };

        let book_ids: Vec<String> = records
            .iter()
            .filter_map(|record| record.get("id").and_then(scalar))
            .take(self.references.config().relationship_fanout)
            .collect();
        self.references.load_publishers_for(&book_ids).await;
        self.references.load_categories_for(&book_ids).await;

        let books = self.normalize_all(records);
        tracing::info!(count = books.len(), "Books processed");
        Ok(filter.apply(books))
    }

    /// Single book from the authenticated entity endpoint
    pub async fn get_book_details(&self, id: &str) -> Result<Book, PortalError> {
        self.references.ensure_authors_populated().await;

        let record = self
            .client
            .fetch_authenticated(RelayRequest::get(book_endpoint(id)))
            .await
            .map_err(|e| e.with_context("Failed to fetch book details"))?;

        let mut books = self.normalize_all(std::slice::from_ref(&record));
        books
            .pop()
            .ok_or_else(|| PortalError::Validation("Failed to fetch book details".to_string()))
    }

    fn normalize_all(&self, records: &[Value]) -> Vec<Book> {
        let cache = self.references.cache();
        let mut scheduled = HashSet::new();
        records
            .iter()
            .map(|record| {
                let Normalized { book, missing } = normalize(record, cache);
                for reference in missing {
                    if scheduled.insert((reference.kind, reference.id.clone())) {
                        tracing::debug!(
                            kind = %reference.kind,
                            id = %reference.id,
                            "Reference cache miss"
                        );
                        drop(self.references.fetch_missing(reference));
                    }
                }
                book
            })
            .collect()
    }

    // ========================================================================
    // Circulation
    // ========================================================================

    pub async fn circulate(
        &self,
        command: Circulation,
        id: &str,
    ) -> Result<CirculationReceipt, PortalError> {
        let value = self
            .client
            .fetch_authenticated(RelayRequest::post(command.endpoint(id)))
            .await?;
        let receipt: CirculationReceipt = decode(value, "circulation")?;
        tracing::info!(
            command = command.as_str(),
            id = %id,
            success = receipt.success,
            "Circulation command answered"
        );
        Ok(receipt)
    }

    pub async fn reserve_book(&self, book_id: &str) -> Result<CirculationReceipt, PortalError> {
        self.circulate(Circulation::Reserve, book_id).await
    }

    pub async fn cancel_reservation(
        &self,
        reservation_id: &str,
    ) -> Result<CirculationReceipt, PortalError> {
        self.circulate(Circulation::CancelReservation, reservation_id).await
    }

    pub async fn borrow_book(&self, book_id: &str) -> Result<CirculationReceipt, PortalError> {
        self.circulate(Circulation::Borrow, book_id).await
    }

    pub async fn return_book(&self, book_id: &str) -> Result<CirculationReceipt, PortalError> {
        self.circulate(Circulation::Return, book_id).await
    }

    pub async fn renew_book(&self, book_id: &str) -> Result<CirculationReceipt, PortalError> {
        self.circulate(Circulation::Renew, book_id).await
    }

    // ========================================================================
    // Reference listings
    // ========================================================================

    /// Cached publishers
    pub fn get_publications(&self) -> Vec<ReferenceRecord> {
        self.references.records(ReferenceKind::Publisher)
    }

    /// Categories: cached records first, then the names seen in the listing,
    /// then the default list
    ///
    /// Records that do not come from the cache use the name as their ID.
    pub async fn get_categories(&self) -> Vec<ReferenceRecord> {
        let cached: Vec<ReferenceRecord> = self
            .references
            .records(ReferenceKind::Category)
            .into_iter()
            .filter(|record| !record.display_name.is_empty())
            .collect();
        if !cached.is_empty() {
            return cached;
        }

        match self.get_books(&BookFilter::default()).await {
            Ok(books) => {
                let mut seen = HashSet::new();
                let derived: Vec<ReferenceRecord> = books
                    .into_iter()
                    .map(|book| book.category)
                    .filter(|name| !name.is_empty() && seen.insert(name.clone()))
                    .map(|name| ReferenceRecord::new(name.clone(), name))
                    .collect();
                if !derived.is_empty() {
                    return derived;
                }
            }
            Err(e) => tracing::warn!("Failed to derive categories from books: {}", e),
        }

        tracing::debug!("Using default categories");
        DEFAULT_CATEGORIES
            .iter()
            .map(|name| ReferenceRecord::new(*name, *name))
            .collect()
    }

    /// Search-as-you-type suggestions
    ///
    /// A blank query answers an empty list without contacting the backend.
    pub async fn search_suggestions(&self, query: &str) -> Result<Vec<String>, PortalError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = format!("/web/search/suggestions?q={}", urlencoding::encode(query));
        let value = self
            .client
            .fetch_authenticated(RelayRequest::get(endpoint))
            .await?;
        decode(value, "suggestions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ReferenceCache;
    use crate::config::ReferenceConfig;
    use crate::models::{BookStatus, SearchField};
    use crate::services::reference::{author_endpoint, relationship_endpoint};
    use crate::session::{CredentialVault, Credentials};
    use crate::testing::{Reply, StubRelay};
    use serde_json::json;

    fn service(stub: Arc<StubRelay>, probe_ids: &[&str]) -> BookService {
        let vault = Arc::new(CredentialVault::new());
        vault.set(Credentials {
            username: "Alana Rivers".into(),
            password: Some("a".into()),
            csrf_token: "tok123".into(),
            logout_token: None,
        });
        let client = BackendClient::new(stub, vault);
        let config = ReferenceConfig {
            author_probe_ids: probe_ids.iter().map(|s| s.to_string()).collect(),
            ..ReferenceConfig::default()
        };
        let references = Arc::new(ReferenceService::new(
            client.clone(),
            Arc::new(ReferenceCache::new()),
            config,
        ));
        BookService::new(client, references)
    }

    fn listed_book(id: &str, title: &str, author: u32) -> Value {
        json!({
            "type": "lmsbook--lmsbook",
            "id": id,
            "attributes": {
                "title": title,
                "isbn": "9780441013593",
                "copies": "2"
            },
            "relationships": {
                "uid": { "data": [{ "meta": { "drupal_internal__target_id": author } }] },
                "lmspublication": { "data": { "meta": { "drupal_internal__target_id": 3 } } },
                "lmsbook_category": { "data": null }
            }
        })
    }

    fn author(id: u32, name: &str) -> Value {
        json!({ "id": [{ "value": id }], "title": [{ "value": name }] })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_listing_resolves_references() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(BOOKS_ENDPOINT, json!({ "data": [listed_book("b1", "Dune", 7)] }));
        stub.ok(&author_endpoint("7"), author(7, "Frank Herbert"));
        stub.ok(
            &relationship_endpoint(ReferenceKind::Publisher, "b1"),
            json!({
                "data": {
                    "id": "p-uuid",
                    "attributes": { "drupal_internal__id": 3, "title": "Ace" }
                }
            }),
        );
        stub.ok(&relationship_endpoint(ReferenceKind::Category, "b1"), json!({ "data": null }));
        let books = service(stub.clone(), &["7"]);

        let listed = books.get_books(&BookFilter::default()).await.unwrap();

        assert_eq!(listed.len(), 1);
        let dune = &listed[0];
        assert_eq!(dune.author, "Frank Herbert");
        assert_eq!(dune.publisher, "Ace");
        assert_eq!(dune.category, "General");
        assert_eq!(dune.status, BookStatus::Available);
        assert_eq!(dune.books_available, 2);

        let listing = stub.calls().into_iter().find(|c| c.endpoint == BOOKS_ENDPOINT).unwrap();
        assert_eq!(listing.header_value("accept"), Some(JSON_API));

        // Reference data is fetched once per session
        books.get_books(&BookFilter::default()).await.unwrap();
        assert_eq!(stub.count(&author_endpoint("7")), 1);
        assert_eq!(stub.count(&relationship_endpoint(ReferenceKind::Publisher, "b1")), 1);
        assert_eq!(stub.count(BOOKS_ENDPOINT), 2);
    }

    #[tokio::test]
    async fn test_missing_author_is_backfilled_for_next_fetch() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(BOOKS_ENDPOINT, json!({ "data": [listed_book("b2", "The Dispossessed", 9)] }));
        stub.ok(&author_endpoint("9"), author(9, "Ursula K. Le Guin"));
        let books = service(stub.clone(), &[]);

        let first = books.get_books(&BookFilter::default()).await.unwrap();
        assert_eq!(first[0].author, "Unknown Author");

        settle().await;
        let second = books.get_books(&BookFilter::default()).await.unwrap();
        assert_eq!(second[0].author, "Ursula K. Le Guin");
        assert_eq!(stub.count(&author_endpoint("9")), 1);
    }

    #[tokio::test]
    async fn test_misses_are_backfilled_once_per_batch() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(
            BOOKS_ENDPOINT,
            json!({ "data": [listed_book("b1", "Dune", 9), listed_book("b2", "Dune Messiah", 9)] }),
        );
        let books = service(stub.clone(), &[]);

        books.get_books(&BookFilter::default()).await.unwrap();
        settle().await;

        assert_eq!(stub.count(&author_endpoint("9")), 1);
    }

    #[tokio::test]
    async fn test_listing_is_filtered() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(
            BOOKS_ENDPOINT,
            json!({ "data": [listed_book("b1", "Dune", 7), listed_book("b2", "Neuromancer", 8)] }),
        );
        let books = service(stub, &[]);

        let filter = BookFilter {
            search: Some("NEURO".into()),
            search_field: SearchField::Title,
            ..BookFilter::default()
        };
        let found = books.get_books(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b2");
    }

    #[tokio::test]
    async fn test_listing_without_data_is_empty() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(BOOKS_ENDPOINT, json!({ "links": {} }));
        let books = service(stub, &[]);

        assert!(books.get_books(&BookFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_carries_context() {
        let stub = Arc::new(StubRelay::new());
        stub.route(BOOKS_ENDPOINT, Reply::Json(500, json!({ "message": "boom" })));
        let books = service(stub, &[]);

        let err = books.get_books(&BookFilter::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch books: boom");
        assert_eq!(err.status(), 500);
    }

    #[tokio::test]
    async fn test_book_details_use_flat_shape() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(&author_endpoint("7"), author(7, "Frank Herbert"));
        stub.ok(
            &book_endpoint("12"),
            json!({
                "id": [{ "value": 12 }],
                "title": [{ "value": "Dune" }],
                "uid": [{ "target_id": 7 }],
                "copies": [{ "value": "0" }]
            }),
        );
        let books = service(stub.clone(), &["7"]);

        let book = books.get_book_details("12").await.unwrap();
        assert_eq!(book.id, "12");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.status, BookStatus::Borrowed);

        let sent = stub.calls().into_iter().find(|c| c.endpoint == book_endpoint("12")).unwrap();
        assert_eq!(sent.header_value("x-csrf-token"), Some("tok123"));
    }

    #[tokio::test]
    async fn test_book_details_not_found() {
        let stub = Arc::new(StubRelay::new());
        let books = service(stub, &[]);

        let err = books.get_book_details("404").await.unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));
        assert_eq!(
            err.to_string(),
            "Failed to fetch book details: Endpoint not found: /web/lmsbook/404?_format=json"
        );
    }

    #[tokio::test]
    async fn test_circulation_receipt_passes_through() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(
            &Circulation::Renew.endpoint("b1"),
            json!({ "success": true, "message": "Renewed", "new_due_date": "2024-06-01" }),
        );
        let books = service(stub.clone(), &[]);

        let receipt = books.renew_book("b1").await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.message, "Renewed");
        assert_eq!(receipt.extra["new_due_date"], "2024-06-01");

        let sent = &stub.calls()[0];
        assert_eq!(sent.method, crate::relay::RelayMethod::Post);
        assert!(sent.header_value("authorization").unwrap().starts_with("Basic "));
    }

    #[test]
    fn test_circulation_endpoints() {
        assert_eq!(Circulation::Reserve.endpoint("5"), "/web/books/5/reserve?_format=json");
        assert_eq!(
            Circulation::CancelReservation.endpoint("r9"),
            "/web/reservations/r9/cancel?_format=json"
        );
        assert_eq!(Circulation::Borrow.endpoint("5"), "/web/books/5/borrow?_format=json");
        assert_eq!(Circulation::Return.endpoint("5"), "/web/books/5/return?_format=json");
    }

    #[tokio::test]
    async fn test_categories_fall_back_to_defaults() {
        let stub = Arc::new(StubRelay::new());
        stub.route(BOOKS_ENDPOINT, Reply::Offline);
        let books = service(stub, &[]);

        let categories = books.get_categories().await;
        assert_eq!(categories.len(), DEFAULT_CATEGORIES.len());
        assert_eq!(categories[0], ReferenceRecord::new("Fiction", "Fiction"));
    }

    #[tokio::test]
    async fn test_categories_prefer_cache() {
        let stub = Arc::new(StubRelay::new());
        let books = service(stub.clone(), &[]);
        let cache = books.references().cache();
        cache.upsert(
            ReferenceKind::Category,
            "4",
            ReferenceRecord::new("4", "Science Fiction"),
            cache.generation(),
        );

        let categories = books.get_categories().await;
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].id, "4");
        assert_eq!(categories[0].display_name, "Science Fiction");
        assert_eq!(stub.total(), 0);
    }

    #[tokio::test]
    async fn test_categories_derived_from_listing() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(
            BOOKS_ENDPOINT,
            json!({ "data": [listed_book("b1", "Dune", 7), listed_book("b2", "Emma", 8)] }),
        );
        let books = service(stub, &[]);

        // Neither book resolves a category, so both show the placeholder
        let categories = books.get_categories().await;
        assert_eq!(categories, vec![ReferenceRecord::new("General", "General")]);
    }

    #[tokio::test]
    async fn test_search_suggestions_are_authenticated() {
        let stub = Arc::new(StubRelay::new());
        stub.ok("/web/search/suggestions?q=dune%20messiah", json!(["Dune Messiah"]));
        let books = service(stub.clone(), &[]);

        assert_eq!(
            books.search_suggestions(" dune messiah ").await.unwrap(),
            vec!["Dune Messiah".to_string()]
        );

        let sent = &stub.calls()[0];
        assert_eq!(sent.endpoint, "/web/search/suggestions?q=dune%20messiah");
        assert_eq!(sent.header_value("x-csrf-token"), Some("tok123"));
        assert!(sent.header_value("authorization").unwrap().starts_with("Basic "));
    }

    #[tokio::test]
    async fn test_blank_search_query_skips_backend() {
        let stub = Arc::new(StubRelay::new());
        let books = service(stub.clone(), &[]);

        assert!(books.search_suggestions("").await.unwrap().is_empty());
        assert!(books.search_suggestions("   ").await.unwrap().is_empty());
        assert_eq!(stub.count_prefix("/web/search/suggestions"), 0);
    }
}
