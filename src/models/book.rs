//! Book view model and client-side filtering

use serde::{Deserialize, Serialize};

/// Circulation status derived for a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    #[default]
    Available,
    Borrowed,
    Reserved,
}

impl BookStatus {
    /// Status for a parsed copy count: copies and availability are the same figure
    pub fn from_copies(copies: u32) -> Self {
        if copies > 0 {
            BookStatus::Available
        } else {
            BookStatus::Borrowed
        }
    }
}

/// Normalized book, recomputed on every fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    /// Display names, joined with ", " when there are several authors
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub publisher: String,
    pub status: BookStatus,
    pub copies: u32,
    pub books_available: u32,
    pub books_issued: u32,
    pub description: String,
    pub price: String,
    pub featured_image: String,
    /// Raw author foreign keys kept for late resolution
    pub author_ids: Vec<String>,
}

/// Field the free-text search is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Title,
    Author,
    Isbn,
    #[default]
    All,
}

/// Client-side book filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default, alias = "searchField")]
    pub search_field: SearchField,
    /// Exact category name, "all" disables the filter
    #[serde(default)]
    pub category: Option<String>,
    /// Author name fragment
    #[serde(default)]
    pub author: Option<String>,
}

impl BookFilter {
    pub fn is_empty(&self) -> bool {
        non_blank(&self.search).is_none()
            && self.category_filter().is_none()
            && non_blank(&self.author).is_none()
    }

    /// Keep the books matching every populated criterion, preserving order
    pub fn apply(&self, books: Vec<Book>) -> Vec<Book> {
        if self.is_empty() {
            return books;
        }
        books.into_iter().filter(|book| self.matches(book)).collect()
    }

    pub fn matches(&self, book: &Book) -> bool {
        if let Some(term) = non_blank(&self.search) {
            let term = term.to_lowercase();
            let contains = |value: &str| value.to_lowercase().contains(&term);
            let hit = match self.search_field {
                SearchField::Title => contains(&book.title),
                SearchField::Author => contains(&book.author),
                SearchField::Isbn => contains(&book.isbn),
                SearchField::All => {
                    contains(&book.title) || contains(&book.author) || contains(&book.isbn)
                }
            };
            if !hit {
                return false;
            }
        }

        if let Some(category) = self.category_filter() {
            if !book.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }

        if let Some(author) = non_blank(&self.author) {
            if !book.author.to_lowercase().contains(&author.to_lowercase()) {
                return false;
            }
        }

        true
    }

    fn category_filter(&self) -> Option<&str> {
        non_blank(&self.category).filter(|c| !c.eq_ignore_ascii_case("all"))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Backend answer to a circulation command, passed through as received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CirculationReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Command-specific members such as `reservation` or `new_due_date`
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
