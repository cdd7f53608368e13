//! Reference records: authors, publishers and categories

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of reference record a book points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Author,
    Publisher,
    Category,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 3] = [
        ReferenceKind::Author,
        ReferenceKind::Publisher,
        ReferenceKind::Category,
    ];

    /// Display value used when a foreign key cannot be resolved
    pub fn placeholder(self) -> &'static str {
        match self {
            ReferenceKind::Author => "Unknown Author",
            ReferenceKind::Publisher => "Unknown Publisher",
            ReferenceKind::Category => "General",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReferenceKind::Author => "author",
            ReferenceKind::Publisher => "publisher",
            ReferenceKind::Category => "category",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cached author, publisher or category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRecord {
    /// Backend-assigned ID
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl ReferenceRecord {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: String::new(),
            created_at: None,
            uuid: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
