//! Account models: profile, reservations, borrowed books

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Faculty,
}

/// Library profile of the logged-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: UserRole,
    pub credits: u32,
    pub max_credits: u32,
    pub borrowed_books_count: u32,
    pub active_reservations_count: u32,
}

impl UserProfile {
    /// Stand-in used when the backend has no profile endpoint
    pub fn placeholder(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            email: None,
            role: UserRole::Student,
            credits: 3,
            max_credits: 5,
            borrowed_books_count: 2,
            active_reservations_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Expired,
    Collected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub book_id: String,
    pub book_title: String,
    #[serde(default)]
    pub book_author: String,
    pub reserved_at: String,
    #[serde(default)]
    pub expires_at: String,
    pub status: ReservationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowedBook {
    pub id: String,
    pub book_id: String,
    pub book_title: String,
    #[serde(default)]
    pub book_author: String,
    pub borrowed_at: String,
    pub due_date: String,
    pub status: LoanStatus,
}

/// Credit balance reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub available_credits: u32,
    pub max_credits: u32,
    pub used_credits: u32,
}
