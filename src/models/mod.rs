//! Data models
//!
//! This module contains the data structures shared across the portal:
//! - Normalized view models (Book, ReferenceRecord)
//! - Session state and login wire types
//! - Account data passed through from the backend

mod account;
mod book;
mod reference;
mod session;

pub use account::{
    BorrowedBook, CreditBalance, LoanStatus, Reservation, ReservationStatus, UserProfile, UserRole,
};
pub use book::{Book, BookFilter, BookStatus, CirculationReceipt, SearchField};
pub use reference::{ReferenceKind, ReferenceRecord};
pub use session::{
    AuthenticatedSession, CurrentUser, LoginRequest, LoginResponse, LoginResult, SessionState,
    SessionStatus, SessionUser,
};
