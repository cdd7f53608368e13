//! Services layer
//!
//! Operations the portal performs against the backend:
//! - Decoding backend payload shapes and normalizing book records
//! - Populating and backfilling the reference cache
//! - Book listing, details and circulation commands
//! - Account data of the logged-in user
//! - Rate-limited activity recording

pub mod account;
pub mod activity;
pub mod books;
pub mod client;
pub mod normalizer;
pub mod reference;
pub mod shape;

pub use account::AccountService;
pub use activity::{ActivityChannel, ActivityLimiter};
pub use books::{BookService, Circulation};
pub use client::BackendClient;
pub use normalizer::{normalize, MissingReference, Normalized};
pub use reference::ReferenceService;
