//! Session layer
//!
//! - `manager`: the session state machine (login, logout, expiry, restore)
//! - `timers`: countdown tick and activity reconciliation tasks
//! - `store`: persisted session state
//! - `credentials`: in-memory credentials for authenticated requests
//! - `login`: login response validation and failure messages
//! - `clock`: time source

pub mod clock;
pub mod credentials;
pub mod login;
pub mod manager;
pub mod store;
pub mod timers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{CredentialVault, Credentials};
pub use login::LoginFailure;
pub use manager::{EndReason, SessionManager};
pub use store::{open_store, FileSessionStore, MemorySessionStore, SessionStore, StoredUser};
pub use timers::SessionTimers;
