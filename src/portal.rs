//! Portal context
//!
//! One explicitly constructed value owning the relay, the credentials, the
//! reference cache, the services and the session manager. Data operations
//! are gated on an active session.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::cache::ReferenceCache;
use crate::config::Config;
use crate::error::{PortalError, RelayError};
use crate::models::{
    AuthenticatedSession, Book, BookFilter, BorrowedBook, CirculationReceipt, CreditBalance,
    LoginResult, ReferenceRecord, Reservation, SessionStatus, UserProfile,
};
use crate::relay::{HttpRelay, Relay};
use crate::services::{
    AccountService, ActivityChannel, BackendClient, BookService, Circulation, ReferenceService,
};
use crate::session::{open_store, Clock, CredentialVault, SessionManager, SessionStore, SystemClock};

pub struct Portal {
    config: Config,
    relay: Arc<dyn Relay>,
    clock: Arc<dyn Clock>,
    session: Arc<SessionManager>,
    references: Arc<ReferenceService>,
    books: BookService,
    account: AccountService,
    activity: ActivityChannel,
}

impl Portal {
    /// Portal talking to the configured backend over HTTP
    ///
    /// Must be called inside a Tokio runtime.
    pub fn from_config(config: Config) -> Result<Arc<Self>, RelayError> {
        let relay = Arc::new(HttpRelay::new(&config.backend)?);
        let store = open_store(&config.storage);
        Ok(Self::new(config, relay, store, Arc::new(SystemClock)))
    }

    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: Config,
        relay: Arc<dyn Relay>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let vault = Arc::new(CredentialVault::new());
        let cache = Arc::new(ReferenceCache::new());
        let client = BackendClient::new(relay.clone(), vault);

        let session = Arc::new(SessionManager::new(
            config.session.clone(),
            clock.clone(),
            store,
            client.clone(),
            cache.clone(),
        ));
        let references = Arc::new(ReferenceService::new(
            client.clone(),
            cache,
            config.reference.clone(),
        ));
        let books = BookService::new(client.clone(), references.clone());
        let account = AccountService::new(client);
        // The consumer task ends once the portal drops the sender
        let (activity, _) = ActivityChannel::spawn(
            Arc::downgrade(&session),
            config.session.activity_debounce(),
        );

        Arc::new(Self {
            config,
            relay,
            clock,
            session,
            references,
            books,
            account,
            activity,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn relay(&self) -> &Arc<dyn Relay> {
        &self.relay
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn references(&self) -> &Arc<ReferenceService> {
        &self.references
    }

    // ========================================================================
    // Session
    // ========================================================================

    pub async fn restore(&self) -> SessionStatus {
        self.session.restore().await
    }

    pub async fn login(&self, username: &str, password: &str) -> LoginResult {
        self.session.login(username, password).await
    }

    pub fn logout(&self) -> Option<JoinHandle<()>> {
        self.session.logout()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Queue a user activity signal at the current time
    pub fn record_activity(&self) {
        if self.session.is_active() {
            self.activity.record(self.clock.now());
        }
    }

    fn require_session(&self) -> Result<AuthenticatedSession, PortalError> {
        self.session
            .current_session()
            .ok_or(PortalError::NotAuthenticated("no active session"))
    }

    // ========================================================================
    // Books
    // ========================================================================

    pub async fn get_books(&self, filter: &BookFilter) -> Result<Vec<Book>, PortalError> {
        self.require_session()?;
        self.books.get_books(filter).await
    }

    pub async fn get_book_details(&self, id: &str) -> Result<Book, PortalError> {
        self.require_session()?;
        self.books.get_book_details(id).await
    }

    pub async fn circulate(
        &self,
        command: Circulation,
        id: &str,
    ) -> Result<CirculationReceipt, PortalError> {
        self.require_session()?;
        self.books.circulate(command, id).await
    }

    pub async fn search_suggestions(&self, query: &str) -> Result<Vec<String>, PortalError> {
        self.require_session()?;
        self.books.search_suggestions(query).await
    }

    // ========================================================================
    // Reference data
    // ========================================================================

    pub async fn get_authors(&self) -> Result<Vec<ReferenceRecord>, PortalError> {
        self.require_session()?;
        Ok(self.references.get_authors().await)
    }

    pub async fn get_author(&self, id: &str) -> Result<ReferenceRecord, PortalError> {
        self.require_session()?;
        self.references.get_author(id).await
    }

    pub fn get_publications(&self) -> Result<Vec<ReferenceRecord>, PortalError> {
        self.require_session()?;
        Ok(self.books.get_publications())
    }

    pub async fn get_publication(&self, book_id: &str) -> Result<ReferenceRecord, PortalError> {
        self.require_session()?;
        self.references.get_publication(book_id).await
    }

    pub async fn get_categories(&self) -> Result<Vec<ReferenceRecord>, PortalError> {
        self.require_session()?;
        Ok(self.books.get_categories().await)
    }

    // ========================================================================
    // Account
    // ========================================================================

    pub async fn get_user_profile(&self) -> Result<UserProfile, PortalError> {
        let session = self.require_session()?;
        Ok(self.account.get_user_profile(&session).await)
    }

    pub async fn get_user_reservations(&self) -> Result<Vec<Reservation>, PortalError> {
        self.require_session()?;
        self.account.get_user_reservations().await
    }

    pub async fn get_user_borrowed_books(&self) -> Result<Vec<BorrowedBook>, PortalError> {
        self.require_session()?;
        self.account.get_user_borrowed_books().await
    }

    pub async fn check_user_credits(&self) -> Result<CreditBalance, PortalError> {
        self.require_session()?;
        self.account.check_user_credits().await
    }
}
