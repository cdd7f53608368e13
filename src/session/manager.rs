//! Session state machine
//!
//! States: `Anonymous` -> `Authenticating` -> `Active` -> (`Expired` | logged out)
//! -> `Anonymous`. `Warning` is a projection of `Active` when less than the
//! warning threshold remains; it is never stored.
//!
//! Two periodic checks guard the session while it is active:
//! - `tick()` (every second) expires it once its maximum age is reached
//! - `reconcile()` (every 30 seconds) adopts activity recorded in the
//!   persisted state and re-checks both age and idle time
//!
//! Every way out of `Active` goes through one teardown: credentials, the
//! reference cache and the persisted state are cleared synchronously, and a
//! best-effort server logout runs in the background.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use super::clock::Clock;
use super::credentials::Credentials;
use super::login::{self, LoginFailure};
use super::store::{
    SessionStore, StoredUser, CSRF_TOKEN_KEY, LOGOUT_TOKEN_KEY, SESSION_ID_KEY, USER_KEY,
};
use super::timers::SessionTimers;
use crate::cache::ReferenceCache;
use crate::config::SessionConfig;
use crate::models::{
    AuthenticatedSession, LoginRequest, LoginResponse, LoginResult, SessionState, SessionStatus,
    SessionUser,
};
use crate::relay::RelayRequest;
use crate::services::client::{BackendClient, JSON};

pub const LOGIN_ENDPOINT: &str = "/web/user/login?_format=json";
pub const LOGOUT_ENDPOINT: &str = "/web/user/logout";

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Anonymous,
    Authenticating,
    Active(AuthenticatedSession),
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    /// Set by expiry, reset by login and explicit logout
    expired: bool,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Logout,
    Expired,
    /// A new login took its place
    Replaced,
}

impl EndReason {
    fn as_str(self) -> &'static str {
        match self {
            EndReason::Logout => "logout",
            EndReason::Expired => "expired",
            EndReason::Replaced => "replaced",
        }
    }
}

/// Owner of the authenticated session
pub struct SessionManager {
    settings: SessionConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SessionStore>,
    client: BackendClient,
    cache: Arc<ReferenceCache>,
    inner: Mutex<Inner>,
    timers: Mutex<Option<SessionTimers>>,
}

impl SessionManager {
    pub fn new(
        settings: SessionConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SessionStore>,
        client: BackendClient,
        cache: Arc<ReferenceCache>,
    ) -> Self {
        Self {
            settings,
            clock,
            store,
            client,
            cache,
            inner: Mutex::new(Inner {
                phase: Phase::Anonymous,
                expired: false,
            }),
            timers: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.settings
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Current session, if one is active
    pub fn current_session(&self) -> Option<AuthenticatedSession> {
        match &self.lock().phase {
            Phase::Active(session) => Some(session.clone()),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.lock().phase, Phase::Active(_))
    }

    pub fn is_expired(&self) -> bool {
        self.lock().expired
    }

    /// Whether the tick and reconciliation tasks are running
    pub fn timers_running(&self) -> bool {
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|timers| !timers.is_finished())
            .unwrap_or(false)
    }

    /// Milliseconds before the session reaches its maximum age, 0 when inactive
    pub fn session_time_remaining(&self) -> i64 {
        let now = self.clock.now();
        match &self.lock().phase {
            Phase::Active(session) => session
                .remaining_at(now, self.settings.duration())
                .num_milliseconds()
                .max(0),
            _ => 0,
        }
    }

    /// Snapshot for the UI layer
    pub fn status(&self) -> SessionStatus {
        let now = self.clock.now();
        let inner = self.lock();
        match &inner.phase {
            Phase::Active(session) => {
                let remaining = session
                    .remaining_at(now, self.settings.duration())
                    .num_milliseconds()
                    .max(0);
                let warning =
                    remaining > 0 && remaining <= self.settings.warning().num_milliseconds();
                SessionStatus {
                    state: if warning { SessionState::Warning } else { SessionState::Active },
                    remaining_ms: remaining,
                    warning,
                    expired: false,
                    user: Some(SessionUser::from(session)),
                }
            }
            phase => SessionStatus {
                state: match phase {
                    Phase::Authenticating => SessionState::Authenticating,
                    _ if inner.expired => SessionState::Expired,
                    _ => SessionState::Anonymous,
                },
                remaining_ms: 0,
                warning: false,
                expired: inner.expired,
                user: None,
            },
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Resume a persisted session at startup
    ///
    /// Needs both the stored user and the CSRF token. A stored session that
    /// is corrupt or no longer valid is cleared.
    pub async fn restore(self: &Arc<Self>) -> SessionStatus {
        let stored = (self.store.get(USER_KEY), self.store.get(CSRF_TOKEN_KEY));
        let (raw_user, csrf_token) = match stored {
            (Some(user), Some(token)) if !token.is_empty() => (user, token),
            _ => return self.status(),
        };

        let stored = match serde_json::from_str::<StoredUser>(&raw_user) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Discarding corrupt persisted session: {}", e);
                self.store.clear_session();
                return self.status();
            }
        };

        let (Some(login_timestamp), Some(last_activity_timestamp)) =
            (from_millis(stored.login_time), from_millis(stored.last_activity))
        else {
            tracing::warn!("Discarding persisted session with invalid timestamps");
            self.store.clear_session();
            return self.status();
        };

        let session = AuthenticatedSession {
            session_id: stored.session_id,
            user_id: stored.uid,
            display_name: stored.name.clone(),
            csrf_token: csrf_token.clone(),
            login_timestamp,
            last_activity_timestamp,
        };

        if !session.is_valid_at(self.clock.now(), self.settings.duration()) {
            tracing::info!(session_id = %session.session_id, "Persisted session expired, clearing");
            self.store.clear_session();
            return self.status();
        }

        self.client.vault().set(Credentials {
            username: stored.name,
            password: None,
            csrf_token,
            logout_token: self.store.get(LOGOUT_TOKEN_KEY),
        });
        tracing::info!(
            session_id = %session.session_id,
            user = %session.user_id,
            "Session restored"
        );
        self.lock().phase = Phase::Active(session);
        self.start_timers();

        if !self.verify_with_server().await {
            tracing::info!("Server rejected restored session");
            self.teardown(EndReason::Logout);
        }
        self.status()
    }

    /// Whether the backend still accepts the session
    ///
    /// Holding a CSRF token is taken as valid; only an explicit rejection
    /// ends a restored session.
    async fn verify_with_server(&self) -> bool {
        let valid = self.client.vault().has_csrf_token();
        if !valid {
            tracing::debug!("No CSRF token available for session verification");
        }
        valid
    }

    /// Log in; never fails outward
    pub async fn login(self: &Arc<Self>, username: &str, password: &str) -> LoginResult {
        if self.is_active() {
            self.teardown(EndReason::Replaced);
        }
        self.lock().phase = Phase::Authenticating;
        tracing::info!(user = %username, "Login attempt");

        let body = serde_json::to_value(LoginRequest {
            name: username.to_string(),
            pass: password.to_string(),
        })
        .unwrap_or_default();
        let request = RelayRequest::post(LOGIN_ENDPOINT)
            .header("Content-Type", JSON)
            .header("Accept", JSON)
            .json(body);

        let accepted = match self.client.fetch(request).await {
            Ok(value) => {
                login::validate(serde_json::from_value::<LoginResponse>(value).unwrap_or_default())
            }
            Err(err) => Err(LoginFailure::classify(&err)),
        };

        let accepted = match accepted {
            Ok(accepted) => accepted,
            Err(failure) => {
                tracing::warn!(user = %username, ?failure, "Login failed");
                self.lock().phase = Phase::Anonymous;
                return LoginResult::failed(failure.user_message());
            }
        };

        let now = self.clock.now();
        let session = AuthenticatedSession {
            session_id: login::generate_session_id(now.timestamp_millis()),
            user_id: accepted.uid,
            display_name: accepted.name,
            csrf_token: accepted.csrf_token.clone(),
            login_timestamp: now,
            last_activity_timestamp: now,
        };

        self.client.vault().set(Credentials {
            username: username.to_string(),
            password: Some(password.to_string()),
            csrf_token: accepted.csrf_token,
            logout_token: accepted.logout_token.clone(),
        });
        self.persist(&session, accepted.logout_token.as_deref());

        tracing::info!(
            session_id = %session.session_id,
            user = %session.user_id,
            "Login successful"
        );
        {
            let mut inner = self.lock();
            inner.phase = Phase::Active(session);
            inner.expired = false;
        }
        self.start_timers();
        LoginResult::ok()
    }

    /// Explicit logout
    ///
    /// Local state is cleared before this returns. The returned handle
    /// tracks the background server logout, when one was started.
    pub fn logout(&self) -> Option<JoinHandle<()>> {
        let handle = self.teardown(EndReason::Logout);
        self.lock().expired = false;
        handle
    }

    /// Per-second check of the session's maximum age
    pub fn tick(&self) -> SessionStatus {
        let now = self.clock.now();
        let expired = match &self.lock().phase {
            Phase::Active(session) => {
                session.remaining_at(now, self.settings.duration()).num_milliseconds() <= 0
            }
            _ => false,
        };
        if expired {
            self.teardown(EndReason::Expired);
        }
        self.status()
    }

    /// Periodic activity reconciliation and validity check
    pub fn reconcile(&self) -> SessionStatus {
        let now = self.clock.now();
        let persisted = self
            .store
            .get(USER_KEY)
            .and_then(|raw| serde_json::from_str::<StoredUser>(&raw).ok());

        let valid = {
            let mut inner = self.lock();
            match &mut inner.phase {
                Phase::Active(session) => {
                    if let Some(stored) = persisted.filter(|s| s.session_id == session.session_id) {
                        if let Some(persisted_at) = from_millis(stored.last_activity) {
                            let drift = (persisted_at - session.last_activity_timestamp).abs();
                            if drift > self.settings.activity_sync_threshold() {
                                tracing::debug!(
                                    drift_ms = drift.num_milliseconds(),
                                    "Adopting persisted activity"
                                );
                                session.last_activity_timestamp = persisted_at;
                            }
                        }
                    }
                    Some(session.is_valid_at(now, self.settings.duration()))
                }
                _ => None,
            }
        };

        if valid == Some(false) {
            self.teardown(EndReason::Expired);
        }
        self.status()
    }

    /// Persist user activity without touching in-memory state
    ///
    /// The next `reconcile()` picks it up.
    pub fn record_activity(&self, at: DateTime<Utc>) {
        let Some(session) = self.current_session() else {
            return;
        };
        let mut stored = self
            .store
            .get(USER_KEY)
            .and_then(|raw| serde_json::from_str::<StoredUser>(&raw).ok())
            .filter(|stored| stored.session_id == session.session_id)
            .unwrap_or_else(|| stored_user(&session));
        stored.last_activity = at.timestamp_millis();

        match serde_json::to_string(&stored) {
            Ok(json) => {
                if let Err(e) = self.store.set(USER_KEY, &json) {
                    tracing::warn!("Failed to persist activity: {:#}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to encode activity: {}", e),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn persist(&self, session: &AuthenticatedSession, logout_token: Option<&str>) {
        let user = match serde_json::to_string(&stored_user(session)) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to encode session: {}", e);
                return;
            }
        };

        let mut writes = vec![
            self.store.set(USER_KEY, &user),
            self.store.set(CSRF_TOKEN_KEY, &session.csrf_token),
            self.store.set(SESSION_ID_KEY, &session.session_id),
        ];
        writes.push(match logout_token {
            Some(token) => self.store.set(LOGOUT_TOKEN_KEY, token),
            None => self.store.remove(LOGOUT_TOKEN_KEY),
        });
        for result in writes {
            if let Err(e) = result {
                tracing::warn!("Failed to persist session: {:#}", e);
            }
        }
    }

    fn start_timers(self: &Arc<Self>) {
        let timers = SessionTimers::start(self);
        *self.timers.lock().unwrap_or_else(|e| e.into_inner()) = Some(timers);
    }

    /// Shared exit from `Active`
    fn teardown(&self, reason: EndReason) -> Option<JoinHandle<()>> {
        let previous = {
            let mut inner = self.lock();
            if reason == EndReason::Expired {
                inner.expired = true;
            }
            std::mem::replace(&mut inner.phase, Phase::Anonymous)
        };

        let logout_token = self
            .client
            .vault()
            .take()
            .and_then(|credentials| credentials.logout_token)
            .or_else(|| self.store.get(LOGOUT_TOKEN_KEY));
        self.cache.clear();
        self.store.clear_session();
        // Dropping the timers aborts their tasks
        drop(self.timers.lock().unwrap_or_else(|e| e.into_inner()).take());

        if let Phase::Active(session) = &previous {
            tracing::info!(
                session_id = %session.session_id,
                reason = reason.as_str(),
                "Session ended"
            );
        }

        logout_token.and_then(|_| self.spawn_server_logout())
    }

    fn spawn_server_logout(&self) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime available, skipping server logout");
            return None;
        };
        let relay = Arc::clone(self.client.relay());
        Some(runtime.spawn(async move {
            let request = RelayRequest::post(LOGOUT_ENDPOINT)
                .header("Content-Type", JSON)
                .json(serde_json::json!({}));
            match relay.fetch(request).await {
                Ok(_) => tracing::info!("Server logout acknowledged"),
                Err(e) => tracing::warn!("Server logout failed, local logout stands: {}", e),
            }
        }))
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn stored_user(session: &AuthenticatedSession) -> StoredUser {
    StoredUser {
        uid: session.user_id.clone(),
        name: session.display_name.clone(),
        session_id: session.session_id.clone(),
        login_time: session.login_timestamp.timestamp_millis(),
        last_activity: session.last_activity_timestamp.timestamp_millis(),
    }
}
