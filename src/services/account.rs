//! Account operations for the logged-in user

use super::client::{decode, BackendClient};
use crate::error::PortalError;
use crate::models::{AuthenticatedSession, BorrowedBook, CreditBalance, Reservation, UserProfile};
use crate::relay::RelayRequest;

pub const PROFILE_ENDPOINT: &str = "/web/user/profile?_format=json";
pub const RESERVATIONS_ENDPOINT: &str = "/web/user/reservations?_format=json";
pub const BORROWED_ENDPOINT: &str = "/web/user/borrowed?_format=json";
pub const CREDITS_ENDPOINT: &str = "/web/user/credits?_format=json";

/// Account service
pub struct AccountService {
    client: BackendClient,
}

impl AccountService {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    async fn get(&self, endpoint: &str) -> Result<serde_json::Value, PortalError> {
        self.client.fetch_authenticated(RelayRequest::get(endpoint)).await
    }

    /// Profile of the session's user
    ///
    /// Falls back to a placeholder built from the session whenever the
    /// backend cannot provide one.
    pub async fn get_user_profile(&self, session: &AuthenticatedSession) -> UserProfile {
        let fetched = match self.get(PROFILE_ENDPOINT).await {
            Ok(value) => decode::<UserProfile>(value, "profile"),
            Err(e) => Err(e),
        };
        fetched.unwrap_or_else(|e| {
            tracing::warn!(
                user = %session.user_id,
                "Profile unavailable, using placeholder: {}",
                e
            );
            UserProfile::placeholder(session.user_id.as_str(), session.display_name.as_str())
        })
    }

    pub async fn get_user_reservations(&self) -> Result<Vec<Reservation>, PortalError> {
        decode(self.get(RESERVATIONS_ENDPOINT).await?, "reservations")
    }

    pub async fn get_user_borrowed_books(&self) -> Result<Vec<BorrowedBook>, PortalError> {
        decode(self.get(BORROWED_ENDPOINT).await?, "borrowed books")
    }

    pub async fn check_user_credits(&self) -> Result<CreditBalance, PortalError> {
        decode(self.get(CREDITS_ENDPOINT).await?, "credits")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReservationStatus, UserRole};
    use crate::session::{CredentialVault, Credentials};
    use crate::testing::{Reply, StubRelay};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    fn service(stub: Arc<StubRelay>) -> AccountService {
        let vault = Arc::new(CredentialVault::new());
        vault.set(Credentials {
            username: "Alana Rivers".into(),
            password: Some("a".into()),
            csrf_token: "tok123".into(),
            logout_token: None,
        });
        AccountService::new(BackendClient::new(stub, vault))
    }

    fn session() -> AuthenticatedSession {
        AuthenticatedSession {
            session_id: "session_1_abcdefghi".into(),
            user_id: "28".into(),
            display_name: "Alana Rivers".into(),
            csrf_token: "tok123".into(),
            login_timestamp: Utc::now(),
            last_activity_timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_profile_from_backend() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(
            PROFILE_ENDPOINT,
            json!({
                "uid": "28",
                "name": "Alana Rivers",
                "email": "alana@example.com",
                "role": "faculty",
                "credits": 4,
                "max_credits": 10,
                "borrowed_books_count": 1,
                "active_reservations_count": 0
            }),
        );

        let profile = service(stub).get_user_profile(&session()).await;
        assert_eq!(profile.role, UserRole::Faculty);
        assert_eq!(profile.max_credits, 10);
        assert_eq!(profile.email.as_deref(), Some("alana@example.com"));
    }

    #[tokio::test]
    async fn test_profile_falls_back_to_placeholder() {
        for reply in [
            Reply::Json(404, json!({})),
            Reply::Offline,
            Reply::Json(200, json!({ "unexpected": true })),
        ] {
            let stub = Arc::new(StubRelay::new());
            stub.route(PROFILE_ENDPOINT, reply);

            let profile = service(stub).get_user_profile(&session()).await;
            assert_eq!(profile, UserProfile::placeholder("28", "Alana Rivers"));
            assert_eq!(profile.credits, 3);
            assert_eq!(profile.max_credits, 5);
        }
    }

    #[tokio::test]
    async fn test_reservations_pass_through() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(
            RESERVATIONS_ENDPOINT,
            json!([{
                "id": "r1",
                "book_id": "b1",
                "book_title": "Dune",
                "reserved_at": "2024-05-01",
                "expires_at": "2024-05-08",
                "status": "active"
            }]),
        );

        let reservations = service(stub).get_user_reservations().await.unwrap();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].status, ReservationStatus::Active);
    }

    #[tokio::test]
    async fn test_rejected_session_is_reported() {
        let stub = Arc::new(StubRelay::new());
        stub.route(BORROWED_ENDPOINT, Reply::Json(403, json!({ "message": "Forbidden" })));

        let err = service(stub).get_user_borrowed_books().await.unwrap_err();
        assert_eq!(
            err,
            PortalError::Authentication("Session expired. Please login again.".into())
        );
    }

    #[tokio::test]
    async fn test_credits() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(
            CREDITS_ENDPOINT,
            json!({ "available_credits": 2, "max_credits": 5, "used_credits": 3 }),
        );

        let credits = service(stub).check_user_credits().await.unwrap();
        assert_eq!(credits.available_credits, 2);
        assert_eq!(credits.used_credits, 3);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_validation_error() {
        let stub = Arc::new(StubRelay::new());
        stub.ok(CREDITS_ENDPOINT, json!({ "available_credits": "lots" }));

        let err = service(stub).check_user_credits().await.unwrap_err();
        assert!(matches!(
            err,
            PortalError::Validation(m) if m.starts_with("Unexpected credits payload")
        ));
    }
}
