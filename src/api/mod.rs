//! API layer - HTTP handlers and routing
//!
//! This module contains the HTTP endpoints of the portal server:
//! - Proxy relay endpoints
//! - Login, logout and session status endpoints
//! - Book and reference-data endpoints
//! - Account endpoints

pub mod account;
pub mod auth;
pub mod books;
pub mod middleware;
pub mod proxy;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Routes that need an active session
    let protected_routes = Router::new()
        .merge(books::router())
        .merge(account::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_session,
        ));

    // Public routes
    Router::new()
        .route("/proxy", get(proxy::relay_get).post(proxy::relay_post))
        .merge(auth::router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            tracing::warn!("Invalid CORS origin '{}', allowing any origin", cors_origin);
            AllowOrigin::any()
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ReferenceConfig};
    use crate::portal::Portal;
    use crate::session::manager::{LOGIN_ENDPOINT, LOGOUT_ENDPOINT};
    use crate::session::{ManualClock, MemorySessionStore};
    use crate::testing::{Reply, StubRelay};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(stub: Arc<StubRelay>) -> (Router, AppState) {
        let config = Config {
            reference: ReferenceConfig {
                author_probe_ids: Vec::new(),
                ..ReferenceConfig::default()
            },
            ..Config::default()
        };
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        let portal = Portal::new(config, stub, Arc::new(MemorySessionStore::new()), clock);
        let state = AppState::new(portal);
        (build_router(state.clone(), "http://localhost:3000"), state)
    }

    fn login_stub() -> Arc<StubRelay> {
        let stub = Arc::new(StubRelay::new());
        stub.ok(
            LOGIN_ENDPOINT,
            json!({
                "current_user": { "uid": "28", "name": "Alana Rivers" },
                "csrf_token": "tok123",
                "logout_token": "bye123"
            }),
        );
        stub.ok(LOGOUT_ENDPOINT, json!({}));
        stub
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_proxy_get_requires_endpoint() {
        let (router, _) = app(Arc::new(StubRelay::new()));

        let (status, body) = call(&router, get("/api/proxy")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Endpoint parameter required" }));
    }

    #[tokio::test]
    async fn test_proxy_passes_backend_status_through() {
        let stub = Arc::new(StubRelay::new());
        stub.ok("/web/ok", json!({ "hello": "world" }));
        stub.route("/web/forbidden", Reply::Json(403, json!({ "message": "Access denied" })));
        let (router, _) = app(stub.clone());

        let (status, body) = call(&router, get("/api/proxy?endpoint=%2Fweb%2Fok")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["hello"], "world");
        assert_eq!(body["statusText"], "OK");

        let (status, body) = call(
            &router,
            post_json(
                "/api/proxy",
                json!({ "endpoint": "/web/forbidden", "method": "POST", "data": { "a": 1 } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(stub.calls()[1].data, Some(json!({ "a": 1 })));
    }

    #[tokio::test]
    async fn test_proxy_failures() {
        let stub = Arc::new(StubRelay::new());
        stub.route("/web/down", Reply::Offline);
        stub.route("/web/html", Reply::Html(502));
        let (router, _) = app(stub);

        let (status, body) = call(
            &router,
            post_json("/api/proxy", json!({ "endpoint": "/web/down" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Proxy request failed");
        assert_eq!(body["status"], 0);

        let (status, body) = call(&router, get("/api/proxy?endpoint=/web/html")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Server returned HTML instead of JSON");

        let (status, body) = call(
            &router,
            post_json("/api/proxy", json!({ "endpoint": "/web/x", "method": "DELETE" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported HTTP method: DELETE");
    }

    #[tokio::test]
    async fn test_protected_routes_need_session() {
        let stub = Arc::new(StubRelay::new());
        let (router, _) = app(stub.clone());

        for uri in ["/api/books", "/api/profile", "/api/categories", "/api/borrowed"] {
            let (status, body) = call(&router, get(uri)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        }
        assert_eq!(stub.total(), 0);
    }

    #[tokio::test]
    async fn test_login_session_logout_flow() {
        let (router, state) = app(login_stub());

        let (status, body) = call(
            &router,
            post_json("/api/auth/login", json!({ "username": "Alana Rivers", "password": "a" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let (status, body) = call(&router, get("/api/session")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "active");
        assert_eq!(body["remainingMs"], 600_000);
        assert_eq!(body["user"]["uid"], "28");

        // Profile endpoint is absent on the backend: placeholder
        let (status, body) = call(&router, get("/api/profile")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Alana Rivers");
        assert_eq!(body["max_credits"], 5);

        let logout = Request::post("/api/auth/logout").body(Body::empty()).unwrap();
        let (status, _) = call(&router, logout).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.portal.session().is_active());

        let (_, body) = call(&router, get("/api/session")).await;
        assert_eq!(body["state"], "anonymous");
    }

    #[tokio::test]
    async fn test_rejected_login_answers_401() {
        let stub = Arc::new(StubRelay::new());
        stub.route(LOGIN_ENDPOINT, Reply::Json(401, json!({})));
        let (router, _) = app(stub);

        let (status, body) = call(
            &router,
            post_json("/api/auth/login", json!({ "username": "Alana Rivers", "password": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid Credentials!!");
    }

    #[tokio::test]
    async fn test_books_endpoint_filters() {
        let stub = login_stub();
        stub.ok(
            crate::services::books::BOOKS_ENDPOINT,
            json!({ "data": [
                { "id": "b1", "attributes": { "title": "Dune", "isbn": "111" } },
                { "id": "b2", "attributes": { "title": "Emma", "isbn": "222" } }
            ]}),
        );
        let (router, _) = app(stub);
        call(
            &router,
            post_json("/api/auth/login", json!({ "username": "Alana Rivers", "password": "a" })),
        )
        .await;

        let (status, body) = call(&router, get("/api/books?search=222&search_field=isbn")).await;
        assert_eq!(status, StatusCode::OK);
        let books = body.as_array().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0]["title"], "Emma");
        assert_eq!(books[0]["status"], "available");
    }

    #[tokio::test]
    async fn test_backend_rejection_maps_to_401() {
        let stub = login_stub();
        stub.route("/web/user/borrowed?_format=json", Reply::Json(403, json!({})));
        let (router, _) = app(stub);
        call(
            &router,
            post_json("/api/auth/login", json!({ "username": "Alana Rivers", "password": "a" })),
        )
        .await;

        let (status, body) = call(&router, get("/api/borrowed")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Session expired. Please login again.");
    }
}
