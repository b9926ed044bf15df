//! Control-surface tests driven through the assembled router.
#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use termgate_crypto::CredentialVault;
use tower::ServiceExt;

use crate::auth::{RateLimiter, TokenService};
use crate::profiles::ProfileStore;
use crate::ssh::ConnectionManager;
use crate::storage::GatewayDatabase;

use super::{AppState, build_router};

async fn test_app() -> Router {
    let db = GatewayDatabase::open_in_memory().await.unwrap();
    let vault = Arc::new(CredentialVault::new(b"server-test-secret").unwrap());
    let state = AppState {
        db: db.clone(),
        tokens: Arc::new(TokenService::new(b"server-test-secret", 7 * 24 * 3600)),
        profiles: ProfileStore::new(db, vault),
        manager: ConnectionManager::with_defaults(),
        assistant: None,
        global_limiter: Arc::new(RateLimiter::new(100, Duration::from_secs(900))),
        auth_limiter: Arc::new(RateLimiter::with_block(
            5,
            Duration::from_secs(900),
            Duration::from_secs(900),
        )),
        started_at: Instant::now(),
    };
    build_router(state, None)
}

/// One request through the router, with the connect-info extension the
/// rate limiters rely on.
async fn request(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let mut request = request;
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register_user(app: &Router, email: &str) -> String {
    let (status, body) = request(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({"email": email, "password": "Abcdef12", "name": "A"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app().await;
    let (status, body) = request(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn register_then_list_then_create_profile() {
    let app = test_app().await;
    let token = register_user(&app, "a@b.co").await;

    let (status, body) = request(&app, "GET", "/api/profiles", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!([]));

    let (status, body) = request(
        &app,
        "POST",
        "/api/profiles",
        Some(&token),
        Some(json!({
            "profile": {"name": "p1", "host": "10.0.0.1", "port": 22,
                        "username": "u", "authMethod": "password"},
            "credentials": {"password": "s3cret"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");

    let (status, body) = request(&app, "GET", "/api/profiles", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "p1");
    assert!(listed[0].get("credentials").is_none());
    assert!(!body.to_string().contains("s3cret"));
}

#[tokio::test]
async fn weak_password_is_rejected() {
    let app = test_app().await;
    let (status, body) = request(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({"email": "a@b.co", "password": "abcdefgh", "name": "A"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = test_app().await;
    register_user(&app, "a@b.co").await;

    let (status, _body) = request(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({"email": "A@B.CO", "password": "Abcdef12", "name": "A"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_and_verify_roundtrip() {
    let app = test_app().await;
    register_user(&app, "a@b.co").await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "a@b.co", "password": "Abcdef12"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();
    assert!(body["data"]["expiresAt"].as_i64().unwrap() > 0);
    assert!(body["data"]["user"]["lastLogin"].as_i64().is_some());

    let (status, body) = request(&app, "GET", "/api/auth/verify", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["email"], "a@b.co");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = test_app().await;
    register_user(&app, "a@b.co").await;

    let (status, _body) = request(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "a@b.co", "password": "Wrong1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = test_app().await;
    let (status, _) = request(&app, "GET", "/api/profiles", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(&app, "GET", "/api/auth/verify", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_attempts_are_rate_limited() {
    let app = test_app().await;
    register_user(&app, "a@b.co").await;

    // the register call above consumed one auth token; four failing
    // logins exhaust the bucket of five
    for _ in 0..4 {
        let (status, _) = request(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "a@b.co", "password": "Wrong1234"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = request(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "a@b.co", "password": "Wrong1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after = body["retryAfter"].as_u64().unwrap();
    assert!(retry_after > 0 && retry_after <= 900);
}

#[tokio::test]
async fn profile_update_and_delete_flow() {
    let app = test_app().await;
    let token = register_user(&app, "a@b.co").await;

    let (_, body) = request(
        &app,
        "POST",
        "/api/profiles",
        Some(&token),
        Some(json!({
            "profile": {"name": "p1", "host": "10.0.0.1", "port": 22,
                        "username": "u", "authMethod": "password"},
            "credentials": {"password": "pw"},
        })),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        "PUT",
        &format!("/api/profiles/{id}"),
        Some(&token),
        Some(json!({"host": "10.0.0.2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["host"], "10.0.0.2");

    let (status, _) = request(
        &app,
        "PUT",
        &format!("/api/profiles/{id}"),
        Some(&token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(
        &app,
        "DELETE",
        &format!("/api/profiles/{id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ok"], true);

    let (status, _) = request(
        &app,
        "DELETE",
        &format!("/api/profiles/{id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn another_users_profile_is_invisible() {
    let app = test_app().await;
    let token_a = register_user(&app, "a@b.co").await;
    let token_b = register_user(&app, "b@b.co").await;

    let (_, body) = request(
        &app,
        "POST",
        "/api/profiles",
        Some(&token_a),
        Some(json!({
            "profile": {"name": "p1", "host": "10.0.0.1", "port": 22,
                        "username": "u", "authMethod": "password"},
            "credentials": {"password": "pw"},
        })),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        "DELETE",
        &format!("/api/profiles/{id}"),
        Some(&token_b),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_profile_fields_are_bad_requests() {
    let app = test_app().await;
    let token = register_user(&app, "a@b.co").await;

    let (status, _) = request(
        &app,
        "POST",
        "/api/profiles",
        Some(&token),
        Some(json!({
            "profile": {"name": "p1", "host": "not a host!", "port": 22,
                        "username": "u", "authMethod": "password"},
            "credentials": {"password": "pw"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let app = test_app().await;
    let (status, _) = request(&app, "GET", "/api/nonsense", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
