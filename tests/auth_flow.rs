//! End-to-end auth flow tests against the in-memory store

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use khedma::api::{router, AppState};
use khedma::auth::{TokenConfig, TokenService};
use khedma::push::{NoopPushApi, PushConfig, PushGateway};
use khedma::storage::{MemoryStore, UserStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());

    let tokens = TokenService::new(&TokenConfig {
        access_secret: "test-secret".to_string(),
        refresh_secret: "test-secret-refresh".to_string(),
        access_ttl: 900,
        refresh_ttl: 604_800,
    });

    let push_config = PushConfig {
        url: "http://localhost:8000".to_string(),
        api_key: "test-key".to_string(),
        token_secret: "push-secret".to_string(),
        credential_ttl: Duration::from_secs(24 * 60 * 60),
    };
    let push = PushGateway::new(&push_config, Arc::new(NoopPushApi));

    let state = AppState {
        users: store.clone(),
        sessions: store.clone(),
        tokens,
        push,
    };

    TestApp {
        router: router(state),
        store,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with_token(router, method, uri, body, None).await
}

async fn send_with_token(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}

fn register_body(username: &str, role: &str) -> Value {
    json!({
        "username": username,
        "email": format!("{username}@example.com"),
        "password": "hunter2",
        "fullName": "Test Person",
        "role": role,
    })
}

async fn register(app: &TestApp, username: &str, role: &str) -> Value {
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/auth/register",
        Some(register_body(username, role)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_register_returns_full_bundle() {
    let app = test_app();
    let body = register(&app, "driver1", "driver").await;

    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["username"], "driver1");
    assert_eq!(body["user"]["role"], "driver");
    assert!(body["user"].get("passwordHash").is_none());
    assert!(body["user"].get("password_hash").is_none());
    assert!(body["accessToken"].is_string());
    assert!(body["refreshToken"].is_string());
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresIn"], 900);

    // Credential covers exactly what the role may use
    let channels: Vec<&str> = body["pushCredential"]["channels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap())
        .collect();
    let user_id = body["user"]["id"].as_str().unwrap();
    assert_eq!(
        channels,
        vec![
            format!("user:{user_id}"),
            "public:announcements".to_string(),
            "drivers:channel".to_string(),
            format!("driver:{user_id}:deliveries"),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_username_conflicts() {
    let app = test_app();
    register(&app, "dup", "customer").await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/auth/register",
        Some(register_body("dup", "customer")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_register_accepts_snake_case_body() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/auth/register",
        Some(json!({
            "username": "sbenali",
            "email": "sbenali@example.com",
            "password": "hunter2",
            "full_name": "Sara Ben Ali",
            "role": "customer",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    assert_eq!(body["success"], true);
    assert!(body["accessToken"].is_string());
}

#[tokio::test]
async fn test_missing_body_field_is_bad_request() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/auth/register",
        Some(json!({ "username": "incomplete" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let app = test_app();
    register(&app, "original", "customer").await;

    let mut body = register_body("someone-else", "customer");
    body["email"] = json!("original@example.com");

    let (status, body) = send(&app.router, "POST", "/api/auth/register", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_register_validation() {
    let app = test_app();
    let mut bad = register_body("ok", "customer");
    bad["email"] = json!("not-an-email");

    let (status, body) = send(&app.router, "POST", "/api/auth/register", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_login_success() {
    let app = test_app();
    register(&app, "alice", "dispatcher").await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/auth/login",
        Some(json!({ "username": "alice", "password": "hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["accessToken"].is_string());
    assert!(body["pushCredential"]["token"].is_string());
}

#[tokio::test]
async fn test_bad_credentials_are_indistinguishable() {
    let app = test_app();
    register(&app, "bob", "customer").await;

    let (wrong_pw_status, wrong_pw) = send(
        &app.router,
        "POST",
        "/api/auth/login",
        Some(json!({ "username": "bob", "password": "wrong" })),
    )
    .await;
    let (no_user_status, no_user) = send(
        &app.router,
        "POST",
        "/api/auth/login",
        Some(json!({ "username": "nobody", "password": "wrong" })),
    )
    .await;

    assert_eq!(wrong_pw_status, StatusCode::UNAUTHORIZED);
    assert_eq!(no_user_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_pw, no_user);
}

#[tokio::test]
async fn test_refresh_issues_new_access_token() {
    let app = test_app();
    let bundle = register(&app, "carol", "admin").await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/auth/refresh",
        Some(json!({ "refreshToken": bundle["refreshToken"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].is_string());
    // Refresh tokens are not rotated
    assert!(body.get("refreshToken").is_none());
}

#[tokio::test]
async fn test_access_token_rejected_as_refresh() {
    let app = test_app();
    let bundle = register(&app, "dave", "customer").await;

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/refresh",
        Some(json!({ "refreshToken": bundle["accessToken"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_after_deactivation_fails() {
    let app = test_app();
    let bundle = register(&app, "erin", "driver").await;
    let user_id: Uuid = bundle["user"]["id"].as_str().unwrap().parse().unwrap();

    app.store.deactivate(user_id).await.unwrap();

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/refresh",
        Some(json!({ "refreshToken": bundle["refreshToken"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_user_and_live_credential() {
    let app = test_app();
    let bundle = register(&app, "frank", "customer").await;
    let token = bundle["accessToken"].as_str().unwrap();

    let (status, body) =
        send_with_token(&app.router, "GET", "/api/auth/me", None, Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "frank");
    assert_eq!(
        body["pushCredential"]["token"],
        bundle["pushCredential"]["token"]
    );
}

#[tokio::test]
async fn test_me_without_token() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/api/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let app = test_app();
    let bundle = register(&app, "grace", "customer").await;
    let token = bundle["accessToken"].as_str().unwrap();

    let (first, _) =
        send_with_token(&app.router, "POST", "/api/auth/logout", None, Some(token)).await;
    let (second, _) =
        send_with_token(&app.router, "POST", "/api/auth/logout", None, Some(token)).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);

    // Session is gone after logout
    let (_, me) = send_with_token(&app.router, "GET", "/api/auth/me", None, Some(token)).await;
    assert_eq!(me["pushCredential"], Value::Null);
}

#[tokio::test]
async fn test_logout_without_token_still_succeeds() {
    let app = test_app();
    let (status, body) = send(&app.router, "POST", "/api/auth/logout", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
