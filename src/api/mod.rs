//! HTTP API
//!
//! Auth endpoints live under /api/auth. Every response carries a `success`
//! flag so clients can branch without inspecting status codes.

mod auth;
mod error;
mod validation;

pub use auth::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest};
pub use error::ApiError;

use crate::auth::TokenService;
use crate::push::PushGateway;
use crate::storage::{SessionStore, UserStore};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

/// Shared handler state
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub tokens: TokenService,
    pub push: PushGateway,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
