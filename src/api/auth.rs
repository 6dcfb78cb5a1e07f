//! Auth endpoint handlers

use crate::api::error::{ApiError, ApiJson};
use crate::api::{validation, AppState};
use crate::auth::{channels_for, hash_password, verify_password, Role};
use crate::push::{PushCredential, PushGateway};
use crate::storage::{NewUser, User};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    // The web form still posts snake_case
    #[serde(alias = "full_name")]
    pub full_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
}

/// Full credential bundle returned by register and login
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub push_credential: PushCredential,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// Issue the full token bundle for a user and record the live push session
async fn issue_bundle(state: &AppState, user: User) -> Result<AuthResponse, ApiError> {
    let access = state
        .tokens
        .issue_access(user.id, &user.username, &user.email, user.role)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let refresh = state
        .tokens
        .issue_refresh(user.id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let grants = channels_for(&user.id.to_string(), user.role);
    let credential = state
        .push
        .issue_credential(user.id, &grants)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    // Session persistence is best effort: the bundle is still valid, the
    // client just cannot restore the credential from /me later
    if let Err(e) = state
        .sessions
        .put(
            user.id,
            &credential.token,
            &credential.channels,
            credential.expires_at,
        )
        .await
    {
        tracing::warn!(error = %e, user_id = %user.id, "Failed to persist push session");
    }

    Ok(AuthResponse {
        success: true,
        user,
        access_token: access,
        refresh_token: refresh,
        push_credential: credential,
        token_type: "Bearer",
        expires_in: state.tokens.access_ttl(),
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    validation::validate_register(&req)?;

    let password_hash =
        hash_password(&req.password).map_err(|e| ApiError::Internal(e.to_string()))?;

    let user = state
        .users
        .create(NewUser {
            username: req.username,
            email: req.email,
            password_hash,
            full_name: req.full_name,
            role: req.role.unwrap_or(Role::Customer),
            department: req.department,
            phone: req.phone,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, role = %user.role, "User registered");

    let bundle = issue_bundle(&state, user).await?;

    PushGateway::tolerate(
        state
            .push
            .send_notification(
                bundle.user.id,
                "system",
                "Welcome",
                &format!("Welcome to Khedma, {}!", bundle.user.full_name),
                json!({}),
            )
            .await,
        "welcome notification",
    );

    Ok((StatusCode::CREATED, Json(bundle)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    validation::validate_login(&req)?;

    // Unknown user, deactivated user, and wrong password are indistinguishable
    let user = state
        .users
        .find_by_username(&req.username)
        .await?
        .filter(|u| u.is_active)
        .filter(|u| verify_password(&req.password, &u.password_hash))
        .ok_or(ApiError::InvalidCredentials)?;

    info!(user_id = %user.id, username = %user.username, "User logged in");

    let bundle = issue_bundle(&state, user).await?;

    PushGateway::tolerate(
        state
            .push
            .send_notification(
                bundle.user.id,
                "system",
                "New login",
                "Your account was just signed in to",
                json!({}),
            )
            .await,
        "login notification",
    );

    Ok(Json(bundle))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let claims = state.tokens.verify_refresh(&req.refresh_token)?;

    // The refresh token itself is not rotated; only a new access token is cut
    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or(ApiError::InvalidToken)?;

    let access = state
        .tokens
        .issue_access(user.id, &user.username, &user.email, user.role)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "accessToken": access,
        "tokenType": "Bearer",
        "expiresIn": state.tokens.access_ttl(),
    })))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let claims = state.tokens.verify_access(bearer_token(&headers)?)?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or(ApiError::InvalidToken)?;

    // Returns the live credential if one exists; clients reconnect with it
    let session = state.sessions.get_live(user.id).await?;
    let push_credential = session.map(|s| {
        json!({
            "token": s.token,
            "channels": s.channels,
            "expiresAt": s.expires_at,
        })
    });

    Ok(Json(json!({
        "success": true,
        "user": user,
        "pushCredential": push_credential,
    })))
}

/// Best-effort teardown; always succeeds so clients can clear local state
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    if let Some(user_id) = authenticated_user(&state, &headers) {
        if let Err(e) = state.sessions.revoke(user_id).await {
            tracing::warn!(error = %e, %user_id, "Failed to revoke push session on logout");
        }
        PushGateway::tolerate(state.push.disconnect(user_id).await, "logout disconnect");
        info!(%user_id, "User logged out");
    }

    Json(json!({ "success": true }))
}

fn authenticated_user(state: &AppState, headers: &HeaderMap) -> Option<Uuid> {
    let token = bearer_token(headers).ok()?;
    let claims = state.tokens.verify_access(token).ok()?;
    Some(claims.sub)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::InvalidToken)
}
