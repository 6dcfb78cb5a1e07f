//! Token issuance and verification
//!
//! Two token kinds, both compact HS256 JWTs:
//! - Access: short-lived, carries identity claims (sub, username, email, role)
//! - Refresh: longer-lived, carries only {sub, kind="refresh"}
//!
//! The refresh secret differs from the access secret, so a leaked access
//! secret cannot mint refresh tokens. Verification is pure: signature +
//! expiry + kind, no storage lookup, zero clock leeway.

use crate::auth::Role;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Marker value for the refresh token `kind` claim
const REFRESH_KIND: &str = "refresh";

/// Why a token failed verification.
///
/// Callers that answer HTTP requests must collapse all variants into a
/// single "invalid token" response; the distinction exists for logs only.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("wrong token kind")]
    WrongKind,

    #[error("malformed token: {0}")]
    Malformed(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    /// Issued at (unix seconds)
    pub iat: u64,
    /// Expiry (unix seconds)
    pub exp: u64,
}

/// Claims carried by a refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// User ID
    pub sub: Uuid,
    /// Always "refresh"; rejects access tokens presented as refresh tokens
    pub kind: String,
    pub iat: u64,
    pub exp: u64,
}

/// Token service configuration
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    /// Access token lifetime in seconds (default: 900)
    pub access_ttl: u64,
    /// Refresh token lifetime in seconds (default: 604800)
    pub refresh_ttl: u64,
}

impl TokenConfig {
    /// Read configuration from the environment.
    ///
    /// `JWT_SECRET` is required; `JWT_REFRESH_SECRET` defaults to the
    /// access secret with a fixed suffix, matching single-secret deploys.
    pub fn from_env() -> anyhow::Result<Self> {
        let access_secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

        let refresh_secret = std::env::var("JWT_REFRESH_SECRET")
            .unwrap_or_else(|_| format!("{access_secret}-refresh"));

        let access_ttl = std::env::var("JWT_ACCESS_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(900);

        let refresh_ttl = std::env::var("JWT_REFRESH_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(604_800);

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
        })
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Issues and verifies access/refresh tokens
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: u64,
    refresh_ttl: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Strict validation: exp enforced at the signed instant, no leeway
fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Issue an access token for a user
    pub fn issue_access(
        &self,
        user_id: Uuid,
        username: &str,
        email: &str,
        role: Role,
    ) -> Result<String, TokenError> {
        let now = unix_now();
        let claims = AccessClaims {
            sub: user_id,
            username: username.to_string(),
            email: email.to_string(),
            role,
            iat: now,
            exp: now + self.access_ttl,
        };

        let token = encode(&Header::default(), &claims, &self.access_encoding)?;
        Ok(token)
    }

    /// Issue a refresh token for a user
    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String, TokenError> {
        let now = unix_now();
        let claims = RefreshClaims {
            sub: user_id,
            kind: REFRESH_KIND.to_string(),
            iat: now,
            exp: now + self.refresh_ttl,
        };

        let token = encode(&Header::default(), &claims, &self.refresh_encoding)?;
        Ok(token)
    }

    /// Verify an access token and return its claims
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &strict_validation())?;
        Ok(data.claims)
    }

    /// Verify a refresh token (signature, expiry, kind) and return its claims
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let data = decode::<RefreshClaims>(token, &self.refresh_decoding, &strict_validation())?;

        if data.claims.kind != REFRESH_KIND {
            return Err(TokenError::WrongKind);
        }

        Ok(data.claims)
    }

    /// Access token lifetime in seconds
    pub fn access_ttl(&self) -> u64 {
        self.access_ttl
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_ttl(&self) -> u64 {
        self.refresh_ttl
    }
}
