//! Push gateway integration
//!
//! The real-time push layer is an external process. This module issues the
//! signed connection credentials clients hand to it, and drives its HTTP API
//! for server-side publishes and forced disconnects. Push failures never
//! fail the request that triggered them; callers log and move on.

use crate::auth::ChannelGrant;
use crate::channels::Channel;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push api request failed: {0}")]
    Request(String),

    #[error("push api returned status {0}")]
    Status(u16),

    #[error("failed to sign push credential: {0}")]
    Signing(String),
}

/// Push gateway configuration
#[derive(Clone)]
pub struct PushConfig {
    /// Base URL of the push gateway HTTP API
    pub url: String,
    /// API key for server-to-gateway calls
    pub api_key: String,
    /// Secret the gateway verifies connection credentials with
    pub token_secret: String,
    /// Credential lifetime
    pub credential_ttl: Duration,
}

impl PushConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let url = std::env::var("PUSH_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let api_key = std::env::var("PUSH_API_KEY")
            .map_err(|_| anyhow::anyhow!("PUSH_API_KEY must be set"))?;
        let token_secret = std::env::var("PUSH_TOKEN_SECRET")
            .map_err(|_| anyhow::anyhow!("PUSH_TOKEN_SECRET must be set"))?;
        let credential_ttl = std::env::var("PUSH_CREDENTIAL_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(24 * 60 * 60));

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            api_key,
            token_secret,
            credential_ttl,
        })
    }
}

impl std::fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("token_secret", &"<redacted>")
            .field("credential_ttl", &self.credential_ttl)
            .finish()
    }
}

/// Claims embedded in a push connection credential
#[derive(Debug, Serialize, Deserialize)]
struct CredentialClaims {
    sub: String,
    channels: Vec<String>,
    iat: u64,
    exp: u64,
}

/// A signed connection credential plus the channel list it covers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushCredential {
    pub token: String,
    pub channels: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// HTTP API surface of the push gateway
#[async_trait]
pub trait PushApi: Send + Sync {
    async fn publish(&self, channel: &str, data: serde_json::Value) -> Result<(), PushError>;
    async fn disconnect(&self, user_id: Uuid) -> Result<(), PushError>;
}

/// Real gateway client over HTTP
pub struct HttpPushApi {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpPushApi {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<(), PushError> {
        let body = json!({ "method": method, "params": params });

        let resp = self
            .http
            .post(format!("{}/api", self.url))
            .header("Authorization", format!("apikey {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PushError::Status(resp.status().as_u16()));
        }

        Ok(())
    }
}

#[async_trait]
impl PushApi for HttpPushApi {
    async fn publish(&self, channel: &str, data: serde_json::Value) -> Result<(), PushError> {
        self.call("publish", json!({ "channel": channel, "data": data }))
            .await
    }

    async fn disconnect(&self, user_id: Uuid) -> Result<(), PushError> {
        self.call("disconnect", json!({ "user": user_id.to_string() }))
            .await
    }
}

/// No-op gateway for tests and offline development
#[derive(Default)]
pub struct NoopPushApi;

#[async_trait]
impl PushApi for NoopPushApi {
    async fn publish(&self, channel: &str, _data: serde_json::Value) -> Result<(), PushError> {
        debug!(channel, "Push publish skipped (noop gateway)");
        Ok(())
    }

    async fn disconnect(&self, user_id: Uuid) -> Result<(), PushError> {
        debug!(%user_id, "Push disconnect skipped (noop gateway)");
        Ok(())
    }
}

/// Issues credentials and talks to the push gateway
#[derive(Clone)]
pub struct PushGateway {
    api: Arc<dyn PushApi>,
    signing_key: Arc<EncodingKey>,
    credential_ttl: Duration,
}

impl PushGateway {
    pub fn new(config: &PushConfig, api: Arc<dyn PushApi>) -> Self {
        Self {
            api,
            signing_key: Arc::new(EncodingKey::from_secret(config.token_secret.as_bytes())),
            credential_ttl: config.credential_ttl,
        }
    }

    /// Sign a connection credential scoped to the given grants
    pub fn issue_credential(
        &self,
        user_id: Uuid,
        grants: &[ChannelGrant],
    ) -> Result<PushCredential, PushError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let exp = now + self.credential_ttl.as_secs();

        let channels: Vec<String> = grants
            .iter()
            .map(|g| g.channel.as_str().to_string())
            .collect();

        let claims = CredentialClaims {
            sub: user_id.to_string(),
            channels: channels.clone(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.signing_key)
            .map_err(|e| PushError::Signing(e.to_string()))?;

        let expires_at = Utc
            .timestamp_opt(exp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(PushCredential {
            token,
            channels,
            expires_at,
        })
    }

    /// Publish a payload to a channel
    pub async fn publish(&self, channel: &Channel, data: serde_json::Value) -> Result<(), PushError> {
        self.api.publish(channel.as_str(), data).await
    }

    /// Push a notification event to a user's private channel
    pub async fn send_notification(
        &self,
        user_id: Uuid,
        kind: &str,
        title: &str,
        message: &str,
        data: serde_json::Value,
    ) -> Result<(), PushError> {
        let channel = Channel::user(&user_id.to_string());
        let payload = json!({
            "type": kind,
            "title": title,
            "message": message,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.api.publish(channel.as_str(), payload).await
    }

    /// Force-disconnect all of a user's live push connections
    pub async fn disconnect(&self, user_id: Uuid) -> Result<(), PushError> {
        self.api.disconnect(user_id).await
    }

    /// Log and swallow a push failure; the triggering request must not fail
    pub fn tolerate(result: Result<(), PushError>, context: &str) {
        if let Err(e) = result {
            warn!(error = %e, context, "Push gateway call failed, continuing");
        }
    }
}
