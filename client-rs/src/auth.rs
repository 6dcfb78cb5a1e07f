//! Auth session management
//!
//! Owns the access/refresh/push credentials for one signed-in user. Refreshes
//! are single-flight: concurrent callers that find the access token stale
//! wait on one network call instead of racing their own. Any refresh failure
//! clears all credentials; the session never limps along half-authenticated.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Seconds of remaining validity below which a token counts as stale
const FRESHNESS_MARGIN: u64 = 10;

/// The signed-in user as the API reports it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(alias = "full_name")]
    pub full_name: String,
    pub role: String,
}

/// Signed push gateway credential plus the channels it covers
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushCredential {
    pub token: String,
    pub channels: Vec<String>,
}

/// Everything a successful login returns
#[derive(Debug, Clone)]
pub struct LoginBundle {
    pub user: UserInfo,
    pub access_token: String,
    pub refresh_token: String,
    pub push_credential: PushCredential,
    pub expires_in: u64,
}

/// A freshly-cut access token
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub expires_in: u64,
}

/// Current user plus their live push credential, if any
#[derive(Debug, Clone)]
pub struct MeResponse {
    pub user: UserInfo,
    pub push_credential: Option<PushCredential>,
}

/// Auth API surface of the server
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<LoginBundle>;
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedAccess>;
    async fn me(&self, access_token: &str) -> Result<MeResponse>;
    async fn logout(&self, access_token: &str) -> Result<()>;
}

/// Credentials that survive process restarts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: String,
}

/// Where persisted credentials live (keychain, secure storage, cookies)
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<StoredCredentials>;
    fn save(&self, credentials: &StoredCredentials);
    fn clear(&self);
}

/// In-memory credential store; the default when nothing persists
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<StoredCredentials> {
        self.slot.lock().clone()
    }

    fn save(&self, credentials: &StoredCredentials) {
        *self.slot.lock() = Some(credentials.clone());
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// Authentication state visible to the rest of the app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Nothing checked yet
    Unknown,
    /// Credentials on hand and believed valid
    Authenticated,
    /// No usable credentials
    Unauthenticated,
}

struct ActiveSession {
    user: Option<UserInfo>,
    access_token: Option<String>,
    access_expires_at: u64,
    refresh_token: String,
    push_credential: Option<PushCredential>,
}

struct SessionInner {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn CredentialStore>,
    active: Mutex<Option<ActiveSession>>,
    // Serializes refreshes so only one network call is in flight
    refresh_gate: tokio::sync::Mutex<()>,
    status_tx: watch::Sender<AuthStatus>,
    status_rx: watch::Receiver<AuthStatus>,
}

/// Owns one user's credentials and keeps them fresh
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl AuthSession {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn CredentialStore>) -> Self {
        let (status_tx, status_rx) = watch::channel(AuthStatus::Unknown);
        Self {
            inner: Arc::new(SessionInner {
                api,
                store,
                active: Mutex::new(None),
                refresh_gate: tokio::sync::Mutex::new(()),
                status_tx,
                status_rx,
            }),
        }
    }

    /// Current auth status
    pub fn status(&self) -> AuthStatus {
        *self.inner.status_rx.borrow()
    }

    /// Receiver for auth status changes
    pub fn status_receiver(&self) -> watch::Receiver<AuthStatus> {
        self.inner.status_rx.clone()
    }

    /// The signed-in user, if known
    pub fn current_user(&self) -> Option<UserInfo> {
        self.inner.active.lock().as_ref()?.user.clone()
    }

    /// Channels the live push credential covers
    pub fn granted_channels(&self) -> Vec<String> {
        self.inner
            .active
            .lock()
            .as_ref()
            .and_then(|s| s.push_credential.as_ref())
            .map(|c| c.channels.clone())
            .unwrap_or_default()
    }

    /// Sign in with username and password
    pub async fn login(&self, username: &str, password: &str) -> Result<UserInfo> {
        let bundle = self.inner.api.login(username, password).await?;

        self.inner.store.save(&StoredCredentials {
            access_token: bundle.access_token.clone(),
            refresh_token: bundle.refresh_token.clone(),
        });

        *self.inner.active.lock() = Some(ActiveSession {
            user: Some(bundle.user.clone()),
            access_token: Some(bundle.access_token),
            access_expires_at: unix_now() + bundle.expires_in,
            refresh_token: bundle.refresh_token,
            push_credential: Some(bundle.push_credential),
        });

        let _ = self.inner.status_tx.send(AuthStatus::Authenticated);
        info!(username = %bundle.user.username, "Logged in");
        Ok(bundle.user)
    }

    /// Sign out. Server-side teardown is best effort; local state always
    /// clears. Safe to call repeatedly.
    pub async fn logout(&self) {
        let access = self
            .inner
            .active
            .lock()
            .as_ref()
            .and_then(|s| s.access_token.clone());

        if let Some(access) = access {
            if let Err(e) = self.inner.api.logout(&access).await {
                warn!(error = %e, "Server logout failed, clearing locally");
            }
        }

        self.clear();
    }

    /// Decide whether the app should treat the user as signed in.
    ///
    /// A live in-memory session answers immediately. Otherwise persisted
    /// credentials are restored optimistically: if the stored refresh token
    /// has not expired by its own claims, the session reports authenticated
    /// right away and verifies with the server in the background. A refresh
    /// token past its expiry is cleared on the spot.
    pub fn check_auth_status(&self) -> bool {
        {
            let active = self.inner.active.lock();
            if let Some(session) = active.as_ref() {
                if token_is_fresh(&session.refresh_token) {
                    return true;
                }
            }
        }

        let Some(stored) = self.inner.store.load() else {
            self.clear();
            return false;
        };

        if !token_is_fresh(&stored.refresh_token) {
            debug!("Persisted refresh token expired, clearing");
            self.clear();
            return false;
        }

        let access_fresh = token_is_fresh(&stored.access_token);
        *self.inner.active.lock() = Some(ActiveSession {
            user: None,
            access_token: access_fresh.then(|| stored.access_token.clone()),
            access_expires_at: if access_fresh {
                unverified_expiry(&stored.access_token).unwrap_or(0)
            } else {
                0
            },
            refresh_token: stored.refresh_token,
            push_credential: None,
        });
        let _ = self.inner.status_tx.send(AuthStatus::Authenticated);

        // Verify in the background; a rejected refresh clears everything
        let session = self.clone();
        tokio::spawn(async move {
            if let Err(e) = session.ensure_access().await {
                warn!(error = %e, "Background credential verification failed");
            }
        });

        true
    }

    /// Token provider for the push connection.
    ///
    /// Returns the cached credential while it is fresh, otherwise fetches a
    /// new one. The empty string signals the gateway connection to give up.
    pub async fn connection_token(&self) -> String {
        if let Some(token) = self.cached_push_token() {
            return token;
        }

        match self.fetch_push_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not obtain push credential");
                String::new()
            }
        }
    }

    fn cached_push_token(&self) -> Option<String> {
        let active = self.inner.active.lock();
        let credential = active.as_ref()?.push_credential.as_ref()?;
        token_is_fresh(&credential.token).then(|| credential.token.clone())
    }

    async fn fetch_push_token(&self) -> Result<String> {
        let access = self.ensure_access().await?;
        let me = self.inner.api.me(&access).await?;

        let mut active = self.inner.active.lock();
        if let Some(session) = active.as_mut() {
            session.user = Some(me.user);
            session.push_credential = me.push_credential.clone();
        }
        drop(active);

        me.push_credential
            .map(|c| c.token)
            .ok_or(ClientError::Unauthenticated)
    }

    /// Return a fresh access token, refreshing if needed.
    ///
    /// Only one refresh runs at a time; late arrivals re-check freshness
    /// after acquiring the gate and reuse the token the first caller fetched.
    async fn ensure_access(&self) -> Result<String> {
        if let Some(token) = self.fresh_access() {
            return Ok(token);
        }

        let _gate = self.inner.refresh_gate.lock().await;

        if let Some(token) = self.fresh_access() {
            return Ok(token);
        }

        let refresh_token = self
            .inner
            .active
            .lock()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(ClientError::Unauthenticated)?;

        match self.inner.api.refresh(&refresh_token).await {
            Ok(refreshed) => {
                let mut active = self.inner.active.lock();
                if let Some(session) = active.as_mut() {
                    session.access_token = Some(refreshed.access_token.clone());
                    session.access_expires_at = unix_now() + refreshed.expires_in;
                }
                drop(active);

                self.inner.store.save(&StoredCredentials {
                    access_token: refreshed.access_token.clone(),
                    refresh_token,
                });

                debug!("Access token refreshed");
                Ok(refreshed.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Refresh rejected, clearing credentials");
                self.clear();
                Err(ClientError::Unauthenticated)
            }
        }
    }

    fn fresh_access(&self) -> Option<String> {
        let active = self.inner.active.lock();
        let session = active.as_ref()?;
        let token = session.access_token.as_ref()?;
        (session.access_expires_at > unix_now() + FRESHNESS_MARGIN).then(|| token.clone())
    }

    fn clear(&self) {
        *self.inner.active.lock() = None;
        self.inner.store.clear();
        let _ = self.inner.status_tx.send(AuthStatus::Unauthenticated);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Read the `exp` claim of a JWT without verifying its signature.
///
/// Good enough to decide whether presenting the token is worth a round trip;
/// the server is the authority either way.
fn unverified_expiry(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_u64()
}

fn token_is_fresh(token: &str) -> bool {
    match unverified_expiry(token) {
        Some(exp) => exp > unix_now() + FRESHNESS_MARGIN,
        None => false,
    }
}

/// [`AuthApi`] backed by the real HTTP endpoints
pub struct HttpAuthApi {
    http: reqwest::Client,
    base: String,
}

impl HttpAuthApi {
    pub fn new(api_url: impl Into<String>) -> Self {
        let base: String = api_url.into();
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user: UserInfo,
    access_token: String,
    refresh_token: String,
    push_credential: PushCredential,
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeBody {
    user: UserInfo,
    push_credential: Option<PushCredential>,
}

async fn check_auth_response(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ClientError::Authentication("credentials rejected".into()));
    }
    if !status.is_success() {
        return Err(ClientError::Api(format!("status {status}")));
    }
    Ok(resp)
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, username: &str, password: &str) -> Result<LoginBundle> {
        let resp = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;

        let body: LoginResponse = check_auth_response(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;

        Ok(LoginBundle {
            user: body.user,
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            push_credential: body.push_credential,
            expires_in: body.expires_in,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedAccess> {
        let resp = self
            .http
            .post(self.url("/api/auth/refresh"))
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;

        let body: RefreshResponse = check_auth_response(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;

        Ok(RefreshedAccess {
            access_token: body.access_token,
            expires_in: body.expires_in,
        })
    }

    async fn me(&self, access_token: &str) -> Result<MeResponse> {
        let resp = self
            .http
            .get(self.url("/api/auth/me"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;

        let body: MeBody = check_auth_response(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;

        Ok(MeResponse {
            user: body.user,
            push_credential: body.push_credential,
        })
    }

    async fn logout(&self, access_token: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url("/api/auth/logout"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;

        check_auth_response(resp).await?;
        Ok(())
    }
}
