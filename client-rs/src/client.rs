//! Push gateway client

use crate::auth::{AuthSession, AuthStatus};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::EventBus;
use crate::messages::{ClientFrame, ServerFrame};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Connection state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to the gateway
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and subscribed
    Connected,
    /// Waiting to retry after a dropped connection
    Reconnecting,
}

struct ClientInner {
    config: ClientConfig,
    auth: AuthSession,
    events: EventBus,
    state: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,

    // Channel to the live connection task
    tx: Mutex<Option<mpsc::Sender<Outbound>>>,

    // Channels confirmed subscribed on the gateway; cleared on disconnect
    subscribed: Mutex<HashSet<String>>,

    // Operations awaiting gateway confirmation
    pending_subscribes: Mutex<HashMap<String, oneshot::Sender<Result<()>>>>,
    pending_publishes: Mutex<HashMap<String, oneshot::Sender<Result<()>>>>,

    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

enum Outbound {
    Send(ClientFrame),
    Shutdown,
}

/// WebSocket client for the push gateway
///
/// Connects with a credential from the [`AuthSession`], subscribes to every
/// channel the credential grants, and routes publications to typed handlers.
/// Cheaply cloneable; clones share one connection.
#[derive(Clone)]
pub struct PushClient {
    inner: Arc<ClientInner>,
}

impl PushClient {
    pub fn new(config: ClientConfig, auth: AuthSession) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(ClientInner {
                config,
                auth,
                events: EventBus::new(),
                state: state_tx,
                state_rx,
                tx: Mutex::new(None),
                subscribed: Mutex::new(HashSet::new()),
                pending_subscribes: Mutex::new(HashMap::new()),
                pending_publishes: Mutex::new(HashMap::new()),
                shutdown: Mutex::new(None),
            }),
        }
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Receiver for connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// The auth session this client connects with
    pub fn auth(&self) -> &AuthSession {
        &self.inner.auth
    }

    /// Typed event handler registration
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Connect to the gateway.
    ///
    /// Calling while connected or already connecting is a no-op. Fails
    /// immediately when no credential can be obtained; connecting without
    /// signing in first is a programming error, not something to retry.
    ///
    /// A failed first attempt returns its error right away. When automatic
    /// reconnection is enabled the retry loop keeps running in the
    /// background; callers observe progress through [`state_receiver`].
    ///
    /// [`state_receiver`]: PushClient::state_receiver
    pub async fn connect(&self) -> Result<()> {
        match self.connection_state() {
            ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
        }

        let token = self.inner.auth.connection_token().await;
        if token.is_empty() {
            return Err(ClientError::Unauthenticated);
        }

        self.inner.set_state(ConnectionState::Connecting);

        // Resolved once the handshake either completes or fails; later
        // drops are the reconnect loop's business, not this caller's
        let (ready_tx, ready_rx) = oneshot::channel();

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ready = Some(ready_tx);
            if let Err(e) = connection_task(inner.clone(), token, &mut ready).await {
                error!(error = %e, "Connection task ended");
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(e));
                }
                handle_disconnect(inner).await;
            }
        });

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Shutdown),
        }
    }

    /// Disconnect from the gateway.
    ///
    /// Deterministic: no reconnect fires afterwards, and the client reports
    /// `Disconnected` before this returns. Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(tx) = self.inner.tx.lock().take() {
            let _ = tx.send(Outbound::Shutdown).await;
        }

        if let Some(shutdown) = self.inner.shutdown.lock().take() {
            let _ = shutdown.send(());
        }

        self.inner.subscribed.lock().clear();
        self.inner.reject_pending();
        self.inner.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    /// Publish a payload to a channel.
    ///
    /// Requires a live connection; nothing is queued while disconnected.
    pub async fn publish<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }

        let data = serde_json::to_value(payload)?;

        let (tx, rx) = oneshot::channel();
        self.inner
            .pending_publishes
            .lock()
            .insert(channel.to_string(), tx);

        self.inner
            .send(ClientFrame::Publish {
                channel: channel.to_string(),
                data,
            })
            .await?;

        match timeout(self.inner.config.operation_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Shutdown),
            Err(_) => {
                self.inner.pending_publishes.lock().remove(channel);
                Err(ClientError::Timeout)
            }
        }
    }

    /// Drop a channel subscription.
    ///
    /// Granted channels come back automatically on the next (re)connect.
    pub async fn unsubscribe(&self, channel: &str) -> Result<()> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }

        self.inner.subscribed.lock().remove(channel);
        self.inner
            .send(ClientFrame::Unsubscribe {
                channel: channel.to_string(),
            })
            .await
    }
}

impl ClientInner {
    fn set_state(&self, state: ConnectionState) {
        let _ = self.state.send(state);
    }

    async fn send(&self, frame: ClientFrame) -> Result<()> {
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => tx
                .send(Outbound::Send(frame))
                .await
                .map_err(|_| ClientError::NotConnected),
            None => Err(ClientError::NotConnected),
        }
    }

    async fn subscribe_channel(&self, channel: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.pending_subscribes.lock().insert(channel.to_string(), tx);

        self.send(ClientFrame::Subscribe {
            channel: channel.to_string(),
        })
        .await?;

        match timeout(self.config.operation_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Shutdown),
            Err(_) => {
                self.pending_subscribes.lock().remove(channel);
                Err(ClientError::Timeout)
            }
        }
    }

    /// Subscribe to everything the current credential grants
    async fn subscribe_granted(&self) {
        for channel in self.auth.granted_channels() {
            if let Err(e) = self.subscribe_channel(&channel).await {
                warn!(channel, error = %e, "Failed to subscribe");
            }
        }
    }

    fn handle_frame(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Subscribed { channel } => {
                self.subscribed.lock().insert(channel.clone());
                if let Some(tx) = self.pending_subscribes.lock().remove(&channel) {
                    let _ = tx.send(Ok(()));
                }
            }
            ServerFrame::SubscribeError { channel, message } => {
                if let Some(tx) = self.pending_subscribes.lock().remove(&channel) {
                    let _ = tx.send(Err(ClientError::PermissionDenied(message)));
                }
            }
            ServerFrame::Unsubscribed { channel } => {
                self.subscribed.lock().remove(&channel);
            }
            ServerFrame::Published { channel } => {
                if let Some(tx) = self.pending_publishes.lock().remove(&channel) {
                    let _ = tx.send(Ok(()));
                }
            }
            ServerFrame::PublishError { channel, message } => {
                if let Some(tx) = self.pending_publishes.lock().remove(&channel) {
                    let _ = tx.send(Err(ClientError::PermissionDenied(message)));
                }
            }
            ServerFrame::Publication { channel, data } => {
                self.events.dispatch(&channel, data);
            }
            ServerFrame::Pong => {}
            ServerFrame::Error { message } => {
                warn!(message, "Gateway error");
            }
            ServerFrame::Connected { .. } | ServerFrame::ConnectError { .. } => {
                // Only expected during the handshake
            }
        }
    }

    fn reject_pending(&self) {
        for (_, tx) in self.pending_subscribes.lock().drain() {
            let _ = tx.send(Err(ClientError::NotConnected));
        }
        for (_, tx) in self.pending_publishes.lock().drain() {
            let _ = tx.send(Err(ClientError::NotConnected));
        }
    }
}

async fn handle_disconnect(inner: Arc<ClientInner>) {
    *inner.tx.lock() = None;
    inner.subscribed.lock().clear();
    inner.reject_pending();

    if inner.config.auto_reconnect && inner.auth.status() == AuthStatus::Authenticated {
        inner.set_state(ConnectionState::Reconnecting);
        schedule_reconnect(inner);
    } else {
        inner.set_state(ConnectionState::Disconnected);
    }
}

fn backoff_delay(config: &ClientConfig, attempt: u32) -> Duration {
    config
        .reconnect_delay
        .checked_mul(2u32.saturating_pow(attempt.min(16)))
        .map_or(config.max_reconnect_delay, |d| {
            d.min(config.max_reconnect_delay)
        })
}

/// The only reconnect path: capped exponential backoff, stopped by a manual
/// disconnect or by losing authentication.
fn schedule_reconnect(inner: Arc<ClientInner>) {
    tokio::spawn(async move {
        let mut attempt = 0u32;

        loop {
            let delay = backoff_delay(&inner.config, attempt);

            info!(?delay, attempt = attempt + 1, "Reconnecting");
            tokio::time::sleep(delay).await;

            if *inner.state_rx.borrow() == ConnectionState::Disconnected {
                // Manual disconnect while we slept
                break;
            }

            let token = inner.auth.connection_token().await;
            if token.is_empty() {
                info!("No credential available, stopping reconnect");
                inner.set_state(ConnectionState::Disconnected);
                break;
            }

            inner.set_state(ConnectionState::Connecting);

            // The receiver is unused; a consumed sender marks a completed
            // handshake, which restarts the backoff schedule
            let (handshake_tx, _handshake_rx) = oneshot::channel();
            let mut ready = Some(handshake_tx);

            match connection_task(inner.clone(), token, &mut ready).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Reconnect failed");
                    attempt = if ready.is_none() { 0 } else { attempt + 1 };
                    inner.set_state(ConnectionState::Reconnecting);
                }
            }
        }
    });
}

/// One connection's lifetime, from handshake to teardown.
///
/// `ready` is consumed with `Ok` the moment the gateway accepts the
/// credential; a task that errors with `ready` untouched never got that far.
async fn connection_task(
    inner: Arc<ClientInner>,
    token: String,
    ready: &mut Option<oneshot::Sender<Result<()>>>,
) -> Result<()> {
    // Installed before dialing so a disconnect can abort a handshake in flight
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    *inner.shutdown.lock() = Some(shutdown_tx);

    let handshake = async {
        debug!(url = %inner.config.ws_url, "Connecting");
        let (ws, _) = tokio_tungstenite::connect_async(inner.config.ws_url.as_str())
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let (mut sink, mut stream) = ws.split();

        let connect = serde_json::to_string(&ClientFrame::Connect { token })?;
        sink.send(Message::Text(connect))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        // First frame decides whether the credential was accepted
        let response = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => break serde_json::from_str::<ServerFrame>(&text)?,
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::Transport(e.to_string())),
                None => return Err(ClientError::Connection("closed during handshake".into())),
            }
        };

        match response {
            ServerFrame::Connected { client } => {
                info!(client = ?client, "Connected to gateway");
            }
            ServerFrame::ConnectError { message } => {
                return Err(ClientError::Authentication(message));
            }
            ServerFrame::Error { message } => {
                return Err(ClientError::Server(message));
            }
            other => {
                return Err(ClientError::Server(format!(
                    "unexpected handshake response: {other:?}"
                )));
            }
        }

        Ok::<_, ClientError>((sink, stream))
    };

    let (mut sink, mut stream) = tokio::select! {
        result = handshake => result?,
        _ = &mut shutdown_rx => return Ok(()),
    };

    // A disconnect may have raced the handshake; honor it
    if *inner.state_rx.borrow() == ConnectionState::Disconnected {
        let _ = sink.close().await;
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel::<Outbound>(100);
    *inner.tx.lock() = Some(tx);

    inner.set_state(ConnectionState::Connected);
    if let Some(ready_tx) = ready.take() {
        let _ = ready_tx.send(Ok(()));
    }

    // Runs beside the frame loop below; confirmations arrive on the stream
    let granted = inner.clone();
    tokio::spawn(async move { granted.subscribe_granted().await });

    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + inner.config.ping_interval,
        inner.config.ping_interval,
    );

    let result: Result<()> = loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(Outbound::Send(frame)) => {
                        let text = serde_json::to_string(&frame)?;
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            break Err(ClientError::Transport(e.to_string()));
                        }
                    }
                    Some(Outbound::Shutdown) | None => break Ok(()),
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(&text) {
                            Ok(frame) => inner.handle_frame(frame),
                            Err(e) => warn!(error = %e, "Unparseable frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            break Err(ClientError::Transport(e.to_string()));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Connection closed by gateway");
                        break Err(ClientError::Connection("connection closed".into()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(ClientError::Transport(e.to_string())),
                }
            }

            _ = keepalive.tick() => {
                let text = serde_json::to_string(&ClientFrame::Ping)?;
                if let Err(e) = sink.send(Message::Text(text)).await {
                    break Err(ClientError::Transport(e.to_string()));
                }
            }

            _ = &mut shutdown_rx => break Ok(()),
        }
    };

    *inner.tx.lock() = None;
    inner.subscribed.lock().clear();

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        AuthApi, AuthSession, LoginBundle, MeResponse, MemoryCredentialStore, PushCredential,
        RefreshedAccess, UserInfo,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// Auth API that rejects everything; stands in for a signed-out session
    struct NullApi;

    #[async_trait]
    impl AuthApi for NullApi {
        async fn login(&self, _: &str, _: &str) -> Result<LoginBundle> {
            Err(ClientError::Authentication("no".into()))
        }
        async fn refresh(&self, _: &str) -> Result<RefreshedAccess> {
            Err(ClientError::Authentication("no".into()))
        }
        async fn me(&self, _: &str) -> Result<MeResponse> {
            Err(ClientError::Authentication("no".into()))
        }
        async fn logout(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn test_client() -> PushClient {
        let auth = AuthSession::new(Arc::new(NullApi), Arc::new(MemoryCredentialStore::new()));
        let config = ClientConfig::new("ws://localhost:8000/ws", "http://localhost:3000");
        PushClient::new(config, auth)
    }

    /// A structurally valid token whose payload expires an hour from now
    fn fresh_token() -> String {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        let exp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 3600;
        let payload = URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp}}}"));
        format!("header.{payload}.sig")
    }

    fn demo_user() -> UserInfo {
        UserInfo {
            id: "u1".to_string(),
            username: "demo".to_string(),
            email: "demo@example.com".to_string(),
            full_name: "John Smith".to_string(),
            role: "dispatcher".to_string(),
        }
    }

    /// Auth API that accepts everything; stands in for a signed-in session
    struct StubApi {
        channels: Vec<String>,
    }

    #[async_trait]
    impl AuthApi for StubApi {
        async fn login(&self, _: &str, _: &str) -> Result<LoginBundle> {
            Ok(LoginBundle {
                user: demo_user(),
                access_token: fresh_token(),
                refresh_token: fresh_token(),
                push_credential: PushCredential {
                    token: fresh_token(),
                    channels: self.channels.clone(),
                },
                expires_in: 900,
            })
        }
        async fn refresh(&self, _: &str) -> Result<RefreshedAccess> {
            Ok(RefreshedAccess {
                access_token: fresh_token(),
                expires_in: 900,
            })
        }
        async fn me(&self, _: &str) -> Result<MeResponse> {
            Ok(MeResponse {
                user: demo_user(),
                push_credential: Some(PushCredential {
                    token: fresh_token(),
                    channels: self.channels.clone(),
                }),
            })
        }
        async fn logout(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    async fn authed_client(config: ClientConfig, channels: Vec<String>) -> PushClient {
        let auth = AuthSession::new(
            Arc::new(StubApi { channels }),
            Arc::new(MemoryCredentialStore::new()),
        );
        auth.login("demo", "demo").await.unwrap();
        PushClient::new(config, auth)
    }

    /// Minimal in-process gateway: confirms every request, counts pings
    async fn run_gateway(listener: TcpListener, pings: Arc<AtomicUsize>) {
        let (sock, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(sock).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let frame: ClientFrame = serde_json::from_str(&text).unwrap();
            let reply = match frame {
                ClientFrame::Connect { .. } => ServerFrame::Connected {
                    client: Some("c1".to_string()),
                },
                ClientFrame::Subscribe { channel } => ServerFrame::Subscribed { channel },
                ClientFrame::Unsubscribe { channel } => ServerFrame::Unsubscribed { channel },
                ClientFrame::Publish { channel, .. } => ServerFrame::Published { channel },
                ClientFrame::Ping => {
                    pings.fetch_add(1, Ordering::SeqCst);
                    ServerFrame::Pong
                }
            };
            ws.send(Message::Text(serde_json::to_string(&reply).unwrap()))
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_initial_state() {
        let client = test_client();
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(client.auth().current_user().is_none());
    }

    #[test]
    fn test_state_receiver() {
        let client = test_client();
        let rx = client.state_receiver();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_fails_fast_without_credentials() {
        let client = test_client();
        let result = client.connect().await;
        assert!(matches!(result, Err(ClientError::Unauthenticated)));
        // No reconnect loop was started
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_publish_not_connected() {
        let client = test_client();
        let result = client
            .publish("deliveries:updates", &serde_json::json!({"status": "assigned"}))
            .await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected() {
        let client = test_client();
        assert!(client.disconnect().await.is_ok());
        assert!(client.disconnect().await.is_ok());
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_handler_registration_works_while_disconnected() {
        let client = test_client();
        let handle = client.events().on_notification(|_| {});
        handle.unsubscribe();
        handle.unsubscribe();
    }

    #[tokio::test]
    async fn test_unsubscribe_requires_connection() {
        let client = test_client();
        let result = client.unsubscribe("public:announcements").await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[test]
    fn test_backoff_delay_doubles_up_to_cap() {
        let config = ClientConfig::new("ws://gw:8000/ws", "http://api:3000")
            .reconnect_delay(Duration::from_millis(100), Duration::from_secs(2));

        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, u32::MAX), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connect_returns_error_when_gateway_unreachable() {
        // Bind then drop to find a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig::new(format!("ws://{addr}"), "http://localhost:3000");
        let client = authed_client(config, vec!["user:u1".to_string()]).await;

        // Auto-reconnect is on; the retry loop must not hold this call hostage
        let result = tokio::time::timeout(Duration::from_secs(5), client.connect())
            .await
            .expect("connect resolves even while retries continue");
        assert!(matches!(result, Err(ClientError::Connection(_))));

        client.disconnect().await.unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_during_handshake_leaves_no_connection() {
        // Accepts the socket but never answers the upgrade
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(sock);
        });

        let config = ClientConfig::new(format!("ws://{addr}"), "http://localhost:3000");
        let client = authed_client(config, vec!["user:u1".to_string()]).await;

        let connecting = {
            let client = client.clone();
            tokio::spawn(async move { client.connect().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.disconnect().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), connecting)
            .await
            .expect("connect resolves once torn down")
            .unwrap();
        assert!(matches!(result, Err(ClientError::Shutdown)));

        // No orphaned task flips the state back afterwards
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(client.inner.subscribed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_session_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let pings = Arc::new(AtomicUsize::new(0));
        tokio::spawn(run_gateway(listener, pings.clone()));

        let config = ClientConfig::new(format!("ws://{addr}"), "http://localhost:3000")
            .no_reconnect()
            .ping_interval(Duration::from_millis(50));
        let client = authed_client(config, vec!["user:u1".to_string()]).await;

        tokio::time::timeout(Duration::from_secs(2), client.connect())
            .await
            .expect("connect finishes")
            .unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Connected);

        client
            .publish("user:u1", &serde_json::json!({ "note": "hello" }))
            .await
            .unwrap();
        client.unsubscribe("user:u1").await.unwrap();

        // Keepalives flow while the connection idles
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(pings.load(Ordering::SeqCst) >= 1);

        client.disconnect().await.unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_completed_handshake_marks_ready_even_if_dropped_later() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(sock).await.unwrap();
            let _ = ws.next().await;
            let accepted = serde_json::to_string(&ServerFrame::Connected {
                client: Some("c1".to_string()),
            })
            .unwrap();
            ws.send(Message::Text(accepted)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            // Dropping here ends the connection from the gateway side
        });

        let config = ClientConfig::new(format!("ws://{addr}"), "http://localhost:3000");
        let client = authed_client(config, Vec::new()).await;
        client.inner.set_state(ConnectionState::Connecting);

        let (ready_tx, ready_rx) = oneshot::channel();
        let mut ready = Some(ready_tx);
        let result = connection_task(client.inner.clone(), fresh_token(), &mut ready).await;

        // The drop ends the task with an error, but the consumed marker
        // records that a full session was established first
        assert!(result.is_err());
        assert!(ready.is_none());
        assert!(matches!(ready_rx.await, Ok(Ok(()))));
    }
}
