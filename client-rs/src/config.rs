//! Configuration for the Khedma client

use std::time::Duration;

/// Configuration for the auth API and push gateway connection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Push gateway WebSocket URL (e.g., "ws://localhost:8000/connection/websocket")
    pub ws_url: String,

    /// Auth API base URL (e.g., "http://localhost:3000")
    pub api_url: String,

    /// Whether to automatically reconnect on disconnect
    pub auto_reconnect: bool,

    /// Initial delay before reconnecting
    pub reconnect_delay: Duration,

    /// Maximum delay between reconnection attempts
    pub max_reconnect_delay: Duration,

    /// Timeout for operations (subscribe, publish, etc.)
    pub operation_timeout: Duration,

    /// Interval between keepalive pings on an idle connection
    pub ping_interval: Duration,
}

impl ClientConfig {
    /// Create a new configuration with the given gateway and API URLs
    pub fn new(ws_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_url: api_url.into(),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(25),
        }
    }

    /// Disable automatic reconnection
    pub fn no_reconnect(mut self) -> Self {
        self.auto_reconnect = false;
        self
    }

    /// Set the reconnection delay range
    pub fn reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max;
        self
    }

    /// Set the operation timeout
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the keepalive ping interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }
}
