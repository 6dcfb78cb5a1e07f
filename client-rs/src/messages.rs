//! Wire frames for the push gateway protocol
//!
//! These mirror the gateway's message definitions to ensure protocol
//! compatibility.

use serde::{Deserialize, Serialize};

/// Frames sent from client to gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Open the connection with a signed credential
    Connect { token: String },

    /// Subscribe to a channel
    Subscribe { channel: String },

    /// Unsubscribe from a channel
    Unsubscribe { channel: String },

    /// Publish a payload to a channel
    Publish {
        channel: String,
        data: serde_json::Value,
    },

    /// Keepalive
    Ping,
}

/// Frames received from the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Connection accepted
    Connected {
        #[serde(default)]
        client: Option<String>,
    },

    /// Connection refused
    ConnectError { message: String },

    /// Subscription confirmed
    Subscribed { channel: String },

    /// Subscription denied
    SubscribeError { channel: String, message: String },

    /// Unsubscription confirmed
    Unsubscribed { channel: String },

    /// Publish confirmed
    Published { channel: String },

    /// Publish denied
    PublishError { channel: String, message: String },

    /// Incoming publication on a subscribed channel
    Publication {
        channel: String,
        data: serde_json::Value,
    },

    /// Keepalive response
    Pong,

    /// Generic error
    Error { message: String },
}
