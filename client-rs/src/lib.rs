//! Khedma Rust Client
//!
//! Client library for the Khedma auth API and push gateway: sign in, keep
//! tokens fresh, connect to the real-time gateway, and receive typed events
//! for the channels the signed-in role is granted.
//!
//! # Example
//!
//! ```no_run
//! use khedma_client::{AuthSession, ClientConfig, HttpAuthApi, MemoryCredentialStore, PushClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = AuthSession::new(
//!         Arc::new(HttpAuthApi::new("http://localhost:3000")),
//!         Arc::new(MemoryCredentialStore::new()),
//!     );
//!     auth.login("demo", "demo").await?;
//!
//!     let config = ClientConfig::new(
//!         "ws://localhost:8000/connection/websocket",
//!         "http://localhost:3000",
//!     );
//!     let client = PushClient::new(config, auth);
//!
//!     let _handle = client.events().on_delivery_update(|update| {
//!         println!("delivery {:?} is now {:?}", update.delivery_id, update.status);
//!     });
//!
//!     client.connect().await?;
//!     Ok(())
//! }
//! ```

mod auth;
mod client;
mod config;
mod error;
mod events;
mod messages;

pub use auth::{
    AuthApi, AuthSession, AuthStatus, CredentialStore, HttpAuthApi, LoginBundle, MeResponse,
    MemoryCredentialStore, PushCredential, RefreshedAccess, StoredCredentials, UserInfo,
};
pub use client::{ConnectionState, PushClient};
pub use config::ClientConfig;
pub use error::ClientError;
pub use events::{
    ChatMessage, DeliveryUpdate, DriverUpdate, EventBus, Handle, Notification, OnlineUser,
};
pub use messages::{ClientFrame, ServerFrame};
