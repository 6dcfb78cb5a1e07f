//! Khedma auth and real-time push authorization server
//!
//! Issues the access, refresh, and push connection credentials the delivery
//! apps run on, and decides which real-time channels each role may use.

pub mod api;
pub mod auth;
pub mod channels;
pub mod cli;
pub mod config;
pub mod push;
pub mod storage;

pub use api::{router, AppState};
pub use auth::{channels_for, ChannelGrant, Role, TokenService};
pub use channels::Channel;
pub use config::AppConfig;
pub use push::{PushCredential, PushGateway};
