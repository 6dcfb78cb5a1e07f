//! Application configuration from environment

use crate::auth::TokenConfig;
use crate::push::PushConfig;
use crate::storage::PostgresConfig;
use std::net::SocketAddr;

/// Fully-resolved server configuration
#[derive(Debug)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub postgres: Option<PostgresConfig>,
    pub tokens: TokenConfig,
    pub push: PushConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid BIND_ADDR: {e}"))?;

        Ok(Self {
            bind,
            postgres: PostgresConfig::from_env(),
            tokens: TokenConfig::from_env()?,
            push: PushConfig::from_env()?,
        })
    }
}
