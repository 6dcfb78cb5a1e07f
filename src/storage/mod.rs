//! Storage backends
//!
//! - Postgres: durable storage for users and live push sessions
//! - Memory: in-process store used as a test fixture only

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PostgresConfig, PostgresStore};

use crate::auth::Role;
pub use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A stored user. The password hash never serializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for user creation. The password arrives pre-hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
}

/// The single live push session of a user
#[derive(Debug, Clone, Serialize)]
pub struct PushSession {
    pub token: String,
    pub channels: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// User persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user. Duplicate username or email is a [`StorageError::Conflict`].
    async fn create(&self, user: NewUser) -> Result<User, StorageError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;

    /// Soft-deactivate a user. The row stays; live sessions must be
    /// revoked by the caller.
    async fn deactivate(&self, id: Uuid) -> Result<(), StorageError>;
}

/// Live push credential persistence (one per user, last writer wins)
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert the live credential for a user, superseding any prior one
    async fn put(
        &self,
        user_id: Uuid,
        token: &str,
        channels: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Return the live credential, or None when absent or expired
    /// (lazy expiry: expired rows are treated as absent)
    async fn get_live(&self, user_id: Uuid) -> Result<Option<PushSession>, StorageError>;

    /// Delete the live credential
    async fn revoke(&self, user_id: Uuid) -> Result<(), StorageError>;
}
