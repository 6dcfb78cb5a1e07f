//! In-memory storage
//!
//! Test fixture standing in for Postgres. Not a production path: the
//! server binary always runs against the SQL store.

use crate::storage::{
    async_trait, NewUser, PushSession, SessionStore, StorageError, User, UserStore,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<Uuid, PushSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User, StorageError> {
        let mut users = self.users.write();

        if users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StorageError::Conflict(
                "username or email already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            role: user.role,
            department: user.department,
            phone: user.phone,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), StorageError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("user {id}")))?;
        user.is_active = false;
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put(
        &self,
        user_id: Uuid,
        token: &str,
        channels: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.sessions.write().insert(
            user_id,
            PushSession {
                token: token.to_string(),
                channels: channels.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_live(&self, user_id: Uuid) -> Result<Option<PushSession>, StorageError> {
        Ok(self
            .sessions
            .read()
            .get(&user_id)
            .filter(|s| s.expires_at > Utc::now())
            .cloned())
    }

    async fn revoke(&self, user_id: Uuid) -> Result<(), StorageError> {
        self.sessions.write().remove(&user_id);
        Ok(())
    }
}
