use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::accounts::{
    repo::{DirectoryError, UserDirectory},
    repo_types::{NewUser, User},
};

/// Process-local directory used when no `DATABASE_URL` is configured, and by tests.
/// Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn create(&self, user: NewUser) -> Result<User, DirectoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(DirectoryError::DuplicateEmail);
        }
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.reset_token.as_deref() == Some(token) && u.has_pending_reset(now))
            .cloned())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.reset_token = Some(token.to_string());
        user.reset_token_expires_at = Some(expires_at);
        Ok(true)
    }

    async fn consume_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(false);
        };
        if user.reset_token.as_deref() != Some(token) || !user.has_pending_reset(now) {
            return Ok(false);
        }
        user.password_hash = password_hash.to_string();
        user.reset_token = None;
        user.reset_token_expires_at = None;
        Ok(true)
    }

    async fn purge_expired_reset_tokens(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut users = self.users.write().await;
        let mut purged = 0;
        for user in users.values_mut() {
            if matches!(user.reset_token_expires_at, Some(exp) if exp <= now) {
                user.reset_token = None;
                user.reset_token_expires_at = None;
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by_key(|u| u.created_at);
        Ok(all)
    }
}
