use std::sync::Arc;

use anyhow::Context;
use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::accounts::{repo::UserDirectory, repo_types::User};

/// 160 bits of entropy.
const TOKEN_BYTES: usize = 20;

/// Issues, validates and consumes single-use password reset tokens.
///
/// Expiry is checked at lookup time; nothing has to run for an old token to stop working.
pub struct ResetTokenManager {
    users: Arc<dyn UserDirectory>,
    ttl: Duration,
}

impl ResetTokenManager {
    pub fn new(users: Arc<dyn UserDirectory>, ttl: Duration) -> Self {
        Self { users, ttl }
    }

    /// Generates a token for `user` and stores it with its expiry, replacing any earlier one.
    pub async fn issue(&self, user: &User) -> anyhow::Result<String> {
        let expires_at = OffsetDateTime::now_utc()
            .checked_add(self.ttl)
            .with_context(|| format!("reset token ttl {} out of range", self.ttl))?;
        let token = generate_token();
        let stored = self
            .users
            .set_reset_token(user.id, &token, expires_at)
            .await?;
        anyhow::ensure!(stored, "user {} vanished before reset token was stored", user.id);
        debug!(user_id = %user.id, %expires_at, "reset token issued");
        Ok(token)
    }

    /// `None` for unknown, expired and consumed tokens alike.
    pub async fn validate(&self, token: &str) -> anyhow::Result<Option<User>> {
        if token.is_empty() {
            return Ok(None);
        }
        self.users
            .find_by_reset_token(token, OffsetDateTime::now_utc())
            .await
    }

    /// Sets the new hash and clears the token in one write. False if the token
    /// stopped being valid after `validate`.
    pub async fn consume(
        &self,
        user: &User,
        token: &str,
        new_password_hash: &str,
    ) -> anyhow::Result<bool> {
        self.users
            .consume_reset_token(user.id, token, new_password_hash, OffsetDateTime::now_utc())
            .await
    }

    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        self.users
            .purge_expired_reset_tokens(OffsetDateTime::now_utc())
            .await
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Periodically clears expired tokens from the directory.
pub fn spawn_purge_task(
    tokens: Arc<ResetTokenManager>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match tokens.purge_expired().await {
                Ok(0) => {}
                Ok(n) => info!(purged = n, "expired reset tokens cleared"),
                Err(e) => warn!(error = %e, "reset token purge failed"),
            }
        }
    })
}
