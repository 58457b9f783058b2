use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::accounts::repo_types::{NewUser, User};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, reset_token, reset_token_expires_at, created_at";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistent store of user records.
///
/// Every mutating call is a single-row write; the store's per-row atomicity is
/// what keeps the reset fields paired with each other and with the password.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert a user. Fails with `DuplicateEmail` if the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, DirectoryError>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// User holding `token` whose expiry is strictly after `now`.
    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;

    /// Store a reset token and its expiry together. Returns false if the user is gone.
    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<bool>;

    /// Replace the password hash and clear both reset fields, only while the
    /// user still holds `token` unexpired at `now`. Returns false otherwise.
    async fn consume_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool>;

    /// Clear reset fields whose expiry is at or before `now`.
    async fn purge_expired_reset_tokens(&self, now: OffsetDateTime) -> anyhow::Result<u64>;

    async fn list(&self) -> anyhow::Result<Vec<User>>;
}

pub struct PgUserDirectory {
    db: PgPool,
}

impl PgUserDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn create(&self, user: NewUser) -> Result<User, DirectoryError> {
        let res = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(u) => Ok(u),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DirectoryError::DuplicateEmail)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE reset_token = $1 AND reset_token_expires_at > $2
            "#
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("find user by reset token")?;
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET reset_token = $2, reset_token_expires_at = $3
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .context("set reset token")?;
        Ok(res.rows_affected() > 0)
    }

    async fn consume_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $3,
                   reset_token = NULL,
                   reset_token_expires_at = NULL
             WHERE id = $1
               AND reset_token = $2
               AND reset_token_expires_at > $4
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(password_hash)
        .bind(now)
        .execute(&self.db)
        .await
        .context("consume reset token")?;
        Ok(res.rows_affected() > 0)
    }

    async fn purge_expired_reset_tokens(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET reset_token = NULL, reset_token_expires_at = NULL
             WHERE reset_token_expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.db)
        .await
        .context("purge expired reset tokens")?;
        Ok(res.rows_affected())
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(users)
    }
}

/// Run with `DATABASE_URL` pointing at a Postgres server and `cargo test -- --ignored`;
/// each test gets a fresh migrated database.
#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    async fn seed(dir: &PgUserDirectory, email: &str) -> User {
        dir.create(NewUser {
            name: "A".into(),
            email: email.into(),
            password_hash: "old-hash".into(),
        })
        .await
        .unwrap()
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn create_rejects_duplicate_email(pool: PgPool) {
        let dir = PgUserDirectory::new(pool);
        let user = seed(&dir, "a@b.com").await;
        assert!(user.reset_token.is_none());

        let err = dir
            .create(NewUser {
                name: "B".into(),
                email: "a@b.com".into(),
                password_hash: "h".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::DuplicateEmail));
        assert_eq!(dir.list().await.unwrap().len(), 1);
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn consume_requires_matching_unexpired_token(pool: PgPool) {
        let dir = PgUserDirectory::new(pool);
        let user = seed(&dir, "a@b.com").await;
        let now = OffsetDateTime::now_utc();
        assert!(dir
            .set_reset_token(user.id, "tok", now + Duration::minutes(10))
            .await
            .unwrap());

        assert!(!dir.consume_reset_token(user.id, "other", "h1", now).await.unwrap());
        assert!(!dir
            .consume_reset_token(user.id, "tok", "h1", now + Duration::minutes(10))
            .await
            .unwrap());
        assert_eq!(
            dir.find_by_reset_token("tok", now).await.unwrap().map(|u| u.id),
            Some(user.id)
        );

        assert!(dir.consume_reset_token(user.id, "tok", "new-hash", now).await.unwrap());
        assert!(!dir.consume_reset_token(user.id, "tok", "newer", now).await.unwrap());

        let stored = dir.find_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "new-hash");
        assert!(stored.reset_token.is_none());
        assert!(stored.reset_token_expires_at.is_none());
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn purge_clears_only_expired_tokens(pool: PgPool) {
        let dir = PgUserDirectory::new(pool);
        let stale = seed(&dir, "stale@b.com").await;
        let fresh = seed(&dir, "fresh@b.com").await;
        let now = OffsetDateTime::now_utc();
        dir.set_reset_token(stale.id, "old", now - Duration::minutes(1))
            .await
            .unwrap();
        dir.set_reset_token(fresh.id, "new", now + Duration::minutes(10))
            .await
            .unwrap();

        assert_eq!(dir.purge_expired_reset_tokens(now).await.unwrap(), 1);

        let stale = dir.find_by_email("stale@b.com").await.unwrap().unwrap();
        assert!(stale.reset_token.is_none() && stale.reset_token_expires_at.is_none());
        let fresh = dir.find_by_email("fresh@b.com").await.unwrap().unwrap();
        assert_eq!(fresh.reset_token.as_deref(), Some("new"));
    }
}
