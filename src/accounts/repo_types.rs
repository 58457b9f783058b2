use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the directory.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,                                      // assigned by the store
    pub name: String,                                  // display name
    pub email: String,                                 // unique, lower-cased
    pub password_hash: String,                         // argon2 PHC string
    pub reset_token: Option<String>,                   // set while a reset is pending
    pub reset_token_expires_at: Option<OffsetDateTime>, // paired with reset_token
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn has_pending_reset(&self, now: OffsetDateTime) -> bool {
        matches!(self.reset_token_expires_at, Some(exp) if exp > now)
            && self.reset_token.is_some()
    }
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}
