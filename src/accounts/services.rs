use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    accounts::{
        errors::AccountError,
        password::CredentialHasher,
        repo::UserDirectory,
        repo_types::{NewUser, User},
        tokens::ResetTokenManager,
    },
    mailer::Notifier,
};

pub const RESET_EMAIL_SUBJECT: &str = "Reset Password";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn require(value: &str, field: &str) -> Result<(), AccountError> {
    if value.trim().is_empty() {
        return Err(AccountError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn reset_email_body(url: &str) -> String {
    format!(
        "Hi there,\n\
         We received a request to reset your password. Please click the link below to reset it: {url}\n\
         If you did not request a password reset, please ignore this email.\n\
         Best,\n\
         Your Team"
    )
}

/// Registration, login and password reset over an injected directory and notifier.
pub struct AccountService {
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    hasher: CredentialHasher,
    tokens: Arc<ResetTokenManager>,
    reset_url_base: String,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        hasher: CredentialHasher,
        tokens: Arc<ResetTokenManager>,
        reset_url_base: impl Into<String>,
    ) -> Self {
        Self {
            users,
            notifier,
            hasher,
            tokens,
            reset_url_base: reset_url_base.into(),
        }
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AccountError> {
        require(name, "name")?;
        require(email, "email")?;
        require(password, "password")?;

        let email = normalize_email(email);
        if !is_valid_email(&email) {
            warn!(%email, "invalid email");
            return Err(AccountError::Validation(
                "Please enter a valid email address".into(),
            ));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(%email, "email already registered");
            return Err(AccountError::AlreadyExists);
        }

        let password_hash = self.hasher.hash(password)?;
        let user = self
            .users
            .create(NewUser {
                name: name.trim().to_string(),
                email,
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Checks credentials only; no session is issued.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            warn!(%email, "login unknown email");
            return Err(AccountError::NotFound);
        };

        if !self.hasher.verify(password, &user.password_hash) {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AccountError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }

    /// Issues a reset token and mails the link. A mail failure fails the whole call.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AccountError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            warn!(%email, "password reset for unknown email");
            return Err(AccountError::NotFound);
        };

        let token = self.tokens.issue(&user).await?;
        let url = format!("{}?token={}", self.reset_url_base, token);

        self.notifier
            .send(&user.email, RESET_EMAIL_SUBJECT, &reset_email_body(&url))
            .await
            .map_err(|e| AccountError::Dependency(e.context("send reset email")))?;

        info!(user_id = %user.id, "password reset email sent");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AccountError> {
        require(new_password, "password")?;

        let Some(user) = self.tokens.validate(token).await? else {
            warn!("reset with invalid or expired token");
            return Err(AccountError::InvalidOrExpired);
        };

        let password_hash = self.hasher.hash(new_password)?;
        if !self.tokens.consume(&user, token, &password_hash).await? {
            warn!(user_id = %user.id, "reset token lost before consume");
            return Err(AccountError::InvalidOrExpired);
        }

        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AccountError> {
        Ok(self.users.list().await?)
    }
}
