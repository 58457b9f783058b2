use std::sync::Arc;

use time::Duration;
use tracing::warn;

use crate::accounts::{
    memory::InMemoryUserDirectory,
    password::CredentialHasher,
    repo::{PgUserDirectory, UserDirectory},
    services::AccountService,
    tokens::ResetTokenManager,
};
use crate::config::{AppConfig, MailConfig};
use crate::db;
use crate::mailer::{LogNotifier, Notifier, SmtpNotifier};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<AccountService>,
    pub tokens: Arc<ResetTokenManager>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users: Arc<dyn UserDirectory> = match &config.database_url {
            Some(url) => Arc::new(PgUserDirectory::new(db::connect(url).await?)),
            None => {
                warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                Arc::new(InMemoryUserDirectory::new())
            }
        };

        let notifier: Arc<dyn Notifier> = match &config.mail {
            MailConfig::Smtp(smtp) => Arc::new(SmtpNotifier::new(smtp)?),
            MailConfig::Log => {
                warn!("MAIL_MODE=log; reset emails are not sent");
                Arc::new(LogNotifier)
            }
        };

        Self::from_parts(config, users, notifier)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let hasher = CredentialHasher::new(&config.hash)?;
        let tokens = Arc::new(ResetTokenManager::new(
            users.clone(),
            Duration::minutes(config.reset.ttl_minutes),
        ));
        let accounts = Arc::new(AccountService::new(
            users,
            notifier,
            hasher,
            tokens.clone(),
            config.reset.url_base.clone(),
        ));
        Ok(Self {
            config,
            accounts,
            tokens,
        })
    }

    /// In-memory state with cheap hashing.
    #[cfg(test)]
    pub fn fake(notifier: Arc<dyn Notifier>) -> Self {
        use crate::config::{HashConfig, ResetConfig};

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            mail: MailConfig::Log,
            reset: ResetConfig {
                url_base: "https://front.example/reset-password".into(),
                ttl_minutes: 10,
                purge_interval_secs: 0,
            },
            hash: HashConfig {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
        });
        Self::from_parts(config, Arc::new(InMemoryUserDirectory::new()), notifier)
            .expect("fake state builds")
    }
}
