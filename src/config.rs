use anyhow::Context;
use serde::Deserialize;

/// Longest accepted reset token lifetime, one day.
pub const MAX_RESET_TTL_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// How reset emails leave the process.
#[derive(Debug, Clone, Deserialize)]
pub enum MailConfig {
    Smtp(SmtpConfig),
    /// `MAIL_MODE=log`: nothing is sent; only recipient and subject are logged.
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    /// Front-end page the token is appended to as `?token=`.
    pub url_base: String,
    pub ttl_minutes: i64,
    /// 0 disables the background purge of expired tokens.
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub mail: MailConfig,
    pub reset: ResetConfig,
    pub hash: HashConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).filter(|v| !v.is_empty());
        let parsed = |key: &str| -> anyhow::Result<Option<i64>> {
            var(key)
                .map(|v| v.parse::<i64>().with_context(|| format!("{key} must be an integer")))
                .transpose()
        };

        let mail = match var("MAIL_MODE").as_deref() {
            Some("log") => MailConfig::Log,
            Some("smtp") | None => {
                let host = var("SMTP_HOST")
                    .context("SMTP_HOST is required (set MAIL_MODE=log to skip sending)")?;
                let username = var("SMTP_USERNAME").context("SMTP_USERNAME")?;
                MailConfig::Smtp(SmtpConfig {
                    host,
                    port: var("SMTP_PORT")
                        .map(|v| v.parse::<u16>().context("SMTP_PORT"))
                        .transpose()?
                        .unwrap_or(587),
                    password: var("SMTP_PASSWORD").context("SMTP_PASSWORD")?,
                    from: var("SMTP_FROM").unwrap_or_else(|| username.clone()),
                    username,
                })
            }
            Some(other) => anyhow::bail!("unknown MAIL_MODE {other:?}, expected smtp or log"),
        };

        let ttl_minutes = parsed("RESET_TOKEN_TTL_MINUTES")?.unwrap_or(10);
        anyhow::ensure!(
            (1..=MAX_RESET_TTL_MINUTES).contains(&ttl_minutes),
            "RESET_TOKEN_TTL_MINUTES must be between 1 and {MAX_RESET_TTL_MINUTES}"
        );

        let reset = ResetConfig {
            url_base: var("RESET_URL_BASE")
                .unwrap_or_else(|| "http://localhost:3000/reset-password".into()),
            ttl_minutes,
            purge_interval_secs: env_or(&var, "RESET_PURGE_INTERVAL_SECS", 0),
        };

        // argon2id defaults recommended by OWASP (19 MiB, t=2, p=1)
        let hash = HashConfig {
            memory_kib: env_or(&var, "HASH_MEMORY_KIB", 19 * 1024),
            iterations: env_or(&var, "HASH_ITERATIONS", 2),
            parallelism: env_or(&var, "HASH_PARALLELISM", 1),
        };

        Ok(Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: var("APP_PORT")
                .map(|v| v.parse::<u16>().context("APP_PORT"))
                .transpose()?
                .unwrap_or(5000),
            database_url: var("DATABASE_URL"),
            mail,
            reset,
            hash,
        })
    }
}

fn env_or<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    const SMTP: [(&str, &str); 3] = [
        ("SMTP_HOST", "smtp.example.com"),
        ("SMTP_USERNAME", "bot@example.com"),
        ("SMTP_PASSWORD", "app-password"),
    ];

    #[test]
    fn missing_smtp_is_an_error_unless_log_mode() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("SMTP_HOST"));

        let cfg = config(&[("MAIL_MODE", "log")]).expect("log mode needs no smtp");
        assert!(matches!(cfg.mail, MailConfig::Log));
    }

    #[test]
    fn smtp_settings_and_defaults() {
        let cfg = config(&SMTP).unwrap();
        let MailConfig::Smtp(smtp) = cfg.mail else {
            panic!("expected smtp mail config");
        };
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from, "bot@example.com");
        assert_eq!(cfg.reset.ttl_minutes, 10);
        assert_eq!((cfg.host.as_str(), cfg.port), ("0.0.0.0", 5000));
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn unknown_mail_mode_is_rejected() {
        assert!(config(&[("MAIL_MODE", "carrier-pigeon")]).is_err());
    }

    #[test]
    fn reset_ttl_is_bounded() {
        for bad in ["0", "-5", "1441", "10000000000", "153722867280912931", "ten"] {
            let res = config(&[("MAIL_MODE", "log"), ("RESET_TOKEN_TTL_MINUTES", bad)]);
            assert!(res.is_err(), "ttl {bad} should be rejected");
        }
        let cfg = config(&[("MAIL_MODE", "log"), ("RESET_TOKEN_TTL_MINUTES", "1440")]).unwrap();
        assert_eq!(cfg.reset.ttl_minutes, MAX_RESET_TTL_MINUTES);
    }

    #[test]
    fn listen_address_comes_from_config() {
        let cfg = config(&[("MAIL_MODE", "log"), ("APP_HOST", "127.0.0.1"), ("APP_PORT", "8081")])
            .unwrap();
        assert_eq!((cfg.host.as_str(), cfg.port), ("127.0.0.1", 8081));
        assert!(config(&[("MAIL_MODE", "log"), ("APP_PORT", "nope")]).is_err());
    }
}
