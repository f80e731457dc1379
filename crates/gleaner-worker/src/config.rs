//! WorkerConfig - 環境変数から設定を読む
//!
//! 読むのは起動時の 1 回だけ。ここでのエラーだけがプロセスを止める。

use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gleaner_chromium::ChromiumConfig;
use gleaner_core::app::{BackoffPolicy, PipelineConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("cannot resolve worker identity: {0}")]
    Identity(String),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub api_host: String,
    pub api_port: u16,
    pub database_url: String,
    /// Same as `database_url` unless set separately.
    pub staging_database_url: String,
    pub source_timeout: Duration,
    pub pipeline: PipelineConfig,
    pub browser: ChromiumConfig,
    /// Operator-provided identity; the egress IP is looked up when unset.
    pub worker_identity: Option<String>,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&get);

        let api_host = env.required("API_HOST")?;
        let api_port = env.parse("API_PORT", 80u16)?;

        let database_url = match env.optional("DATABASE_URL") {
            Some(url) => url,
            None => env.postgres_url()?,
        };
        let staging_database_url = env
            .optional("STAGING_DATABASE_URL")
            .unwrap_or_else(|| database_url.clone());

        let defaults = PipelineConfig::default();
        let backoff_defaults = BackoffPolicy::default();
        let pipeline = PipelineConfig {
            navigation_timeout: env.secs("NAVIGATION_TIMEOUT_SECS", 60)?,
            session_open_timeout: env.secs("SESSION_OPEN_TIMEOUT_SECS", 60)?,
            store_timeout: env.secs("STORE_TIMEOUT_SECS", 30)?,
            recovery_batch_size: env.positive("RECOVERY_BATCH_SIZE", defaults.recovery_batch_size)?,
            max_recovery_attempts: env.positive("MAX_RECOVERY_ATTEMPTS", defaults.max_recovery_attempts)?,
            recovery_item_delay: env.secs("RECOVERY_ITEM_DELAY_SECS", 2)?,
            backoff: BackoffPolicy {
                short: env.secs("BACKOFF_SHORT_SECS", 5)?,
                error: env.secs("BACKOFF_ERROR_SECS", 30)?,
                recovery: env.secs("BACKOFF_RECOVERY_SECS", 100)?,
                ..backoff_defaults
            },
        };

        let browser = ChromiumConfig {
            executable: env.optional("BROWSER_EXECUTABLE").map(PathBuf::from),
            headless: env.flag("BROWSER_HEADLESS", true)?,
            ..ChromiumConfig::default()
        };

        Ok(Self {
            api_host,
            api_port,
            database_url,
            staging_database_url,
            source_timeout: env.secs("SOURCE_TIMEOUT_SECS", 30)?,
            pipeline,
            browser,
            worker_identity: env.optional("WORKER_IDENTITY"),
        })
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Unset and blank are the same thing.
    fn optional(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.optional(var).ok_or(ConfigError::Missing(var))
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(var) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: format!("{raw:?}: {e}"),
            }),
        }
    }

    fn positive<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialEq,
        T::Err: Display,
    {
        let value = self.parse(var, default)?;
        if value == T::default() {
            return Err(ConfigError::Invalid {
                var,
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(value)
    }

    fn secs(&self, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(var, default).map(Duration::from_secs)
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(var).map(|v| v.to_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(v) => Err(ConfigError::Invalid {
                var,
                reason: format!("{v:?} is not a boolean"),
            }),
        }
    }

    fn postgres_url(&self) -> Result<String, ConfigError> {
        let user = self
            .optional("POSTGRES_USER")
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let db = self.required("POSTGRES_DB")?;
        let host = self
            .optional("POSTGRES_HOST")
            .unwrap_or_else(|| "localhost".to_string());
        let port = self.parse("POSTGRES_PORT", 5432u16)?;

        Ok(match self.optional("POSTGRES_PASSWORD") {
            Some(password) => format!("postgres://{user}:{password}@{host}:{port}/{db}"),
            None => format!("postgres://{user}@{host}:{port}/{db}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn load(pairs: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    const BASE: [(&str, &str); 2] = [
        ("API_HOST", "queue.internal"),
        ("DATABASE_URL", "postgres://u:p@db:5432/parts"),
    ];

    #[test]
    fn defaults_match_the_documented_values() {
        let config = load(&BASE).unwrap();

        assert_eq!(config.api_port, 80);
        assert_eq!(config.staging_database_url, config.database_url);
        assert_eq!(config.source_timeout, Duration::from_secs(30));
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert!(config.browser.headless);
        assert!(config.worker_identity.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("API_PORT", "8080"),
            ("STAGING_DATABASE_URL", "postgres://u:p@cache:5432/staging"),
            ("RECOVERY_BATCH_SIZE", "50"),
            ("BACKOFF_ERROR_SECS", "10"),
            ("BROWSER_HEADLESS", "false"),
            ("WORKER_IDENTITY", "worker-7"),
        ]);

        let config = load(&pairs).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.staging_database_url, "postgres://u:p@cache:5432/staging");
        assert_eq!(config.pipeline.recovery_batch_size, 50);
        assert_eq!(config.pipeline.backoff.error, Duration::from_secs(10));
        assert!(!config.browser.headless);
        assert_eq!(config.worker_identity.as_deref(), Some("worker-7"));
    }

    #[test]
    fn database_url_is_built_from_parts() {
        let config = load(&[
            ("API_HOST", "queue.internal"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_USER", "scraper"),
            ("POSTGRES_PASSWORD", "secret"),
            ("POSTGRES_DB", "parts"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "postgres://scraper:secret@db:5432/parts");
    }

    #[rstest]
    #[case(&[("DATABASE_URL", "postgres://x")], "API_HOST")]
    #[case(&[("API_HOST", "q")], "DATABASE_URL")]
    #[case(&[("API_HOST", "  "), ("DATABASE_URL", "postgres://x")], "API_HOST")]
    fn missing_required(#[case] pairs: &[(&str, &str)], #[case] var: &str) {
        assert!(matches!(load(pairs), Err(ConfigError::Missing(v)) if v == var));
    }

    #[rstest]
    #[case("API_PORT", "eighty")]
    #[case("API_PORT", "70000")]
    #[case("NAVIGATION_TIMEOUT_SECS", "-1")]
    #[case("MAX_RECOVERY_ATTEMPTS", "0")]
    #[case("BROWSER_HEADLESS", "maybe")]
    fn invalid_values(#[case] var: &str, #[case] value: &str) {
        let mut pairs = BASE.to_vec();
        pairs.push((var, value));
        assert!(matches!(load(&pairs), Err(ConfigError::Invalid { var: v, .. }) if v == var));
    }
}
