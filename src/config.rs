use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::ConfigError;

const ENV_PREFIX: &str = "QUAKE";
const CONFIG_FILE: &str = "quake";
const MAX_ATTEMPTS: u32 = 10;
const DEFAULT_BASE_URL: &str = "https://earthquake.phivolcs.dost.gov.ph/";

/// Validated runtime settings, shared by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub base_url: Url,
    pub request_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub progress_every: usize,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    db_path: Option<String>,
    base_url: String,
    request_delay_ms: u64,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
    max_attempts: u32,
    retry_base_ms: u64,
    progress_every: usize,
}

impl AppConfig {
    /// Defaults, then `quake.toml` if present, then `QUAKE_*` variables,
    /// then an explicit database path from the command line.
    pub fn load(db_override: Option<&Path>) -> Result<Self, ConfigError> {
        let raw: RawConfig = config::Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("request_delay_ms", 1000)?
            .set_default("connect_timeout_secs", 15)?
            .set_default("read_timeout_secs", 60)?
            .set_default("max_attempts", 3)?
            .set_default("retry_base_ms", 1000)?
            .set_default("progress_every", 50)?
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("db_path", db_override.map(|p| p.display().to_string()))?
            .build()?
            .try_deserialize()?;
        raw.validate()
    }

    /// Default settings that never touch the environment.
    #[cfg(test)]
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            base_url: Url::parse(DEFAULT_BASE_URL).unwrap(),
            request_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_base: Duration::from_millis(1000),
            progress_every: 50,
        }
    }
}

impl RawConfig {
    fn validate(self) -> Result<AppConfig, ConfigError> {
        let db_path = self
            .db_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::Missing("db_path"))?;

        let base_url = normalize_base_url(&self.base_url)?;

        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "connect_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "read_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS {
            return Err(ConfigError::Invalid {
                key: "max_attempts",
                reason: format!("must be between 1 and {}", MAX_ATTEMPTS),
            });
        }
        if self.progress_every == 0 {
            return Err(ConfigError::Invalid {
                key: "progress_every",
                reason: "must be at least 1".into(),
            });
        }

        Ok(AppConfig {
            db_path: PathBuf::from(db_path),
            base_url,
            request_delay: Duration::from_millis(self.request_delay_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            max_attempts: self.max_attempts,
            retry_base: Duration::from_millis(self.retry_base_ms),
            progress_every: self.progress_every,
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut s = raw.trim().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    let url = Url::parse(&s).map_err(|e| ConfigError::Invalid {
        key: "base_url",
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            key: "base_url",
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}
