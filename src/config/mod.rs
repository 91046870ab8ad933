use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const USERNAME_PLACEHOLDER: &str = "{username}";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} template must contain {{username}}")]
    MissingPlaceholder(&'static str),

    #[error("cache_expire_minutes must be greater than zero")]
    ZeroExpiry,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub address: String,
    pub repository: RepositoryConfig,
}

/// Where skin bytes come from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Access {
    File,
    Url,
}

/// How fetched bytes are decoded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Format {
    /// Standard image container (PNG and friends)
    Common,
    /// Headerless 64x64 RGBA stream
    Byte,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    pub access: Access,
    #[serde(rename = "type")]
    pub format: Format,
    pub skin_path: String,
    pub cape_path: String,
    #[serde(default = "default_cache_expire_minutes")]
    pub cache_expire_minutes: u64,
    /// Seconds allowed for a network fetch.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub cache_max_entries: Option<usize>,
}

fn default_cache_expire_minutes() -> u64 {
    10
}

fn default_timeout() -> u64 {
    5
}

impl RepositoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.skin_path.contains(USERNAME_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder("skin_path"));
        }
        if !self.cape_path.contains(USERNAME_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder("cape_path"));
        }
        if self.cache_expire_minutes == 0 {
            return Err(ConfigError::ZeroExpiry);
        }
        Ok(())
    }

    pub fn cache_expiry(&self) -> Duration {
        Duration::from_secs(self.cache_expire_minutes * 60)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
