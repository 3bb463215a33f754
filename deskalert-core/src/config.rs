//! Application configuration.
//!
//! Read from a TOML file (`DESKALERT_CONFIG`, falling back to
//! `deskalert.toml` in the working directory). Every field has a default, so
//! a missing file or a partial file is fine.

use crate::{ConfigError, CoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "DESKALERT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "deskalert.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub log_filter: String,
    pub poller: PollerSettings,
    pub fetcher: FetcherSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Leave disabled alerts out of each cycle. Off by default: disabled
    /// alerts have always been polled, and changing that is a product call.
    pub skip_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub desktop: bool,
    pub status_log_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://deskalert.db".to_string(),
            log_filter: "deskalert=info,background_service=info,database=info,web_client=info"
                .to_string(),
            poller: PollerSettings::default(),
            fetcher: FetcherSettings::default(),
            notifications: NotificationSettings::default(),
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            fetch_timeout_secs: 30,
            skip_disabled: false,
        }
    }
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("deskalert/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            method: "GET".to_string(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            desktop: false,
            status_log_capacity: 500,
        }
    }
}

impl PollerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl FetcherSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        let config: AppConfig = toml::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }),
            _ => CoreError::Io(e),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from the configured path. Only an explicitly requested file is
    /// required to exist; the default file is optional.
    pub fn load() -> Result<Self, CoreError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(&PathBuf::from(path)),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    tracing::info!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "database_url must not be empty".to_string(),
            });
        }
        for (field, value) in [
            ("poller.interval_secs", self.poller.interval_secs),
            ("poller.fetch_timeout_secs", self.poller.fetch_timeout_secs),
            ("fetcher.timeout_secs", self.fetcher.timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }
        if !matches!(self.fetcher.method.to_ascii_uppercase().as_str(), "GET" | "POST") {
            return Err(ConfigError::InvalidValue {
                field: "fetcher.method".to_string(),
                value: self.fetcher.method.clone(),
            });
        }
        if self.notifications.status_log_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notifications.status_log_capacity".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
