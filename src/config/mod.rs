use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

use crate::errors::AppError;
use crate::models::UpdateInterval;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the persisted JSON documents
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total request timeout for one playlist download
    #[serde(default = "default_fetch_timeout", with = "duration")]
    pub timeout: Duration,
    #[serde(default = "default_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Playlists refreshed in parallel by a refresh-all run
    #[serde(default = "default_max_concurrent_refreshes")]
    pub max_concurrent_refreshes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Category for channels without group metadata
    #[serde(default = "default_category")]
    pub default_category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Interval used until the user picks one; must be an allowed value
    #[serde(default = "default_update_interval_minutes")]
    pub default_interval_minutes: u32,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_fetch_timeout() -> Duration {
    parse_default_duration(DEFAULT_FETCH_TIMEOUT, 30)
}

fn default_connect_timeout() -> Duration {
    parse_default_duration(DEFAULT_CONNECT_TIMEOUT, 10)
}

fn parse_default_duration(value: &str, fallback_secs: u64) -> Duration {
    humantime::parse_duration(value).unwrap_or(Duration::from_secs(fallback_secs))
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn default_max_concurrent_refreshes() -> usize {
    DEFAULT_MAX_CONCURRENT_REFRESHES
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_update_interval_minutes() -> u32 {
    DEFAULT_UPDATE_INTERVAL_MINUTES
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
            max_concurrent_refreshes: default_max_concurrent_refreshes(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_category: default_category(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_interval_minutes: default_update_interval_minutes(),
        }
    }
}

impl ScheduleConfig {
    pub fn default_interval(&self) -> Result<UpdateInterval, AppError> {
        UpdateInterval::try_from(self.default_interval_minutes)
    }
}

impl Config {
    pub fn load_from_file(config_file: impl AsRef<Path>) -> Result<Self> {
        let config_file = config_file.as_ref();
        let config = if config_file.exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = config_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file.display());
            default_config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.schedule.default_interval()?;
        if self.fetch.max_concurrent_refreshes == 0 {
            return Err(AppError::config("fetch.max_concurrent_refreshes must be at least 1"));
        }
        if self.fetch.timeout.is_zero() {
            return Err(AppError::config("fetch.timeout must be greater than zero"));
        }
        if self.parser.default_category.trim().is_empty() {
            return Err(AppError::config("parser.default_category must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [fetch]
            timeout = "5s"

            [schedule]
            default_interval_minutes = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.fetch.timeout, Duration::from_secs(5));
        assert_eq!(config.fetch.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.fetch.max_concurrent_refreshes, 4);
        assert_eq!(config.parser.default_category, "Uncategorized");
        assert_eq!(
            config.schedule.default_interval().unwrap(),
            UpdateInterval::Hourly
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_numeric_timeout_is_seconds() {
        let config: Config = toml::from_str("[fetch]\ntimeout = 12\n").unwrap();
        assert_eq!(config.fetch.timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_invalid_default_interval_rejected() {
        let config: Config = toml::from_str("[schedule]\ndefault_interval_minutes = 999\n").unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config { .. })));
    }

    #[test]
    fn test_load_writes_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = Config::load_from_file(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.schedule.default_interval_minutes, 360);

        let reloaded = Config::load_from_file(&path).unwrap();
        assert_eq!(reloaded.fetch.timeout, config.fetch.timeout);
        assert_eq!(reloaded.storage.data_dir, config.storage.data_dir);
    }
}
