//! Configuration file support for Regimen.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/regimen/config.toml`.

use crate::{Error, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub habits: HabitsConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn habits_path(&self) -> PathBuf {
        self.data_dir.join("habits.json")
    }

    pub fn doses_path(&self) -> PathBuf {
        self.data_dir.join("doses.jsonl")
    }
}

/// External matcher connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_matcher_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_matcher_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            endpoint: default_matcher_endpoint(),
            timeout_secs: default_matcher_timeout_secs(),
        }
    }
}

/// Fallbacks used when no habit file exists yet
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HabitsConfig {
    #[serde(default = "default_tz")]
    pub default_tz: Tz,
}

impl Default for HabitsConfig {
    fn default() -> Self {
        Self {
            default_tz: default_tz(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("regimen")
}

fn default_matcher_endpoint() -> String {
    "http://127.0.0.1:5000/match".into()
}

fn default_matcher_timeout_secs() -> u64 {
    10
}

fn default_tz() -> Tz {
    crate::clock::DEFAULT_TZ
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.check()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values that parse but cannot work
    pub fn check(&self) -> Result<()> {
        if self.matcher.timeout_secs == 0 {
            return Err(Error::Config(
                "matcher.timeout_secs must be at least 1".into(),
            ));
        }
        if self.matcher.endpoint.trim().is_empty() {
            return Err(Error::Config("matcher.endpoint must not be empty".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("regimen").join("config.toml")
    }
}
