use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::summary::{DEFAULT_BACKEND_URL, DEFAULT_TIMEOUT};
use crate::tracks;
use crate::youtube::{DEFAULT_FALLBACK_THRESHOLD, FetchOptions};

pub const USER_ID_ENV: &str = "YTLDR_USER_ID";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub user_id: Option<String>,
    pub preferred_languages: Option<Vec<String>>,
    pub fallback_threshold: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub default_format: Option<String>,
}

impl Config {
    /// Load config from ~/.config/ytldr/config.toml if it exists
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    /// Fetcher options with config values over the built-in defaults.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            preferred_languages: self
                .preferred_languages
                .clone()
                .filter(|langs| !langs.is_empty())
                .unwrap_or_else(tracks::default_languages),
            fallback_threshold: self.fallback_threshold.unwrap_or(DEFAULT_FALLBACK_THRESHOLD),
        }
    }

    pub fn backend_url(&self) -> &str {
        self.backend_url.as_deref().unwrap_or(DEFAULT_BACKEND_URL)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(DEFAULT_TIMEOUT)
    }

    /// The env var wins over the config file; blank values count as unset.
    pub fn user_id(&self, env_value: Option<String>) -> Option<String> {
        env_value
            .or_else(|| self.user_id.clone())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytldr")
        .join("config.toml")
}
