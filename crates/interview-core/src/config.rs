use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Overrides `api_base_url` when set.
pub const API_URL_ENV: &str = "INTERVIEW_API_URL";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub model: String,
    /// Where generated documents are saved; `None` means the platform
    /// download directory.
    pub download_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            download_dir: None,
        }
    }
}

impl Config {
    /// Load from the user config directory, falling back to defaults when no
    /// file exists yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Invalid config file {:?}: {}", path, e))?;
        Ok(config)
    }

    /// Load and apply environment overrides. Unreadable config falls back to
    /// defaults with a warning.
    pub fn resolve() -> Self {
        let config = Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not load config, using defaults");
            Self::default()
        });
        config.with_env_overrides(std::env::var(API_URL_ENV).ok())
    }

    fn with_env_overrides(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        self
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Directory generated documents are written to.
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("interview-assistant").join("config.json"))
    }
}
