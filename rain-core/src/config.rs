use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{classifier::ModelId, defaults::DefaultConfig, model::WeatherRecord};

/// Artifact directory used when none is configured.
pub const DEFAULT_ARTIFACTS_DIR: &str = "./saved_models";

/// Credentials for the WeatherAPI.com fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// artifacts_dir = "/opt/rain/saved_models"
/// default_model = "tree"
///
/// [weatherapi]
/// api_key = "..."
///
/// [defaults]
/// Location = "Melbourne"
/// MinTemp = 9.5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub artifacts_dir: Option<PathBuf>,

    /// Model id or alias, e.g. "forest" or "tree".
    pub default_model: Option<String>,

    pub weatherapi: Option<ProviderConfig>,

    /// Per-field overrides of the built-in fill values.
    pub defaults: Option<WeatherRecord>,
}

impl Config {
    /// The configured default model, falling back to the random forest.
    pub fn default_model_id(&self) -> Result<ModelId> {
        match &self.default_model {
            Some(s) => ModelId::try_from(s.as_str()).map_err(|e| {
                anyhow!("{e}\nHint: run `rain configure` to pick a supported default model.")
            }),
            None => Ok(ModelId::Forest),
        }
    }

    pub fn set_default_model(&mut self, id: ModelId) {
        self.default_model = Some(id.as_str().to_string());
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.weatherapi = Some(ProviderConfig { api_key });
    }

    /// Returns the WeatherAPI key, if present.
    pub fn api_key(&self) -> Option<&str> {
        self.weatherapi.as_ref().map(|cfg| cfg.api_key.as_str())
    }

    pub fn artifacts_dir_or_default(&self) -> &Path {
        self.artifacts_dir.as_deref().unwrap_or_else(|| Path::new(DEFAULT_ARTIFACTS_DIR))
    }

    /// Fill values with the configured overrides applied.
    pub fn default_config(&self) -> DefaultConfig {
        match &self.defaults {
            Some(overrides) => DefaultConfig::with_overrides(overrides),
            None => DefaultConfig::default(),
        }
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "saved config");
        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "rain-predict", "rain-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
