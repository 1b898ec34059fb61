//! Configuration management for buildx-step

pub mod schema;

pub use schema::{
    ArtifactConfig, BuildConfig, BuilderConfig, CacheCredentials, Config, DaemonConfig,
    GeneralConfig, LoginConfig, PipelineConfig, ProxySettings,
};

use crate::error::{StepError, StepResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name discovered in the working directory when no path is given
pub const LOCAL_CONFIG_FILE: &str = ".buildx-step.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for an explicit file
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Find a local config file in `dir`, if one exists
    pub fn find_local_config(dir: &Path) -> Option<PathBuf> {
        let candidate = dir.join(LOCAL_CONFIG_FILE);
        candidate.is_file().then_some(candidate)
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub async fn load(&self) -> StepResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a file that must exist
    pub async fn load_required(&self) -> StepResult<Config> {
        if !self.config_path.exists() {
            return Err(StepError::ConfigNotFound(self.config_path.clone()));
        }
        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> StepResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StepError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| StepError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
