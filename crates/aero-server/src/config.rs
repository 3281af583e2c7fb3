//! Application configuration.

use crate::error::{AppError, AppResult};
use aero_dashboard::DashboardConfig;
use serde::{Deserialize, Serialize};

/// Where readings are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Daily JSON Lines files under `data_dir`.
    #[default]
    Jsonl,
    /// Process memory only; nothing survives a restart.
    Memory,
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory for the readings collection.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data/readings".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.dashboard.live_window == 0 {
            return Err(AppError::Config(
                "dashboard.live_window must be at least 1".to_string(),
            ));
        }
        if self.dashboard.broadcast_capacity == 0 {
            return Err(AppError::Config(
                "dashboard.broadcast_capacity must be at least 1".to_string(),
            ));
        }
        if self.dashboard.broadcast_capacity < self.dashboard.live_window {
            return Err(AppError::Config(format!(
                "dashboard.broadcast_capacity ({}) must be at least dashboard.live_window ({})",
                self.dashboard.broadcast_capacity, self.dashboard.live_window
            )));
        }
        Ok(())
    }
}
