//! Configuration types for Quarry.
//!
//! A single [`QuarryConfig`] combines the database target and the MCP server
//! settings. It can be loaded from a YAML file (`quarry.yaml`) and is then
//! overridden by environment keys.
//!
//! ```yaml
//! database:
//!   path: ./data/app.db
//!   timeout_ms: 5000
//! mcp:
//!   transport: http
//!   host: 0.0.0.0
//!   port: 3000
//! ```

pub mod database;
pub mod mcp;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use database::{BackingStoreTarget, DatabaseConfig};
pub use mcp::{McpConfig, Transport};

/// Complete Quarry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarryConfig {
    /// Backing database.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// MCP server settings.
    #[serde(default)]
    pub mcp: McpConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Neither a remote URL nor a local path is configured.
    #[error("database not configured: set DB_URL (remote) or DB_PATH (local)")]
    NotConfigured,

    /// A configuration value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl QuarryConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load the optional file at `path`, then apply the process environment.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Same as [`QuarryConfig::load`] with an explicit environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Loading configuration file");
                Self::from_file(path)?
            }
            Some(path) => {
                tracing::debug!(path = %path.display(), "Configuration file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.database.apply_env(lookup)?;
        Ok(config)
    }
}
