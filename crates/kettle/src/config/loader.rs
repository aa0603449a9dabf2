//! Device Loader
//!
//! Loads and checks `device.toml`.

use std::collections::HashSet;
use std::path::Path;

use tokio::fs;
use tracing::info;

use super::*;

/// Error type for config loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Config file does not exist: {0}")]
    PathNotFound(std::path::PathBuf),

    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Device config loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a device file from the given path
    pub async fn load(path: impl AsRef<Path>) -> Result<DeviceConfig, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::PathNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        info!(
            "Loaded device config: {} ({}), {} processes, {} resources",
            config.device.name,
            config.device.address,
            config.processes.len(),
            config.resources.len()
        );
        Ok(config)
    }

    /// Parse and check a device file
    pub fn parse(content: &str) -> Result<DeviceConfig, LoadError> {
        let config: DeviceConfig = toml::from_str(content)?;
        Self::check(&config)?;
        Ok(config)
    }

    fn check(config: &DeviceConfig) -> Result<(), LoadError> {
        if config.device.address.trim().is_empty() {
            return Err(LoadError::Invalid("device.address is empty".into()));
        }
        if config.runtime.tick_interval_ms == 0 || config.runtime.drain_interval_ms == 0 {
            return Err(LoadError::Invalid("intervals must be positive".into()));
        }

        let mut ids = HashSet::new();
        for resource in &config.resources {
            if resource.id.trim().is_empty() {
                return Err(LoadError::Invalid("resource with empty id".into()));
            }
            if !ids.insert(resource.id.as_str()) {
                return Err(LoadError::Invalid(format!(
                    "duplicate resource id: {}",
                    resource.id
                )));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
