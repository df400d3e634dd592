//! YAML configuration I/O
//!
//! Loading never fails: a missing or broken file falls back to defaults so a
//! typo in the config cannot stop a performance from starting.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a config from YAML, falling back to `T::default()`
///
/// Missing file: info log. Unreadable or unparseable file: warning.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("Config: {} not found, using defaults", path.display());
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("Config: failed to read {}: {}, using defaults", path.display(), e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("Config: loaded {}", path.display());
            config
        }
        Err(e) => {
            log::warn!("Config: failed to parse {}: {}, using defaults", path.display(), e);
            T::default()
        }
    }
}

/// Write a config as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;

    log::info!("Config: saved {}", path.display());
    Ok(())
}
