//! Configuration management for the Latchkey shared library
//!
//! Desktop applications persist manager settings as a TOML document in
//! the per-user configuration directory. Mobile platforms typically
//! handle configuration through their native frameworks and construct
//! the manager with defaults instead.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sources::DEFAULT_EVENT_CAPACITY;

/// Errors from loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for the source manager and its storage backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Depth of every notification channel
    pub event_capacity: usize,

    /// Storage backend settings
    pub storage: StorageSettings,
}

/// Where the file-backed store keeps its data
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path of the store document; `None` selects the per-user default
    /// location
    pub store_path: Option<PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            storage: StorageSettings::default(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from `path`
    ///
    /// A missing file yields the default configuration; an unreadable
    /// or malformed file is an error.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Save configuration to `path`, creating parent directories as
    /// needed
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Resolved path of the store document
    pub fn store_path(&self) -> PathBuf {
        self.storage
            .store_path
            .clone()
            .unwrap_or_else(default_store_path)
    }
}

/// Default per-user location of the store document
pub fn default_store_path() -> PathBuf {
    config_base_dir().join("sources.json")
}

/// Default per-user location of the configuration file
pub fn default_config_path() -> PathBuf {
    config_base_dir().join("config.toml")
}

fn config_base_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("latchkey")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.storage.store_path.is_none());
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ManagerConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = ManagerConfig {
            event_capacity: 128,
            storage: StorageSettings {
                store_path: Some(PathBuf::from("/var/lib/latchkey/sources.json")),
            },
        };
        config.save_to(&path).unwrap();

        let loaded = ManagerConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "event_capacity = 8\n").unwrap();

        let config = ManagerConfig::load_from(&path).unwrap();
        assert_eq!(config.event_capacity, 8);
        assert!(config.storage.store_path.is_none());
    }

    #[test]
    fn test_store_path_resolution() {
        let mut config = ManagerConfig::default();
        assert!(config.store_path().ends_with("sources.json"));

        config.storage.store_path = Some(PathBuf::from("/tmp/custom.json"));
        assert_eq!(config.store_path(), PathBuf::from("/tmp/custom.json"));
    }
}
