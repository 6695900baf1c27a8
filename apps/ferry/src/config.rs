//! ferry configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/bulkferry/ferry.toml`
//! - Windows: `%APPDATA%/bulkferry/ferry.toml`

use std::path::{Path, PathBuf};

use anyhow::Context;
use bulkferry_engine::TransferConfig;
use serde::{Deserialize, Serialize};

/// ferry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FerryConfig {
    /// Directory backing the object store.
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,

    /// Concurrency and multipart settings.
    #[serde(default)]
    pub transfers: TransferConfig,
}

impl Default for FerryConfig {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            transfers: TransferConfig::default(),
        }
    }
}

impl FerryConfig {
    /// Loads configuration from the default location, creating it with
    /// defaults if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = FerryConfig::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Loads configuration from an explicit file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: FerryConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.transfers.validate()?;
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("bulkferry")
            .join("ferry.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("bulkferry").join("ferry.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/bulkferry/ferry.toml"))
    }
}

/// Default store directory.
fn default_store_root() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let local = std::env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| "C:\\Users\\Default\\AppData\\Local".into());
        PathBuf::from(local).join("bulkferry").join("store")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("bulkferry")
            .join("store")
    }
}
