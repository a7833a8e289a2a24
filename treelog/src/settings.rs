//! Log Settings
//!
//! Persisted configuration for the log store: whether logging is on, where the
//! file lives and which backend reaches it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::{normalize_path, LogRoot, LogStore, DEFAULT_LOG_FILE, DEFAULT_MAX_BYTES};
use crate::provider::FsProvider;

/// Settings for the log store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Whether records are written at all
    pub enabled: bool,

    /// Log file path relative to the root
    pub path: String,

    /// Legacy backend rotates once the file grows past this many bytes
    pub max_bytes: u64,

    /// Where the log lives
    pub backend: BackendSettings,
}

/// Which backend reaches the log file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSettings {
    /// Plain file under `base_dir`, rotated by size
    Legacy { base_dir: PathBuf },
    /// File located by name anywhere below `root_dir`
    Tree { root_dir: PathBuf },
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: DEFAULT_LOG_FILE.to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
            backend: BackendSettings::default(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        let base_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        BackendSettings::Legacy { base_dir }
    }
}

impl LogSettings {
    /// Build the configured root
    pub fn root(&self) -> Result<LogRoot> {
        match &self.backend {
            BackendSettings::Legacy { base_dir } => Ok(LogRoot::Path(base_dir.clone())),
            BackendSettings::Tree { root_dir } => {
                let provider = FsProvider::new(root_dir.clone())
                    .with_context(|| format!("Failed to open tree root {:?}", root_dir))?;
                let root = provider.root_handle();
                Ok(LogRoot::tree(Arc::new(provider), root))
            }
        }
    }

    /// Push these settings into `store`
    pub fn apply(&self, store: &LogStore) -> Result<()> {
        store.set_path(&self.path);
        store.set_max_bytes(self.max_bytes);
        store.configure(Some(self.root()?), self.enabled);
        Ok(())
    }
}

/// Default settings file location under the platform config directory
pub fn default_settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(config_dir.join("treelog").join("settings.json"))
}

/// Load settings from disk
pub fn load_settings(path: &Path) -> Result<LogSettings> {
    if !path.exists() {
        return Ok(LogSettings::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings {:?}", path))?;
    let mut settings: LogSettings = serde_json::from_str(&content)
        .with_context(|| format!("Invalid settings file {:?}", path))?;
    settings.path = normalize_path(&settings.path);
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(path: &Path, settings: &LogSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
