// Store configuration

use crate::backend::{Backend, FileBackend, SqliteBackend};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the optional config file inside the store directory
pub const CONFIG_FILE: &str = "config.yaml";

/// Per-store settings, read from `config.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where collections are persisted
    pub backend: BackendKind,
    /// Seed the default categories when no categories were ever saved
    pub seed_defaults: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Jsonl,
            seed_defaults: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Jsonl,
    Sqlite,
}

impl Config {
    /// Load `config.yaml` from `dir`, falling back to defaults when absent
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Open the configured backend rooted at `dir`
    pub fn open_backend<P: AsRef<Path>>(&self, dir: P) -> Result<Box<dyn Backend>> {
        let backend: Box<dyn Backend> = match self.backend {
            BackendKind::Jsonl => Box::new(FileBackend::open(dir)?),
            BackendKind::Sqlite => Box::new(SqliteBackend::open(dir)?),
        };
        Ok(backend)
    }
}

/// Platform data directory for the store, or `./.taskboard` when unknown
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("taskboard"))
        .unwrap_or_else(|| PathBuf::from(".taskboard"))
}
