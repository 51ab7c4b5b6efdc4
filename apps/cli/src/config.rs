//! CLI configuration.
//!
//! Stored as TOML, by default `chunkyard.toml` in the working directory:
//!
//! ```toml
//! [transfer]
//! storage_root = "/var/lib/chunkyard"
//! sync_writes = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use chunkyard_transfer::TransferConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Applies command-line overrides.
    pub fn with_root_override(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.transfer.storage_root = root;
        }
        self
    }
}
