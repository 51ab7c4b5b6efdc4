//! Storage configuration passed explicitly to every component.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNK_SIZE, TransferError};

/// Configuration of a storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Directory holding staging areas and published artifacts.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Range size used when a download does not specify one.
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: u64,

    /// Largest chunk accepted on upload and largest range served on download.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,

    /// `fsync` chunk and artifact data (and their directories) before
    /// reporting success.
    #[serde(default = "default_true")]
    pub sync_writes: bool,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_chunk_size() -> u64 {
    DEFAULT_MAX_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            default_chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            sync_writes: default_true(),
        }
    }
}

impl TransferConfig {
    /// Creates a config for `storage_root` with every other field defaulted.
    pub fn with_root(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    /// Checks the sizes and root for consistency.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(TransferError::InvalidArgument(
                "storage root must not be empty".into(),
            ));
        }
        if self.default_chunk_size == 0 || self.max_chunk_size == 0 {
            return Err(TransferError::InvalidArgument(
                "chunk sizes must be positive".into(),
            ));
        }
        if self.default_chunk_size > self.max_chunk_size {
            return Err(TransferError::InvalidArgument(format!(
                "default chunk size {} exceeds max chunk size {}",
                self.default_chunk_size, self.max_chunk_size
            )));
        }
        Ok(())
    }
}
