use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A published, fully assembled artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Logical name under the storage root.
    pub target_name: String,
    /// Absolute or root-relative location on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 hex digest of the content.
    pub sha256: String,
}

/// Staged state of a transfer, derived from storage contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferStatus {
    pub transfer_id: String,
    /// Indices durably staged, ascending.
    pub received: Vec<u64>,
    /// Indices in `0..expected` not yet staged; empty when no count was given.
    pub missing: Vec<u64>,
    /// Sum of staged chunk sizes.
    pub staged_bytes: u64,
}

impl TransferStatus {
    /// Returns `true` if nothing is staged for this transfer.
    pub fn is_empty(&self) -> bool {
        self.received.is_empty()
    }
}

/// Record left in the storage root once a transfer has been published.
///
/// A repeated finalize is only answered from the existing artifact when
/// this record names the same target and chunk count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Completion {
    pub transfer_id: String,
    pub target_name: String,
    pub chunk_count: u64,
    pub sha256: String,
}

impl From<TransferStatus> for chunkyard_protocol::messages::TransferStatusResponse {
    fn from(status: TransferStatus) -> Self {
        Self {
            transfer_id: status.transfer_id,
            received: status.received,
            missing: status.missing,
            staged_bytes: status.staged_bytes,
        }
    }
}

impl From<Artifact> for chunkyard_protocol::messages::FinalizeResponse {
    fn from(artifact: Artifact) -> Self {
        Self {
            target_name: artifact.target_name,
            size: artifact.size,
            sha256: artifact.sha256,
        }
    }
}
