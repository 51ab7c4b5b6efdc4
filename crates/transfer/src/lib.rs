//! Chunked file transfer: staging, atomic reassembly and ranged download.
//!
//! Chunks of a transfer are staged under `{root}/{transfer_id}/chunk_{index}`.
//! Finalizing merges them in index order into a temp file that is renamed
//! onto `{root}/{target_name}`, so readers never observe a partial artifact.
//! All state lives on disk; the [`TransferCoordinator`] keeps nothing but
//! per-transfer locks in memory.

mod asynchronous;
mod checksum;
mod config;
mod coordinator;
mod handler;
mod locks;
mod range;
mod reassemble;
mod store;
mod types;
mod validation;

pub use asynchronous::AsyncTransferCoordinator;
pub use checksum::{HashingWriter, calculate_file_checksum, checksum_bytes, verify_checksum};
pub use config::TransferConfig;
pub use coordinator::TransferCoordinator;
pub use handler::TransferHandler;
pub use locks::{TransferLock, TransferLocks};
pub use range::RangeReader;
pub use reassemble::Reassembler;
pub use store::ChunkStore;
pub use types::{Artifact, TransferStatus};
pub use validation::{validate_target_name, validate_transfer_id};

/// Default download range size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = chunkyard_protocol::DEFAULT_RANGE_CHUNK_SIZE;

/// Default upper bound for a single chunk or range: 64 MiB.
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("chunk {index} of transfer {transfer_id} not found")]
    ChunkNotFound { transfer_id: String, index: u64 },

    #[error("transfer {transfer_id} is incomplete, missing chunks {missing:?}")]
    IncompleteTransfer {
        transfer_id: String,
        missing: Vec<u64>,
    },

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("worker task failed: {0}")]
    TaskFailed(String),
}

impl TransferError {
    /// Returns `true` if the caller can recover by re-issuing the operation
    /// (possibly after re-uploading the chunks the error names).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::StorageIo(_)
                | TransferError::IncompleteTransfer { .. }
                | TransferError::ChecksumMismatch { .. }
        )
    }

    /// Missing chunk indices, if this is an [`IncompleteTransfer`](Self::IncompleteTransfer).
    pub fn missing_indices(&self) -> &[u64] {
        match self {
            TransferError::IncompleteTransfer { missing, .. } => missing,
            _ => &[],
        }
    }
}
