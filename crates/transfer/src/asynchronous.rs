//! Async façade over [`TransferCoordinator`].
//!
//! Every operation is blocking filesystem I/O, so each call moves to
//! `tokio::task::spawn_blocking` and keeps the runtime's worker threads free.

use std::sync::Arc;

use crate::TransferError;
use crate::coordinator::TransferCoordinator;
use crate::types::{Artifact, TransferStatus};

/// Cloneable async handle to a shared [`TransferCoordinator`].
#[derive(Debug, Clone)]
pub struct AsyncTransferCoordinator {
    inner: Arc<TransferCoordinator>,
}

impl AsyncTransferCoordinator {
    pub fn new(coordinator: TransferCoordinator) -> Self {
        Self {
            inner: Arc::new(coordinator),
        }
    }

    pub async fn put_chunk(
        &self,
        transfer_id: String,
        index: u64,
        total_expected: Option<u64>,
        data: Vec<u8>,
        checksum: Option<String>,
    ) -> Result<(), TransferError> {
        self.run(move |c| match checksum {
            Some(sum) => c.put_chunk_verified(&transfer_id, index, total_expected, &data, &sum),
            None => c.put_chunk(&transfer_id, index, total_expected, &data),
        })
        .await
    }

    pub async fn finalize(
        &self,
        transfer_id: String,
        target_name: String,
        expected_chunk_count: u64,
        expected_sha256: Option<String>,
    ) -> Result<Artifact, TransferError> {
        self.run(move |c| match expected_sha256 {
            Some(sum) => c.finalize_verified(&transfer_id, &target_name, expected_chunk_count, &sum),
            None => c.finalize(&transfer_id, &target_name, expected_chunk_count),
        })
        .await
    }

    pub async fn download_range(
        &self,
        target_name: String,
        index: u64,
        chunk_size: Option<u64>,
    ) -> Result<Vec<u8>, TransferError> {
        self.run(move |c| c.download_range(&target_name, index, chunk_size))
            .await
    }

    pub async fn status(
        &self,
        transfer_id: String,
        expected_chunk_count: Option<u64>,
    ) -> Result<TransferStatus, TransferError> {
        self.run(move |c| c.status(&transfer_id, expected_chunk_count))
            .await
    }

    pub async fn abort(&self, transfer_id: String) -> Result<(), TransferError> {
        self.run(move |c| c.abort(&transfer_id)).await
    }

    async fn run<T, F>(&self, f: F) -> Result<T, TransferError>
    where
        T: Send + 'static,
        F: FnOnce(&TransferCoordinator) -> Result<T, TransferError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| TransferError::TaskFailed(e.to_string()))?
    }
}
