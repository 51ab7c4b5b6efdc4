use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::TransferError;
use crate::checksum::{HashingWriter, verify_checksum};
use crate::store::{ChunkStore, remove_temp, sync_dir};
use crate::types::{Artifact, Completion};
use crate::validation::validate_target_name;

/// Output buffer for the artifact temp file (256 KB).
const WRITE_BUFFER_SIZE: usize = 256 * 1024;

/// Merges a complete set of staged chunks into a published artifact.
///
/// Callers must hold the transfer's exclusive lock; the reassembler itself
/// does not coordinate with concurrent uploads.
#[derive(Debug, Clone)]
pub struct Reassembler {
    store: ChunkStore,
}

impl Reassembler {
    /// Creates a reassembler publishing into `store`'s root, with the same
    /// durability setting as the store.
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }

    /// Assembles chunks `0..expected_chunk_count` of `transfer_id` into
    /// `{root}/{target_name}` and purges the staging area.
    ///
    /// Fails without writing anything if the received set is not exactly
    /// `{0, .., expected_chunk_count - 1}`. On any failure after that point
    /// the temp file is removed while the staging area and any previous
    /// artifact stay untouched.
    pub fn assemble(
        &self,
        transfer_id: &str,
        target_name: &str,
        expected_chunk_count: u64,
        expected_sha256: Option<&str>,
    ) -> Result<Artifact, TransferError> {
        let target_path = self.target_path(transfer_id, target_name)?;

        let received = self.store.list_received(transfer_id)?;
        check_complete(transfer_id, &received, expected_chunk_count)?;

        let temp_path = self
            .store
            .root()
            .join(format!(".partial-{}", uuid::Uuid::new_v4()));

        let (size, sha256) =
            match self.write_temp(transfer_id, expected_chunk_count, &temp_path) {
                Ok(written) => written,
                Err(e) => {
                    remove_temp(&temp_path);
                    return Err(e);
                }
            };

        if let Some(expected) = expected_sha256
            && let Err(e) = verify_checksum(expected, &sha256)
        {
            remove_temp(&temp_path);
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&temp_path, &target_path) {
            remove_temp(&temp_path);
            return Err(e.into());
        }
        if self.store.sync_writes() {
            sync_dir(self.store.root())?;
        }

        info!(
            transfer_id,
            target = target_name,
            bytes = size,
            chunks = expected_chunk_count,
            "artifact published"
        );

        self.store.record_completion(&Completion {
            transfer_id: transfer_id.to_string(),
            target_name: target_name.to_string(),
            chunk_count: expected_chunk_count,
            sha256: sha256.clone(),
        })?;
        self.store.purge(transfer_id)?;

        Ok(Artifact {
            target_name: target_name.to_string(),
            path: target_path,
            size,
            sha256,
        })
    }

    /// Validates names and returns the artifact path.
    fn target_path(&self, transfer_id: &str, target_name: &str) -> Result<PathBuf, TransferError> {
        validate_target_name(target_name)?;
        self.store.staging_dir(transfer_id)?;

        if target_name == transfer_id {
            return Err(TransferError::InvalidArgument(format!(
                "target name {target_name:?} must differ from its transfer id"
            )));
        }

        let path = self.store.root().join(target_name);
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => Err(TransferError::InvalidArgument(format!(
                "target name {target_name:?} collides with a directory"
            ))),
            Ok(_) => Ok(path),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(path),
            Err(e) => Err(e.into()),
        }
    }

    /// Streams chunks in index order into `temp_path`; returns size and digest.
    fn write_temp(
        &self,
        transfer_id: &str,
        chunk_count: u64,
        temp_path: &Path,
    ) -> Result<(u64, String), TransferError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp_path)?;
        let mut writer = HashingWriter::new(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file));

        for index in 0..chunk_count {
            let mut chunk = self.store.open_chunk(transfer_id, index)?;
            let copied = std::io::copy(&mut chunk, &mut writer)?;
            debug!(transfer_id, index, bytes = copied, "chunk merged");
        }
        writer.flush()?;

        let (buffered, size, sha256) = writer.finish();
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        if self.store.sync_writes() {
            file.sync_all()?;
        }
        drop(file);

        Ok((size, sha256))
    }
}

/// Requires `received == {0, .., expected - 1}`.
fn check_complete(
    transfer_id: &str,
    received: &BTreeSet<u64>,
    expected: u64,
) -> Result<(), TransferError> {
    let unexpected: Vec<u64> = received.range(expected..).copied().collect();
    if !unexpected.is_empty() {
        return Err(TransferError::InvalidArgument(format!(
            "transfer {transfer_id} has chunks {unexpected:?} beyond expected count {expected}"
        )));
    }

    // Every received index is below `expected` here, so equal sizes mean
    // equal sets.
    if received.len() as u64 == expected {
        return Ok(());
    }

    let missing: Vec<u64> = (0..expected).filter(|i| !received.contains(i)).collect();
    Err(TransferError::IncompleteTransfer {
        transfer_id: transfer_id.to_string(),
        missing,
    })
}
