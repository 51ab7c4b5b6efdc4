use std::path::Path;

use tracing::{debug, info};

use crate::TransferError;
use crate::checksum::{calculate_file_checksum, checksum_bytes, verify_checksum};
use crate::config::TransferConfig;
use crate::locks::TransferLocks;
use crate::range::RangeReader;
use crate::reassemble::Reassembler;
use crate::store::ChunkStore;
use crate::types::{Artifact, TransferStatus};
use crate::validation::{validate_target_name, validate_transfer_id};

/// Entry point for chunked uploads, finalize and ranged downloads.
///
/// Transfer state is derived from the storage root on every call; the only
/// in-memory state is the table of per-transfer locks, so a restarted
/// coordinator resumes where the previous one stopped.
#[derive(Debug)]
pub struct TransferCoordinator {
    config: TransferConfig,
    store: ChunkStore,
    reassembler: Reassembler,
    reader: RangeReader,
    locks: TransferLocks,
}

impl TransferCoordinator {
    /// Validates `config` and creates the storage root if needed.
    pub fn open(config: TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        std::fs::create_dir_all(&config.storage_root)?;

        let store = ChunkStore::new(&config.storage_root, config.sync_writes);
        let reassembler = Reassembler::new(store.clone());
        let reader = RangeReader::new(&config.storage_root, config.max_chunk_size);

        info!(
            root = %config.storage_root.display(),
            sync_writes = config.sync_writes,
            "transfer coordinator ready"
        );

        Ok(Self {
            config,
            store,
            reassembler,
            reader,
            locks: TransferLocks::new(),
        })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Returns the storage root.
    pub fn storage_root(&self) -> &Path {
        &self.config.storage_root
    }

    /// Stores one chunk of a transfer.
    ///
    /// When `total_expected` is given, `index` must lie in `0..total_expected`;
    /// otherwise any index is accepted. Re-uploading an index replaces it.
    pub fn put_chunk(
        &self,
        transfer_id: &str,
        index: u64,
        total_expected: Option<u64>,
        data: &[u8],
    ) -> Result<(), TransferError> {
        self.put_chunk_inner(transfer_id, index, total_expected, data, None)
    }

    /// Like [`put_chunk`](Self::put_chunk), but first verifies `data` against
    /// a SHA-256 hex digest.
    pub fn put_chunk_verified(
        &self,
        transfer_id: &str,
        index: u64,
        total_expected: Option<u64>,
        data: &[u8],
        checksum: &str,
    ) -> Result<(), TransferError> {
        self.put_chunk_inner(transfer_id, index, total_expected, data, Some(checksum))
    }

    fn put_chunk_inner(
        &self,
        transfer_id: &str,
        index: u64,
        total_expected: Option<u64>,
        data: &[u8],
        checksum: Option<&str>,
    ) -> Result<(), TransferError> {
        validate_transfer_id(transfer_id)?;

        match total_expected {
            Some(0) => {
                return Err(TransferError::InvalidArgument(
                    "total expected chunks must be positive".into(),
                ));
            }
            Some(total) if index >= total => {
                return Err(TransferError::InvalidArgument(format!(
                    "chunk index {index} out of range for {total} chunks"
                )));
            }
            _ => {}
        }

        if data.len() as u64 > self.config.max_chunk_size {
            return Err(TransferError::InvalidArgument(format!(
                "chunk of {} bytes exceeds maximum {}",
                data.len(),
                self.config.max_chunk_size
            )));
        }

        if let Some(expected) = checksum {
            verify_checksum(expected, &checksum_bytes(data))?;
        }

        let lock = self.locks.get(transfer_id);
        let _guard = lock.shared();
        self.store.put_chunk(transfer_id, index, data)
    }

    /// Merges chunks `0..expected_chunk_count` into `target_name`.
    ///
    /// Fails with [`TransferError::IncompleteTransfer`] naming every absent
    /// index, leaving staged chunks in place for a retry.
    pub fn finalize(
        &self,
        transfer_id: &str,
        target_name: &str,
        expected_chunk_count: u64,
    ) -> Result<Artifact, TransferError> {
        self.finalize_inner(transfer_id, target_name, expected_chunk_count, None)
    }

    /// Like [`finalize`](Self::finalize), but the artifact must hash to
    /// `expected_sha256` or nothing is published.
    pub fn finalize_verified(
        &self,
        transfer_id: &str,
        target_name: &str,
        expected_chunk_count: u64,
        expected_sha256: &str,
    ) -> Result<Artifact, TransferError> {
        self.finalize_inner(
            transfer_id,
            target_name,
            expected_chunk_count,
            Some(expected_sha256),
        )
    }

    fn finalize_inner(
        &self,
        transfer_id: &str,
        target_name: &str,
        expected_chunk_count: u64,
        expected_sha256: Option<&str>,
    ) -> Result<Artifact, TransferError> {
        validate_transfer_id(transfer_id)?;
        validate_target_name(target_name)?;

        let lock = self.locks.get(transfer_id);
        let _guard = lock.exclusive();

        // A repeated finalize finds the staging area gone and this transfer's
        // completion record pointing at the artifact still in place.
        if expected_chunk_count > 0
            && !self.store.has_staging(transfer_id)?
            && let Some(done) = self.store.completion(transfer_id)?
            && done.target_name == target_name
            && done.chunk_count == expected_chunk_count
            && self.reader.exists(target_name)?
        {
            let artifact = self.describe_artifact(target_name)?;
            if artifact.sha256 == done.sha256 {
                debug!(transfer_id, target = target_name, "transfer already finalized");
                if let Some(expected) = expected_sha256 {
                    verify_checksum(expected, &artifact.sha256)?;
                }
                return Ok(artifact);
            }
            debug!(
                transfer_id,
                target = target_name,
                "artifact replaced since this transfer published"
            );
        }

        self.reassembler
            .assemble(transfer_id, target_name, expected_chunk_count, expected_sha256)
    }

    /// Reads range `index` of a published artifact.
    ///
    /// `chunk_size` defaults to the configured download size. Takes no lock:
    /// publication is an atomic rename.
    pub fn download_range(
        &self,
        target_name: &str,
        index: u64,
        chunk_size: Option<u64>,
    ) -> Result<Vec<u8>, TransferError> {
        let chunk_size = chunk_size.unwrap_or(self.config.default_chunk_size);
        self.reader.read_range(target_name, index, chunk_size)
    }

    /// Returns the size of a published artifact.
    pub fn artifact_len(&self, target_name: &str) -> Result<u64, TransferError> {
        self.reader.artifact_len(target_name)
    }

    /// Reports staged chunks; `missing` is filled when a count is given.
    pub fn status(
        &self,
        transfer_id: &str,
        expected_chunk_count: Option<u64>,
    ) -> Result<TransferStatus, TransferError> {
        validate_transfer_id(transfer_id)?;
        let lock = self.locks.get(transfer_id);
        let _guard = lock.shared();

        let received = self.store.list_received(transfer_id)?;
        let missing = match expected_chunk_count {
            Some(n) => (0..n).filter(|i| !received.contains(i)).collect(),
            None => Vec::new(),
        };
        Ok(TransferStatus {
            transfer_id: transfer_id.to_string(),
            received: received.into_iter().collect(),
            missing,
            staged_bytes: self.store.staged_bytes(transfer_id)?,
        })
    }

    /// Abandons a transfer, discarding whatever is staged and forgetting any
    /// earlier publish. The artifact itself is left in place.
    pub fn abort(&self, transfer_id: &str) -> Result<(), TransferError> {
        validate_transfer_id(transfer_id)?;
        let lock = self.locks.get(transfer_id);
        let _guard = lock.exclusive();

        self.store.purge(transfer_id)?;
        self.store.clear_completion(transfer_id)?;
        info!(transfer_id, "transfer aborted");
        Ok(())
    }

    /// Reads back a staged chunk.
    pub fn read_chunk(&self, transfer_id: &str, index: u64) -> Result<Vec<u8>, TransferError> {
        self.store.read_chunk(transfer_id, index)
    }

    fn describe_artifact(&self, target_name: &str) -> Result<Artifact, TransferError> {
        let path = self.reader.artifact_path(target_name)?;
        let size = self.reader.artifact_len(target_name)?;
        let sha256 = calculate_file_checksum(&path)?;
        Ok(Artifact {
            target_name: target_name.to_string(),
            path,
            size,
            sha256,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir) -> TransferCoordinator {
        let config = TransferConfig {
            sync_writes: false,
            ..TransferConfig::with_root(dir.path().join("root"))
        };
        TransferCoordinator::open(config).unwrap()
    }

    #[test]
    fn open_creates_root() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        assert!(c.storage_root().is_dir());
    }

    #[test]
    fn open_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = TransferConfig {
            default_chunk_size: 0,
            ..TransferConfig::with_root(dir.path())
        };
        assert!(matches!(
            TransferCoordinator::open(config),
            Err(TransferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn put_validates_index_against_total() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        assert!(c.put_chunk("t1", 1, Some(2), b"x").is_ok());
        assert!(matches!(
            c.put_chunk("t1", 2, Some(2), b"x"),
            Err(TransferError::InvalidArgument(_))
        ));
        assert!(matches!(
            c.put_chunk("t1", 0, Some(0), b"x"),
            Err(TransferError::InvalidArgument(_))
        ));
        // Without a declared total any index is fine.
        assert!(c.put_chunk("t1", 1_000, None, b"x").is_ok());
    }

    #[test]
    fn put_rejects_oversized_chunk() {
        let dir = TempDir::new().unwrap();
        let config = TransferConfig {
            default_chunk_size: 4,
            max_chunk_size: 4,
            sync_writes: false,
            ..TransferConfig::with_root(dir.path())
        };
        let c = TransferCoordinator::open(config).unwrap();
        assert!(c.put_chunk("t1", 0, None, b"1234").is_ok());
        assert!(matches!(
            c.put_chunk("t1", 1, None, b"12345"),
            Err(TransferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn put_verified_checks_digest_before_storing() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let good = checksum_bytes(b"data");
        c.put_chunk_verified("t1", 0, None, b"data", &good).unwrap();

        let err = c
            .put_chunk_verified("t1", 1, None, b"data", &"f".repeat(64))
            .unwrap_err();
        assert!(matches!(err, TransferError::ChecksumMismatch { .. }));
        assert!(err.is_retryable());
        assert_eq!(c.status("t1", None).unwrap().received, vec![0]);
    }

    #[test]
    fn finalize_round_trip() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("t1", 1, Some(2), b"BBB").unwrap();
        c.put_chunk("t1", 0, Some(2), b"AAA").unwrap();

        let artifact = c.finalize("t1", "out.txt", 2).unwrap();
        assert_eq!(artifact.size, 6);
        assert_eq!(c.download_range("out.txt", 0, None).unwrap(), b"AAABBB");
        assert!(c.status("t1", None).unwrap().is_empty());
    }

    #[test]
    fn repeated_finalize_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("t1", 0, None, b"hello").unwrap();
        let first = c.finalize("t1", "hello.txt", 1).unwrap();

        let second = c.finalize("t1", "hello.txt", 1).unwrap();
        assert_eq!(first, second);

        let verified = c
            .finalize_verified("t1", "hello.txt", 1, &first.sha256)
            .unwrap();
        assert_eq!(verified.sha256, first.sha256);
        assert!(matches!(
            c.finalize_verified("t1", "hello.txt", 1, &"0".repeat(64)),
            Err(TransferError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn finalize_unknown_transfer_lists_all_missing() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let err = c.finalize("ghost", "ghost.bin", 3).unwrap_err();
        assert_eq!(err.missing_indices(), &[0, 1, 2]);
    }

    #[test]
    fn never_uploaded_transfer_cannot_claim_existing_artifact() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("v1", 0, None, b"original").unwrap();
        c.finalize("v1", "doc.bin", 1).unwrap();

        let err = c.finalize("v2", "doc.bin", 3).unwrap_err();
        assert_eq!(err.missing_indices(), &[0, 1, 2]);
        assert_eq!(c.download_range("doc.bin", 0, None).unwrap(), b"original");
    }

    #[test]
    fn aborted_transfer_cannot_claim_existing_artifact() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("v1", 0, None, b"original").unwrap();
        c.finalize("v1", "doc.bin", 1).unwrap();

        c.put_chunk("v2", 0, None, b"partial").unwrap();
        c.abort("v2").unwrap();
        let err = c.finalize("v2", "doc.bin", 2).unwrap_err();
        assert_eq!(err.missing_indices(), &[0, 1]);
    }

    #[test]
    fn abort_after_publish_forgets_the_transfer() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("t1", 0, None, b"x").unwrap();
        c.finalize("t1", "x.bin", 1).unwrap();

        c.abort("t1").unwrap();
        assert!(matches!(
            c.finalize("t1", "x.bin", 1),
            Err(TransferError::IncompleteTransfer { .. })
        ));
        assert_eq!(c.artifact_len("x.bin").unwrap(), 1);
    }

    #[test]
    fn repeat_finalize_must_match_recorded_target_and_count() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("t1", 0, None, b"a").unwrap();
        c.put_chunk("t1", 1, None, b"b").unwrap();
        c.finalize("t1", "ab.bin", 2).unwrap();
        std::fs::write(c.storage_root().join("other.bin"), b"zz").unwrap();

        assert!(c.finalize("t1", "ab.bin", 2).is_ok());
        assert!(c.finalize("t1", "ab.bin", 3).is_err());
        assert!(c.finalize("t1", "other.bin", 2).is_err());
    }

    #[test]
    fn repeat_finalize_fails_once_artifact_is_replaced() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("t1", 0, None, b"first").unwrap();
        c.finalize("t1", "shared.bin", 1).unwrap();
        c.put_chunk("t2", 0, None, b"second").unwrap();
        c.finalize("t2", "shared.bin", 1).unwrap();

        assert!(matches!(
            c.finalize("t1", "shared.bin", 1),
            Err(TransferError::IncompleteTransfer { .. })
        ));
        assert!(c.finalize("t2", "shared.bin", 1).is_ok());
    }

    #[test]
    fn put_racing_finalize_lands_after_publish() {
        let dir = TempDir::new().unwrap();
        let c = Arc::new(coordinator(&dir));
        c.put_chunk("t1", 0, None, b"AAA").unwrap();

        // Stand in for finalize: hold the exclusive side across assembly.
        let lock = c.locks.get("t1");
        let guard = lock.exclusive();

        let stored = Arc::new(AtomicBool::new(false));
        let handle = {
            let c = Arc::clone(&c);
            let stored = Arc::clone(&stored);
            thread::spawn(move || {
                c.put_chunk("t1", 1, None, b"late").unwrap();
                stored.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!stored.load(Ordering::SeqCst));
        assert!(!c.storage_root().join("t1").join("chunk_1").exists());

        let artifact = c.reassembler.assemble("t1", "out.bin", 1, None).unwrap();
        drop(guard);
        handle.join().unwrap();

        assert!(stored.load(Ordering::SeqCst));
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"AAA");
        assert_eq!(c.status("t1", None).unwrap().received, vec![1]);
    }

    #[test]
    fn status_reports_missing_and_bytes() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("t1", 0, None, b"ab").unwrap();
        c.put_chunk("t1", 2, None, b"cde").unwrap();

        let status = c.status("t1", Some(4)).unwrap();
        assert_eq!(status.transfer_id, "t1");
        assert_eq!(status.received, vec![0, 2]);
        assert_eq!(status.missing, vec![1, 3]);
        assert_eq!(status.staged_bytes, 5);

        assert!(c.status("t1", None).unwrap().missing.is_empty());
    }

    #[test]
    fn abort_discards_staging() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("t1", 0, None, b"x").unwrap();
        c.abort("t1").unwrap();
        assert!(c.status("t1", None).unwrap().is_empty());
        c.abort("t1").unwrap();
    }

    #[test]
    fn download_uses_default_chunk_size() {
        let dir = TempDir::new().unwrap();
        let config = TransferConfig {
            default_chunk_size: 3,
            sync_writes: false,
            ..TransferConfig::with_root(dir.path())
        };
        let c = TransferCoordinator::open(config).unwrap();
        c.put_chunk("t1", 0, None, b"abcdefg").unwrap();
        c.finalize("t1", "g.txt", 1).unwrap();

        assert_eq!(c.download_range("g.txt", 0, None).unwrap(), b"abc");
        assert_eq!(c.download_range("g.txt", 2, None).unwrap(), b"g");
        assert_eq!(c.download_range("g.txt", 0, Some(5)).unwrap(), b"abcde");
        assert_eq!(c.artifact_len("g.txt").unwrap(), 7);
    }

    #[test]
    fn read_chunk_returns_latest_payload() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        c.put_chunk("t1", 0, None, b"first").unwrap();
        c.put_chunk("t1", 0, None, b"second").unwrap();
        assert_eq!(c.read_chunk("t1", 0).unwrap(), b"second");
    }
}
