use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::TransferError;
use crate::checksum::checksum_bytes;
use crate::types::Completion;
use crate::validation::validate_transfer_id;

/// File name prefix of a staged chunk.
const CHUNK_PREFIX: &str = "chunk_";

/// File name prefix of a completion record in the storage root.
const COMPLETION_PREFIX: &str = ".done-";

/// Persists chunks under `{root}/{transfer_id}/chunk_{index}`.
///
/// The staging directory is the only record of a transfer: the set of
/// received indices is whatever `chunk_*` files it holds.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
    sync_writes: bool,
}

impl ChunkStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, sync_writes: bool) -> Self {
        Self {
            root: root.into(),
            sync_writes,
        }
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if chunk data is fsynced before it becomes visible.
    pub fn sync_writes(&self) -> bool {
        self.sync_writes
    }

    /// Returns the staging directory of a transfer after validating its id.
    pub fn staging_dir(&self, transfer_id: &str) -> Result<PathBuf, TransferError> {
        validate_transfer_id(transfer_id)?;
        Ok(self.root.join(transfer_id))
    }

    /// Writes a chunk, replacing any previous payload for the same index.
    ///
    /// The payload goes to a hidden temp file first and is renamed into
    /// place, so `list_received` never reports a half-written chunk.
    pub fn put_chunk(
        &self,
        transfer_id: &str,
        index: u64,
        data: &[u8],
    ) -> Result<(), TransferError> {
        let dir = self.staging_dir(transfer_id)?;

        match std::fs::symlink_metadata(&dir) {
            Ok(meta) if !meta.is_dir() => {
                return Err(TransferError::InvalidArgument(format!(
                    "transfer id {transfer_id:?} collides with an existing file"
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                std::fs::create_dir_all(&dir)?;
                debug!(transfer_id, "created staging area");
            }
            Err(e) => return Err(e.into()),
        }

        let final_path = dir.join(chunk_file_name(index));
        let temp_path = dir.join(format!(
            ".{}.{}.tmp",
            chunk_file_name(index),
            uuid::Uuid::new_v4()
        ));

        if let Err(e) = self.write_file(&temp_path, data) {
            remove_temp(&temp_path);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&temp_path, &final_path) {
            remove_temp(&temp_path);
            return Err(e.into());
        }
        if self.sync_writes {
            sync_dir(&dir)?;
        }

        debug!(transfer_id, index, bytes = data.len(), "chunk stored");
        Ok(())
    }

    /// Returns the indices currently staged for a transfer, ascending.
    ///
    /// An absent staging area yields an empty set.
    pub fn list_received(&self, transfer_id: &str) -> Result<BTreeSet<u64>, TransferError> {
        Ok(self
            .staged_chunks(transfer_id)?
            .into_iter()
            .map(|(index, _)| index)
            .collect())
    }

    /// Reads the full payload of a staged chunk.
    pub fn read_chunk(&self, transfer_id: &str, index: u64) -> Result<Vec<u8>, TransferError> {
        let path = self.chunk_path(transfer_id, index)?;
        std::fs::read(&path).map_err(|e| chunk_error(e, transfer_id, index))
    }

    /// Opens a staged chunk for streaming reads.
    pub fn open_chunk(&self, transfer_id: &str, index: u64) -> Result<File, TransferError> {
        let path = self.chunk_path(transfer_id, index)?;
        File::open(&path).map_err(|e| chunk_error(e, transfer_id, index))
    }

    /// Returns the total size of all staged chunks.
    pub fn staged_bytes(&self, transfer_id: &str) -> Result<u64, TransferError> {
        Ok(self
            .staged_chunks(transfer_id)?
            .into_iter()
            .map(|(_, len)| len)
            .sum())
    }

    /// Returns `true` if a staging directory exists for the transfer.
    pub fn has_staging(&self, transfer_id: &str) -> Result<bool, TransferError> {
        let dir = self.staging_dir(transfer_id)?;
        match std::fs::symlink_metadata(&dir) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every chunk and the staging directory of a transfer.
    ///
    /// A missing staging area is not an error. A regular file at the staging
    /// path (a published artifact) is left alone.
    pub fn purge(&self, transfer_id: &str) -> Result<(), TransferError> {
        if !self.has_staging(transfer_id)? {
            return Ok(());
        }
        let dir = self.staging_dir(transfer_id)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(transfer_id, "staging area purged");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Records that a transfer has been published.
    pub(crate) fn record_completion(&self, completion: &Completion) -> Result<(), TransferError> {
        let path = self.completion_path(&completion.transfer_id)?;
        let body = serde_json::to_vec(completion).map_err(std::io::Error::other)?;

        let temp_path = self
            .root
            .join(format!("{COMPLETION_PREFIX}tmp-{}", uuid::Uuid::new_v4()));
        if let Err(e) = self.write_file(&temp_path, &body) {
            remove_temp(&temp_path);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&temp_path, &path) {
            remove_temp(&temp_path);
            return Err(e.into());
        }
        if self.sync_writes {
            sync_dir(&self.root)?;
        }
        Ok(())
    }

    /// Returns the completion record of a transfer, if one exists.
    pub(crate) fn completion(&self, transfer_id: &str) -> Result<Option<Completion>, TransferError> {
        let path = self.completion_path(transfer_id)?;
        let body = match std::fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Completion>(&body) {
            Ok(record) if record.transfer_id == transfer_id => Ok(Some(record)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(transfer_id, error = %e, "ignoring unreadable completion record");
                Ok(None)
            }
        }
    }

    /// Forgets that a transfer was published. A missing record is not an error.
    pub(crate) fn clear_completion(&self, transfer_id: &str) -> Result<(), TransferError> {
        let path = self.completion_path(transfer_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // Keyed by digest so the name stays short whatever the id length.
    fn completion_path(&self, transfer_id: &str) -> Result<PathBuf, TransferError> {
        validate_transfer_id(transfer_id)?;
        Ok(self.root.join(format!(
            "{COMPLETION_PREFIX}{}",
            checksum_bytes(transfer_id.as_bytes())
        )))
    }

    fn chunk_path(&self, transfer_id: &str, index: u64) -> Result<PathBuf, TransferError> {
        Ok(self.staging_dir(transfer_id)?.join(chunk_file_name(index)))
    }

    /// Lists `(index, size)` of staged chunks, ascending by index.
    fn staged_chunks(&self, transfer_id: &str) -> Result<Vec<(u64, u64)>, TransferError> {
        if !self.has_staging(transfer_id)? {
            return Ok(Vec::new());
        }
        let dir = self.staging_dir(transfer_id)?;

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            // Purged between the check and the listing.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(index) = name.to_str().and_then(parse_chunk_index) else {
                continue;
            };
            let meta = entry.metadata()?;
            if meta.is_file() {
                chunks.push((index, meta.len()));
            }
        }
        chunks.sort_unstable_by_key(|(index, _)| *index);
        Ok(chunks)
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(data)?;
        if self.sync_writes {
            file.sync_all()?;
        }
        Ok(())
    }
}

fn chunk_file_name(index: u64) -> String {
    format!("{CHUNK_PREFIX}{index}")
}

/// Parses `chunk_{index}`; rejects signs, leading zeros and anything else.
fn parse_chunk_index(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(CHUNK_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

fn chunk_error(e: std::io::Error, transfer_id: &str, index: u64) -> TransferError {
    if e.kind() == ErrorKind::NotFound {
        TransferError::ChunkNotFound {
            transfer_id: transfer_id.to_string(),
            index,
        }
    } else {
        TransferError::StorageIo(e)
    }
}

pub(crate) fn remove_temp(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove temp file");
    }
}

/// Flushes directory entries (renames, creations) to disk.
#[cfg(unix)]
pub(crate) fn sync_dir(path: &Path) -> std::io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
