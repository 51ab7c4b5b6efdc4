use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::TransferError;
use crate::validation::validate_target_name;

/// Serves fixed-size ranges of published artifacts.
///
/// Reads are positioned (seek + bounded read), so only `chunk_size` bytes
/// are ever held in memory regardless of artifact size. An open handle keeps
/// reading the artifact it opened even if a newer one is renamed over it.
#[derive(Debug, Clone)]
pub struct RangeReader {
    root: PathBuf,
    max_chunk_size: u64,
}

impl RangeReader {
    pub fn new(root: impl Into<PathBuf>, max_chunk_size: u64) -> Self {
        Self {
            root: root.into(),
            max_chunk_size,
        }
    }

    /// Reads range `chunk_index` of `target_name`, where range `i` covers
    /// bytes `[i * chunk_size, (i + 1) * chunk_size)`.
    ///
    /// Returns fewer than `chunk_size` bytes for the last range and an empty
    /// buffer once the offset is at or past the end of the artifact.
    pub fn read_range(
        &self,
        target_name: &str,
        chunk_index: u64,
        chunk_size: u64,
    ) -> Result<Vec<u8>, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidArgument(
                "chunk size must be positive".into(),
            ));
        }
        if chunk_size > self.max_chunk_size {
            return Err(TransferError::InvalidArgument(format!(
                "chunk size {chunk_size} exceeds maximum {}",
                self.max_chunk_size
            )));
        }

        let (mut file, len) = self.open(target_name)?;

        // An offset that overflows lies past any file.
        let Some(offset) = chunk_index.checked_mul(chunk_size) else {
            return Ok(Vec::new());
        };
        if offset >= len {
            debug!(target = target_name, chunk_index, "range past end of artifact");
            return Ok(Vec::new());
        }

        let to_read = chunk_size.min(len - offset);
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(to_read as usize);
        file.take(to_read).read_to_end(&mut buf)?;

        debug!(
            target = target_name,
            chunk_index,
            offset,
            bytes = buf.len(),
            "range served"
        );
        Ok(buf)
    }

    /// Returns the size of a published artifact.
    pub fn artifact_len(&self, target_name: &str) -> Result<u64, TransferError> {
        let (_, len) = self.open(target_name)?;
        Ok(len)
    }

    /// Returns `true` if a published artifact exists under `target_name`.
    pub fn exists(&self, target_name: &str) -> Result<bool, TransferError> {
        match self.open(target_name) {
            Ok(_) => Ok(true),
            Err(TransferError::ArtifactNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Returns the on-disk path of an artifact after validating its name.
    pub fn artifact_path(&self, target_name: &str) -> Result<PathBuf, TransferError> {
        validate_target_name(target_name)?;
        Ok(self.root.join(target_name))
    }

    fn open(&self, target_name: &str) -> Result<(File, u64), TransferError> {
        let path = self.artifact_path(target_name)?;
        let file = open_artifact(&path, target_name)?;
        let meta = file.metadata()?;
        // Staging directories share the namespace; they are not artifacts.
        if !meta.is_file() {
            return Err(TransferError::ArtifactNotFound(target_name.to_string()));
        }
        Ok((file, meta.len()))
    }
}

fn open_artifact(path: &Path, target_name: &str) -> Result<File, TransferError> {
    File::open(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            TransferError::ArtifactNotFound(target_name.to_string())
        } else {
            TransferError::StorageIo(e)
        }
    })
}
