//! Subcommand implementations over a blocking [`TransferCoordinator`].

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chunkyard_transfer::{
    Artifact, HashingWriter, TransferCoordinator, TransferStatus, calculate_file_checksum,
    checksum_bytes,
};
use tracing::{debug, info, warn};

/// Uploads one chunk read from `file`.
pub fn put(
    coordinator: &TransferCoordinator,
    transfer_id: &str,
    index: u64,
    file: &Path,
    total: Option<u64>,
    checksum: Option<&str>,
) -> anyhow::Result<u64> {
    let data = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    match checksum {
        Some(sum) => coordinator.put_chunk_verified(transfer_id, index, total, &data, sum)?,
        None => coordinator.put_chunk(transfer_id, index, total, &data)?,
    }
    Ok(data.len() as u64)
}

/// Splits `file` into chunks, stages each with its digest and finalizes
/// against the digest of the whole file.
pub fn upload(
    coordinator: &TransferCoordinator,
    file: &Path,
    target_name: &str,
    transfer_id: &str,
    chunk_size: u64,
) -> anyhow::Result<Artifact> {
    if chunk_size == 0 {
        bail!("chunk size must be positive");
    }

    let expected_sha256 = calculate_file_checksum(file)
        .with_context(|| format!("failed to hash {}", file.display()))?;
    let mut reader =
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?;

    let mut index = 0u64;
    loop {
        let mut chunk = Vec::new();
        Read::by_ref(&mut reader).take(chunk_size).read_to_end(&mut chunk)?;
        if chunk.is_empty() {
            break;
        }
        coordinator.put_chunk_verified(
            transfer_id,
            index,
            None,
            &chunk,
            &checksum_bytes(&chunk),
        )?;
        debug!(transfer_id, index, bytes = chunk.len(), "chunk uploaded");
        index += 1;
    }

    let artifact =
        coordinator.finalize_verified(transfer_id, target_name, index, &expected_sha256)?;
    info!(
        transfer_id,
        target = target_name,
        chunks = index,
        bytes = artifact.size,
        "upload complete"
    );
    Ok(artifact)
}

/// Downloads `target_name` range by range into `out`.
///
/// Data goes to a temp file beside `out` that is renamed into place once
/// the last range has been read. Returns the byte count and SHA-256 digest.
pub fn download(
    coordinator: &TransferCoordinator,
    target_name: &str,
    out: &Path,
    chunk_size: Option<u64>,
) -> anyhow::Result<(u64, String)> {
    let chunk_size = chunk_size.unwrap_or(coordinator.config().default_chunk_size);
    // Fail before creating anything locally.
    coordinator.artifact_len(target_name)?;

    let temp = temp_path(out);
    let file = File::options()
        .write(true)
        .create_new(true)
        .open(&temp)
        .with_context(|| format!("failed to create {}", temp.display()))?;

    match write_ranges(coordinator, target_name, chunk_size, file) {
        Ok((len, sha256)) => {
            if let Err(e) = std::fs::rename(&temp, out) {
                remove_temp(&temp);
                return Err(e).with_context(|| format!("failed to write {}", out.display()));
            }
            info!(target = target_name, bytes = len, out = %out.display(), "download complete");
            Ok((len, sha256))
        }
        Err(e) => {
            remove_temp(&temp);
            Err(e)
        }
    }
}

fn write_ranges(
    coordinator: &TransferCoordinator,
    target_name: &str,
    chunk_size: u64,
    file: File,
) -> anyhow::Result<(u64, String)> {
    let mut writer = HashingWriter::new(BufWriter::new(file));
    let mut index = 0u64;
    loop {
        let data = coordinator.download_range(target_name, index, Some(chunk_size))?;
        writer.write_all(&data)?;
        if (data.len() as u64) < chunk_size {
            break;
        }
        index += 1;
    }

    let (buffered, len, sha256) = writer.finish();
    let file = buffered.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok((len, sha256))
}

fn temp_path(out: &Path) -> PathBuf {
    let name = out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".into());
    out.with_file_name(format!(".{name}.{}.part", uuid::Uuid::new_v4()))
}

fn remove_temp(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove temp file");
    }
}

pub fn status(
    coordinator: &TransferCoordinator,
    transfer_id: &str,
    expected: Option<u64>,
) -> anyhow::Result<TransferStatus> {
    Ok(coordinator.status(transfer_id, expected)?)
}

pub fn abort(coordinator: &TransferCoordinator, transfer_id: &str) -> anyhow::Result<()> {
    Ok(coordinator.abort(transfer_id)?)
}
