use std::path::{Component, Path};

use crate::TransferError;

/// Longest identifier accepted as a single file name.
const MAX_IDENTIFIER_LEN: usize = 255;

/// Validates a transfer id before it is used as a staging directory name.
pub fn validate_transfer_id(transfer_id: &str) -> Result<(), TransferError> {
    validate_segment("transfer id", transfer_id)
}

/// Validates an artifact name before it is used as a file name under the root.
pub fn validate_target_name(target_name: &str) -> Result<(), TransferError> {
    validate_segment("target name", target_name)
}

/// Ensures `value` is exactly one plain path segment.
///
/// Rejects:
/// - Empty values and values longer than 255 bytes
/// - Path separators (`/`, `\`) and NUL
/// - `.` and `..`
/// - A leading `.` (reserved for in-flight temp files)
/// - Anything that does not parse as a single normal component (e.g. `C:`)
fn validate_segment(kind: &str, value: &str) -> Result<(), TransferError> {
    if value.is_empty() {
        return Err(TransferError::InvalidArgument(format!("empty {kind}")));
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(TransferError::InvalidArgument(format!(
            "{kind} longer than {MAX_IDENTIFIER_LEN} bytes"
        )));
    }

    if value.contains(['/', '\\', '\0']) {
        return Err(TransferError::InvalidArgument(format!(
            "path separator not allowed in {kind}: {value:?}"
        )));
    }

    if value.starts_with('.') {
        return Err(TransferError::InvalidArgument(format!(
            "{kind} must not start with '.': {value:?}"
        )));
    }

    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidArgument(format!(
            "parent directory traversal not allowed in {kind}: {value:?}"
        ))),
        (Some(Component::Prefix(_)), _) => Err(TransferError::InvalidArgument(format!(
            "path prefix not allowed in {kind}: {value:?}"
        ))),
        _ => Err(TransferError::InvalidArgument(format!(
            "{kind} must be a single path segment: {value:?}"
        ))),
    }
}
