use serde::{Deserialize, Serialize};

/// Default size of a download range when the request does not specify one (1 MiB).
pub const DEFAULT_RANGE_CHUNK_SIZE: u64 = 1024 * 1024;

/// Kind of a message carried in the [`Message`](crate::envelope::Message) envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    PutChunk,
    PutChunkResponse,
    Finalize,
    FinalizeResponse,
    ReadRange,
    ReadRangeResponse,
    TransferStatus,
    TransferStatusResponse,
    AbortTransfer,
    OperationResult,
    Error,
}

/// Error codes carried in [`ErrorInfo::code`](crate::envelope::ErrorInfo).
///
/// Values mirror the HTTP status a web binding would use.
pub mod error_code {
    /// Malformed payload or invalid argument.
    pub const BAD_REQUEST: i32 = 400;
    /// Requested artifact does not exist.
    pub const NOT_FOUND: i32 = 404;
    /// Finalize precondition failed; `missing` lists the indices to re-upload.
    pub const INCOMPLETE: i32 = 409;
    /// Checksum verification failed.
    pub const CHECKSUM_MISMATCH: i32 = 422;
    /// Internal failure (logic bug or worker crash).
    pub const INTERNAL: i32 = 500;
    /// Message type the server does not serve.
    pub const NOT_IMPLEMENTED: i32 = 501;
    /// Storage backend failure, retryable.
    pub const STORAGE_UNAVAILABLE: i32 = 503;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serializes_snake_case() {
        let json = serde_json::to_string(&MessageType::PutChunkResponse).unwrap();
        assert_eq!(json, "\"put_chunk_response\"");
        let parsed: MessageType = serde_json::from_str("\"read_range\"").unwrap();
        assert_eq!(parsed, MessageType::ReadRange);
    }

    #[test]
    fn unknown_message_type_rejected() {
        assert!(serde_json::from_str::<MessageType>("\"upload_chunk\"").is_err());
    }
}
