use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RANGE_CHUNK_SIZE;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Uploads one chunk of a transfer.
///
/// The `data` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutChunkRequest {
    pub transfer_id: String,
    pub index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_expected: Option<u64>,
    /// SHA-256 hex digest of `data`; empty means no verification.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Merges all staged chunks of a transfer into the named artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub transfer_id: String,
    pub target_name: String,
    pub expected_chunk_count: u64,
    /// SHA-256 hex digest the published artifact must have.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_sha256: Option<String>,
}

/// Reads one fixed-size range of a published artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRangeRequest {
    pub target_name: String,
    pub index: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

/// Queries which chunks of a transfer are staged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatusRequest {
    pub transfer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_chunk_count: Option<u64>,
}

/// Abandons a transfer and discards its staged chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortTransferRequest {
    pub transfer_id: String,
}

fn default_chunk_size() -> u64 {
    DEFAULT_RANGE_CHUNK_SIZE
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Acknowledges a stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutChunkResponse {
    pub transfer_id: String,
    pub index: u64,
    pub bytes_written: u64,
}

/// Describes the published artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub target_name: String,
    pub size: u64,
    pub sha256: String,
}

/// Bytes of one range; `eof` is set when fewer than `chunkSize` bytes came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRangeResponse {
    pub target_name: String,
    pub index: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub eof: bool,
}

/// Staged state of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatusResponse {
    pub transfer_id: String,
    pub received: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<u64>,
    pub staged_bytes: u64,
}

/// Generic success/failure result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
