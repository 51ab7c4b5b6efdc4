use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::MessageType;

/// Error details in a reply message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i32,
    pub message: String,
    /// Chunk indices the client must re-upload before finalize can succeed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<u64>,
}

/// Envelope for every request and reply.
///
/// The `payload` field uses `serde_json::value::RawValue` so the receiver
/// can pick the payload type after looking at `msg_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<serde_json::value::RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Why a request payload could not be used.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("missing payload")]
    Missing,
    #[error("invalid payload: {0}")]
    Invalid(#[from] serde_json::Error),
}

impl Message {
    /// Builds a message, encoding `payload` once into its raw form.
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: id.into(),
            msg_type,
            payload: payload.map(serde_json::value::to_raw_value).transpose()?,
            error: None,
        })
    }

    /// Decodes the payload, if any, as `T`.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.payload
            .as_deref()
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
    }

    /// Decodes a payload the message type requires.
    pub fn require_payload<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        self.parse_payload()?.ok_or(PayloadError::Missing)
    }

    /// Error reply without missing indices.
    pub fn error(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self::error_with_missing(id, code, message, Vec::new())
    }

    /// Error reply listing the chunk indices the client still has to send.
    pub fn error_with_missing(
        id: impl Into<String>,
        code: i32,
        message: impl Into<String>,
        missing: Vec<u64>,
    ) -> Self {
        Self {
            id: id.into(),
            msg_type: MessageType::Error,
            payload: None,
            error: Some(ErrorInfo {
                code,
                message: message.into(),
                missing,
            }),
        }
    }

    /// Success reply correlated to this request.
    pub fn reply<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Self::new(self.id.clone(), msg_type, payload)
    }

    /// Error reply correlated to this request.
    pub fn reply_error(&self, code: i32, message: impl Into<String>) -> Self {
        Self::error(self.id.clone(), code, message)
    }

    /// Returns `true` if this message carries an error.
    pub fn is_error(&self) -> bool {
        self.msg_type == MessageType::Error || self.error.is_some()
    }
}
