//! Request dispatch for the wire protocol.
//!
//! Turns a request [`Message`] into exactly one reply carrying the same id:
//! the matching `*_response` on success, or an `error` message whose code
//! tells the client whether to retry (see [`error_code`]).

use chunkyard_protocol::envelope::Message;
use chunkyard_protocol::messages::{
    AbortTransferRequest, FinalizeRequest, FinalizeResponse, OperationResult, PutChunkRequest,
    PutChunkResponse, ReadRangeRequest, ReadRangeResponse, TransferStatusRequest,
    TransferStatusResponse,
};
use chunkyard_protocol::{MessageType, error_code};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::TransferError;
use crate::asynchronous::AsyncTransferCoordinator;

/// Serves protocol requests against an [`AsyncTransferCoordinator`].
#[derive(Debug, Clone)]
pub struct TransferHandler {
    coordinator: AsyncTransferCoordinator,
}

impl TransferHandler {
    pub fn new(coordinator: AsyncTransferCoordinator) -> Self {
        Self { coordinator }
    }

    /// Handles one request and returns its reply.
    pub async fn handle(&self, msg: Message) -> Message {
        debug!(id = %msg.id, msg_type = ?msg.msg_type, "handling request");
        match msg.msg_type {
            MessageType::PutChunk => self.handle_put_chunk(&msg).await,
            MessageType::Finalize => self.handle_finalize(&msg).await,
            MessageType::ReadRange => self.handle_read_range(&msg).await,
            MessageType::TransferStatus => self.handle_status(&msg).await,
            MessageType::AbortTransfer => self.handle_abort(&msg).await,
            other => msg.reply_error(
                error_code::NOT_IMPLEMENTED,
                format!("unsupported message type: {other:?}"),
            ),
        }
    }

    async fn handle_put_chunk(&self, msg: &Message) -> Message {
        let req: PutChunkRequest = match parse(msg) {
            Ok(r) => r,
            Err(reply) => return reply,
        };

        let checksum = (!req.checksum.is_empty()).then_some(req.checksum);
        let bytes_written = req.data.len() as u64;
        let result = self
            .coordinator
            .put_chunk(
                req.transfer_id.clone(),
                req.index,
                req.total_expected,
                req.data,
                checksum,
            )
            .await;

        match result {
            Ok(()) => reply(
                msg,
                MessageType::PutChunkResponse,
                &PutChunkResponse {
                    transfer_id: req.transfer_id,
                    index: req.index,
                    bytes_written,
                },
            ),
            Err(e) => error_reply(msg, &e),
        }
    }

    async fn handle_finalize(&self, msg: &Message) -> Message {
        let req: FinalizeRequest = match parse(msg) {
            Ok(r) => r,
            Err(reply) => return reply,
        };

        let result = self
            .coordinator
            .finalize(
                req.transfer_id,
                req.target_name,
                req.expected_chunk_count,
                req.expected_sha256,
            )
            .await;

        match result {
            Ok(artifact) => reply(
                msg,
                MessageType::FinalizeResponse,
                &FinalizeResponse::from(artifact),
            ),
            Err(e) => error_reply(msg, &e),
        }
    }

    async fn handle_read_range(&self, msg: &Message) -> Message {
        let req: ReadRangeRequest = match parse(msg) {
            Ok(r) => r,
            Err(reply) => return reply,
        };

        let result = self
            .coordinator
            .download_range(req.target_name.clone(), req.index, Some(req.chunk_size))
            .await;

        match result {
            Ok(data) => {
                let eof = (data.len() as u64) < req.chunk_size;
                reply(
                    msg,
                    MessageType::ReadRangeResponse,
                    &ReadRangeResponse {
                        target_name: req.target_name,
                        index: req.index,
                        data,
                        eof,
                    },
                )
            }
            Err(e) => error_reply(msg, &e),
        }
    }

    async fn handle_status(&self, msg: &Message) -> Message {
        let req: TransferStatusRequest = match parse(msg) {
            Ok(r) => r,
            Err(reply) => return reply,
        };

        match self
            .coordinator
            .status(req.transfer_id, req.expected_chunk_count)
            .await
        {
            Ok(status) => reply(
                msg,
                MessageType::TransferStatusResponse,
                &TransferStatusResponse::from(status),
            ),
            Err(e) => error_reply(msg, &e),
        }
    }

    async fn handle_abort(&self, msg: &Message) -> Message {
        let req: AbortTransferRequest = match parse(msg) {
            Ok(r) => r,
            Err(reply) => return reply,
        };

        match self.coordinator.abort(req.transfer_id).await {
            Ok(()) => reply(
                msg,
                MessageType::OperationResult,
                &OperationResult {
                    success: true,
                    message: "aborted".into(),
                },
            ),
            Err(e) => error_reply(msg, &e),
        }
    }
}

/// Parses the payload or produces the 400 reply to send instead.
fn parse<T: DeserializeOwned>(msg: &Message) -> Result<T, Message> {
    msg.require_payload()
        .map_err(|e| msg.reply_error(error_code::BAD_REQUEST, e.to_string()))
}

fn reply<T: Serialize>(msg: &Message, msg_type: MessageType, payload: &T) -> Message {
    match msg.reply(msg_type, Some(payload)) {
        Ok(m) => m,
        Err(e) => {
            warn!(id = %msg.id, error = %e, "failed to encode reply");
            msg.reply_error(error_code::INTERNAL, format!("failed to encode reply: {e}"))
        }
    }
}

/// Maps an error to its wire code.
fn error_code_for(err: &TransferError) -> i32 {
    match err {
        TransferError::InvalidArgument(_) => error_code::BAD_REQUEST,
        TransferError::ArtifactNotFound(_) => error_code::NOT_FOUND,
        TransferError::IncompleteTransfer { .. } => error_code::INCOMPLETE,
        TransferError::ChecksumMismatch { .. } => error_code::CHECKSUM_MISMATCH,
        TransferError::ChunkNotFound { .. } | TransferError::TaskFailed(_) => {
            error_code::INTERNAL
        }
        TransferError::StorageIo(_) => error_code::STORAGE_UNAVAILABLE,
    }
}

fn error_reply(msg: &Message, err: &TransferError) -> Message {
    let code = error_code_for(err);
    if code >= error_code::INTERNAL {
        warn!(id = %msg.id, code, error = %err, "request failed");
    } else {
        debug!(id = %msg.id, code, error = %err, "request rejected");
    }
    Message::error_with_missing(&msg.id, code, err.to_string(), err.missing_indices().to_vec())
}
