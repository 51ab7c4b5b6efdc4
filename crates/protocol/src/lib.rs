//! Wire protocol types for chunked transfers.
//!
//! Every operation travels as a JSON [`envelope::Message`] whose payload is
//! one of the request/response structs in [`messages`]. The types carry no
//! transport assumptions; any request/reply channel can move them.

pub mod constants;
pub mod envelope;
pub mod messages;

pub use constants::{DEFAULT_RANGE_CHUNK_SIZE, MessageType, error_code};
pub use envelope::{ErrorInfo, Message, PayloadError};
