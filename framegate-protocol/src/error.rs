//! Protocol error types.

use thiserror::Error;

/// Errors surfaced by the framing and decoding layer.
///
/// `FrameTooLong`, `StreamTooLong` and `MalformedJson` (on the streaming
/// path) invalidate a connection's decoding state and are terminal for the
/// connection; a malformed payload on a framed path is recovered by the
/// caller with an error response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too long: {len} bytes (max {max})")]
    FrameTooLong { len: usize, max: usize },

    #[error("JSON stream buffered {pending} bytes without completing a value (max {max})")]
    StreamTooLong { pending: usize, max: usize },

    #[error("malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),
}
