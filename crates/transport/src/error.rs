use std::io;

/// Errors raised while framing or deframing DAP messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header block contained bytes that are not valid UTF-8.
    #[error("invalid UTF-8 in header block")]
    InvalidUtf8,

    /// A `Content-Length` header was present but did not parse as an
    /// integer.
    #[error("malformed Content-Length value")]
    MalformedContentLength,

    /// The header block ended without any `Content-Length` header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// Body length exceeds the configured cap. Guards against a corrupt
    /// header committing the decoder to buffering gigabytes.
    #[error("message of {size} bytes exceeds maximum of {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// The body was not valid JSON, or not a valid DAP envelope.
    #[error("invalid message body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// An outgoing message failed to serialize.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}
