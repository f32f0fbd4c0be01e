use std::path::PathBuf;

/// Errors surfaced by the session engine.
///
/// The variants map onto the failure classes callers care about: bad
/// arguments and violated preconditions, missing tooling, transport
/// failures, adapter-reported failures, and timeouts. Evaluation failures
/// are deliberately absent: the adapter's message is returned as data in
/// [`crate::EvaluateOutcome`], not raised.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no debug session with id {0}")]
    SessionNotFound(String),

    #[error("script not found: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("breakpoint line must be >= 1, got {0}")]
    InvalidLine(i64),

    #[error("unknown scope {0:?}; expected local, global or all")]
    InvalidScope(String),

    #[error("no active thread; the program must be paused first")]
    NoActiveThread,

    #[error("no active frame; the program must be paused first")]
    NoActiveFrame,

    #[error("session has ended and no longer accepts operations")]
    SessionEnded,

    #[error(transparent)]
    Supervisor(#[from] server::ServerError),

    #[error("could not connect to debug adapter on port {port} within {secs}s")]
    ConnectTimeout { port: u16, secs: u64 },

    #[error("debug adapter connection closed")]
    Disconnected,

    #[error(transparent)]
    Codec(#[from] transport::CodecError),

    /// The adapter answered with `success == false`.
    #[error("adapter rejected {command}: {message}")]
    Adapter { command: String, message: String },

    #[error("no response to {command} within {secs}s")]
    RequestTimeout { command: String, secs: u64 },

    #[error("adapter never sent the initialized event")]
    InitializedTimeout,

    /// An adapter reply parsed, but its body did not have the shape the
    /// command promises.
    #[error("malformed {command} response: {source}")]
    MalformedResponse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// True for errors callers caused (bad arguments, violated
    /// preconditions) as opposed to engine or adapter failures. The
    /// dispatcher uses this to pick the JSON-RPC error code.
    pub fn is_invalid_params(&self) -> bool {
        matches!(
            self,
            Error::SessionNotFound(_)
                | Error::InvalidPath(_)
                | Error::InvalidLine(_)
                | Error::InvalidScope(_)
                | Error::NoActiveThread
                | Error::NoActiveFrame
                | Error::SessionEnded
        )
    }
}
