//! Error taxonomy for the inspection library.
//!
//! Component boundaries convert inner failures into this minimal set and
//! propagate them explicitly; reverts are not errors (they are recorded in
//! the `ReplayResult`) and per-transaction failures are aggregated by the
//! pipeline rather than aborting the block.

use thiserror::Error;

/// Library-wide result alias.
pub type Result<T> = std::result::Result<T, InspectError>;

#[derive(Debug, Error)]
pub enum InspectError {
    /// Network failure, HTTP non-2xx, or unparseable response body.
    /// Retried with backoff; converted to [`InspectError::RpcUnavailable`]
    /// once the retry budget is exhausted.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Transport failures persisted through every retry attempt.
    #[error("rpc unavailable after {attempts} attempts: {message}")]
    RpcUnavailable { attempts: u32, message: String },

    /// The endpoint returned a JSON-RPC error object. Never retried, with
    /// the single exception of code -32005 ("limit exceeded").
    #[error("rpc error {code}: {message}")]
    RpcError { code: i64, message: String },

    /// Unexpected field shape, malformed hex, or out-of-range integer in an
    /// otherwise well-formed response. Never retried.
    #[error("decode error at {location}: {message}")]
    Decode {
        location: &'static str,
        message: String,
    },

    /// A replay-required state read came back unexpectedly empty.
    #[error("state unavailable: {0}")]
    StateUnavailable(String),

    /// Pool-token store I/O.
    #[error("pool token store: {0}")]
    Store(#[from] rusqlite::Error),

    /// Invariant violation; aborts the block.
    #[error("internal error: {0}")]
    Internal(String),
}

impl InspectError {
    pub fn decode(location: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            location,
            message: message.into(),
        }
    }

    /// Whether a bounded retry with backoff is warranted.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::RpcError { code, .. } => *code == -32005,
            _ => false,
        }
    }
}
