//! Error Types
//!
//! Every failure in the core is a programmer error: an unstable feedback
//! cycle, use of a cancelled lifetime, a structural edit that references
//! something that is not there, or a consumer that cannot express an edit.
//! None of them are retried. They surface at the call site of the offending
//! operation as a [`ReactiveError`].

use thiserror::Error;

use crate::graph::NodeId;

/// Failures raised by cells, collections, lifetimes and consumers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A node was updated again while its previous update was still
    /// propagating to its subscribers.
    #[error(
        "unstable value propagation on {node}: updated again while the previous update \
         is still propagating (feedback loop)"
    )]
    ReentrantUpdate { node: NodeId },

    /// A cleanup, subscription or timer was registered on a cancelled token.
    #[error("lifetime token #{token} is already cancelled")]
    ScopeCancelled { token: u64 },

    /// A consumer cannot express the given structural operation.
    #[error("operation not supported: {operation}")]
    UnsupportedOperation { operation: &'static str },

    /// A structural operation addressed an index that does not exist.
    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A structural operation referenced an item that is not present.
    #[error("illegal topology: {0}")]
    IllegalTopology(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Failures while loading a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid runtime config: {field} must be greater than zero")]
    Invalid { field: &'static str },
}

/// Failures while encoding or decoding sync records.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Abort a propagation that has no caller to return an error to.
///
/// Listener closures wired up by operators run inside someone else's
/// `fire`, so a failure there cannot be handed back with `?`.
#[track_caller]
pub(crate) fn fail_fast(err: ReactiveError) -> ! {
    tracing::error!(error = %err, "propagation aborted");
    panic!("{err}")
}
