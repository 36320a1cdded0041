//! Error types for the sync client.

use thiserror::Error;

/// Failure of a single delivery attempt.
///
/// The split decides the queue item's fate: a rejection is terminal for the
/// item, an unreachable transport defers it to backoff.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The server understood the request and refused it (not found,
    /// forbidden, validation). Retrying the same payload cannot succeed.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// Network-level failure (timeout, no connectivity). The payload may
    /// still be deliverable later.
    #[error("transport unreachable: {0}")]
    Unreachable(String),
}

/// Failures of the durable queue store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("queue store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue store encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors surfaced by the sync client itself.
///
/// Delivery failures are not errors here; they are recorded on the queue
/// item and retried. Only the durable store can fail the client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
