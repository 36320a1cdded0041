//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use workout_core::snapshot::SnapshotError;

/// Errors emitted by the session runtime.
///
/// A duplicate event id is not an error: it is absorbed and the current
/// session state is returned unchanged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Missing routine, day, session, or addressed set.
    #[error("not found")]
    NotFound,

    /// The target does not belong to the caller, or the caller lacks
    /// ownership or an active assignment.
    #[error("forbidden")]
    Forbidden,

    /// Malformed mutation shape, rejected before reaching the transaction.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Storage(StorageError),
}

impl SessionError {
    /// Maps a storage failure, folding `StorageError::NotFound` into the
    /// service-level `NotFound`.
    #[must_use]
    pub fn from_storage(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => SessionError::NotFound,
            other => SessionError::Storage(other),
        }
    }
}
