//! The QueueCTL error taxonomy.
//!
//! Mirrors the kinds enumerated in the design doc's error-handling section:
//! boundary validation errors are distinct from persistence-layer failures,
//! and a job's own execution outcome is never represented as a `QueueError`
//! — it is captured on the `Job` row instead (see [`crate::job::JobState`]).

use thiserror::Error;

/// Errors surfaced by [`crate::store::Store`] and [`crate::queue::Queue`]
/// operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The enqueue payload violates schema: missing `command`, malformed
    /// `run_at`, an out-of-range `priority`, etc. Rejected at the boundary;
    /// no partial write occurs.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// `enqueue` was called without `replace` for an id that already exists.
    #[error("job '{0}' already exists")]
    AlreadyExists(String),

    /// The operation referenced an id that does not exist.
    #[error("job '{0}' not found")]
    NotFound(String),

    /// A state-transition precondition was violated, e.g. `retry_from_dlq`
    /// on a job that is not `dead`.
    #[error("invalid state transition for job '{0}': {1}")]
    InvalidState(String, String),

    /// A config operation referenced a key outside `{max-retries,
    /// backoff-base}` at the boundary that enforces the recognized set.
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// A config value failed to parse as the type its key requires.
    #[error("invalid value for config key '{0}': {1}")]
    InvalidValue(String, String),

    /// A persistence-layer I/O failure. Transient by convention — callers
    /// are expected to retry at the operation level.
    #[error("store error: {0}")]
    StoreError(#[from] sqlx::Error),
}

impl QueueError {
    /// True for errors a caller may reasonably retry without changing its
    /// input (as opposed to validation errors, which will fail again).
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::StoreError(_))
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
