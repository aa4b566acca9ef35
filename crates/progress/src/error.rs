//! Engine error taxonomy.
//!
//! Every variant is a recoverable, caller-facing validation error surfaced
//! synchronously at the point of mutation. Nothing here is retried
//! internally, and a failed mutation applies no partial delta.

use studytrack_core::MetricError;
use studytrack_storage::StorageError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Errors surfaced by the progress engine.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Kind-specific metric validation failure, or an unsupported kind tag.
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// The aggregation chain would become inconsistent (achievement exceeds
    /// progress, metric mismatch, total underflow).
    #[error("aggregate consistency: {0}")]
    AggregateConsistency(String),

    /// A chapter position outside the dense sibling range.
    #[error("ordering: {0}")]
    Ordering(String),

    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid study session window or session/course owner mismatch.
    #[error("invalid study session: {0}")]
    Session(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
