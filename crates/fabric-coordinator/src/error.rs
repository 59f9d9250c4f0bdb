//! Coordinator-level error taxonomy (§7).

use fabric_storage::StorageError;
use fabric_types::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The task row persists but its accepted receipt could not be
    /// delivered within the emission client's retry budget; the caller
    /// learns the `task_id` so it can reconcile via the ledger later.
    #[error("service unavailable: receipt emission exhausted retries for {0}")]
    ServiceUnavailable(TaskId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
