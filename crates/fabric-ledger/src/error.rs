//! Ledger-level error taxonomy (§7).

use fabric_storage::StorageError;
use fabric_types::{ReceiptId, ReceiptValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed")]
    ValidationFailed(Vec<ReceiptValidationError>),

    #[error("duplicate receipt_id {0}")]
    DuplicateReceiptId(ReceiptId),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
