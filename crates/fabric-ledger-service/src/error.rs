//! Maps `LedgerError`/`AuthError` onto the HTTP taxonomy in §7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fabric_auth::AuthError;
use fabric_ledger::LedgerError;
use fabric_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Ledger(LedgerError::ValidationFailed(_)) => (StatusCode::BAD_REQUEST, "validation_failed"),
            ApiError::Ledger(LedgerError::DuplicateReceiptId(_)) => (StatusCode::CONFLICT, "duplicate_receipt_id"),
            ApiError::Ledger(LedgerError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Ledger(LedgerError::Storage(StorageError::NotFound(_))) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Ledger(LedgerError::Storage(_)) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            ApiError::Auth(AuthError::Unauthorized) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
