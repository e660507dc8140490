//! Ledger error types with HTTP status code mapping.
//!
//! [`LedgerError`] is the central error type for the service. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! Retry classification is done on the variant, never on the message text:
//! see [`LedgerError::is_retryable`].

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{AccountId, TransferId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "message": "insufficient balance in account 1: available 20, requested 50",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`LedgerError`] code ranges).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A version-checked balance write that matched zero rows.
///
/// Produced by the balance projection when the stored version no longer
/// equals the version the writer read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionConflict {
    /// Account whose balance row was contended.
    pub account_id: AccountId,
    /// Version the writer expected to find.
    pub expected_version: i64,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "optimistic lock violation on account {} at version {}",
            self.account_id, self.expected_version
        )
    }
}

impl std::error::Error for VersionConflict {}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category         | HTTP Status                      |
/// |-----------|------------------|----------------------------------|
/// | 1000–1999 | Validation       | 400 Bad Request                  |
/// | 2000–2999 | State/Not Found  | 404 Not Found / 409 Conflict     |
/// | 3000–3999 | Server           | 500 / 503 / 504                  |
/// | 4000–4999 | Ledger rules     | 422 Unprocessable Entity / 409   |
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or semantically invalid request.
    #[error("invalid request: {0}")]
    Validation(String),

    /// An account with the given ID already exists.
    #[error("account {0} already exists")]
    AlreadyExists(AccountId),

    /// Account with the given ID was not found.
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// Transfer with the given ID was not found.
    #[error("transfer {0} not found")]
    TransferNotFound(TransferId),

    /// Source account cannot cover the transfer amount.
    #[error(
        "insufficient balance in account {account_id}: available {available}, requested {requested}"
    )]
    InsufficientBalance {
        /// Source account.
        account_id: AccountId,
        /// Balance at the time of validation.
        available: Decimal,
        /// Requested transfer amount.
        requested: Decimal,
    },

    /// Optimistic lock violation from a concurrent writer. Retryable.
    #[error("{0}")]
    Conflict(VersionConflict),

    /// Every attempt allowed by the retry policy ended in a conflict.
    #[error("transfer abandoned after {attempts} attempts due to concurrent modifications")]
    ExhaustedRetries {
        /// Number of attempts made.
        attempts: u32,
        /// Conflict observed by the final attempt.
        #[source]
        last: VersionConflict,
    },

    /// Lower-level storage failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns `true` if the failed attempt may be resubmitted as-is.
    ///
    /// Only [`LedgerError::Conflict`] qualifies.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::AccountNotFound(_) => 2001,
            Self::TransferNotFound(_) => 2002,
            Self::AlreadyExists(_) => 2003,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Cancelled => 3002,
            Self::DeadlineExceeded => 3003,
            Self::InsufficientBalance { .. } => 4001,
            Self::Conflict(_) => 4090,
            Self::ExhaustedRetries { .. } => 4091,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AccountNotFound(_) | Self::TransferNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) | Self::Conflict(_) | Self::ExhaustedRetries { .. } => {
                StatusCode::CONFLICT
            }
            Self::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<VersionConflict> for LedgerError {
    fn from(conflict: VersionConflict) -> Self {
        Self::Conflict(conflict)
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::ExhaustedRetries { last, .. } => Some(last.to_string()),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
