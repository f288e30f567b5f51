//! Error types for the loan tracker

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Stable error codes the presentation layer keys user messages on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthenticated = 2,
    StoreFailure = 3,
    NotFound = 4,
    NotAvailable = 5,
    AlreadyReturned = 6,
    TransactionConflict = 7,
    IdentityMissing = 8,
    Duplicate = 9,
    BadValue = 10,
}

/// Main application error type.
///
/// The lending engine never swallows a transaction failure: every commit
/// path error maps onto one of these variants so the caller can tell a
/// missing entity, a business-rule violation, a transient conflict and an
/// unauthenticated caller apart.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("no copies of book {0} are available")]
    Unavailable(String),

    #[error("loan {0} has already been returned")]
    AlreadyReturned(String),

    /// Store-level contention that survived the engine's bounded retries.
    #[error("transaction conflict: concurrent update on the same documents")]
    TransactionConflict,

    #[error("caller identity is missing or not resolved")]
    IdentityMissing,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error")]
    Store(#[source] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppError::TransactionConflict,
            other => AppError::Store(other),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Unavailable(_) => ErrorCode::NotAvailable,
            AppError::AlreadyReturned(_) => ErrorCode::AlreadyReturned,
            AppError::TransactionConflict => ErrorCode::TransactionConflict,
            AppError::IdentityMissing => ErrorCode::IdentityMissing,
            AppError::Authentication(_) => ErrorCode::NotAuthenticated,
            AppError::Duplicate(_) => ErrorCode::Duplicate,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Store(_) => ErrorCode::StoreFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    /// Message safe to surface to a non-admin user. Store and internal
    /// failures are logged here and replaced with generic text so raw
    /// backend error strings never reach the caller.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Store(err) => {
                tracing::error!(error = ?err, "storage failure");
                "The service is temporarily unavailable.".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                "Internal error.".to_string()
            }
            AppError::TransactionConflict => {
                "The library is busy, please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
