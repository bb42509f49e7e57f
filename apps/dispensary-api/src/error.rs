//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Handler → Result<Json<T>, ApiError>                                    │
//! │                                                                         │
//! │  CoreError          InvalidAllocation, Validation     → 400             │
//! │                     PartialNotConfirmed, Insufficient → 422             │
//! │                     *NotFound                         → 404             │
//! │                     BatchNotEligible, status conflict → 409             │
//! │                     ConcurrentModification            → 409 retryable   │
//! │  FulfillmentError   TransactionAborted                → 503 retryable   │
//! │  DbError            busy / pool exhausted             → 503 retryable   │
//! │                     anything else                     → 500, logged     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The client always receives:
//! ```json
//! { "code": "CONCURRENT_MODIFICATION", "message": "...", "retryable": true }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use dispensary_core::CoreError;
use dispensary_db::{DbError, FulfillmentError};

/// Error body returned by every failing handler.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Whether re-previewing and submitting again may succeed
    pub retryable: bool,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    InvalidAllocation,
    PartialNotConfirmed,
    InsufficientStock,
    BatchNotEligible,
    InvalidStatusTransition,
    NotDispensedByPharmacy,
    ConcurrentModification,
    TransactionAborted,
    DatabaseError,
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError | ErrorCode::InvalidAllocation => StatusCode::BAD_REQUEST,
            ErrorCode::PartialNotConfirmed | ErrorCode::InsufficientStock => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::BatchNotEligible
            | ErrorCode::InvalidStatusTransition
            | ErrorCode::NotDispensedByPharmacy
            | ErrorCode::ConcurrentModification => StatusCode::CONFLICT,
            ErrorCode::TransactionAborted => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    /// Creates a new, non-retryable API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a retryable API error.
    pub fn retryable(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            retryable: true,
            ..ApiError::new(code, message)
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::PrescriptionNotFound(_) | CoreError::MedicineNotFound(_) => {
                ApiError::new(ErrorCode::NotFound, message)
            }
            CoreError::InvalidAllocation { .. } => ApiError::new(ErrorCode::InvalidAllocation, message),
            CoreError::Validation(_) => ApiError::new(ErrorCode::ValidationError, message),
            CoreError::PartialNotConfirmed { .. } => {
                ApiError::new(ErrorCode::PartialNotConfirmed, message)
            }
            CoreError::InsufficientStock { .. } => ApiError::new(ErrorCode::InsufficientStock, message),
            CoreError::BatchNotEligible { .. } => ApiError::new(ErrorCode::BatchNotEligible, message),
            CoreError::InvalidStatusTransition { .. } => {
                ApiError::new(ErrorCode::InvalidStatusTransition, message)
            }
            CoreError::NotDispensedByPharmacy(_) => {
                ApiError::new(ErrorCode::NotDispensedByPharmacy, message)
            }
            CoreError::ConcurrentModification { .. } => {
                ApiError::retryable(ErrorCode::ConcurrentModification, message)
            }
        }
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::Busy(_) | DbError::PoolExhausted => {
                tracing::warn!("Database busy: {}", err);
                ApiError::retryable(ErrorCode::TransactionAborted, "Database is busy, try again")
            }
            other => {
                // Log the actual error but return a generic message
                tracing::error!("Database operation failed: {}", other);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts fulfillment outcomes to API errors.
impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::Rejected(core) => core.into(),
            FulfillmentError::TransactionAborted(DbError::NotFound { entity, id }) => {
                ApiError::not_found(&entity, &id)
            }
            FulfillmentError::TransactionAborted(db) => {
                tracing::error!("Fulfillment transaction aborted: {}", db);
                ApiError::retryable(
                    ErrorCode::TransactionAborted,
                    "Fulfillment was not committed; nothing was changed",
                )
            }
        }
    }
}
