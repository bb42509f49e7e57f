//! # Error Types
//!
//! Domain-specific error types for dispensary-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  dispensary-core errors (this file)                                    │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  dispensary-db errors (separate crate)                                 │
//! │  ├── DbError           - Database operation failures                   │
//! │  └── FulfillmentError  - Rejected (CoreError) | TransactionAborted     │
//! │                                                                         │
//! │  HTTP errors (in app)                                                  │
//! │  └── ApiError         - What the pharmacist UI sees (serialized)       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → FulfillmentError → ApiError       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry Semantics
//! Only [`CoreError::ConcurrentModification`] is retryable: the request was
//! valid when built but stock moved underneath it. Every other variant means
//! the request itself must change.

use thiserror::Error;

use crate::types::PrescriptionStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A requested draw breaks a line rule (over-prescribed, wrong medicine,
    /// unknown batch, duplicate batch, non-positive quantity).
    ///
    /// Never retryable: the pharmacist must change the request.
    #[error("Invalid allocation for line {line_id}: {reason}")]
    InvalidAllocation { line_id: String, reason: String },

    /// Eligible stock cannot cover the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Preview line (prescribed: 15)
    ///      │
    ///      ▼
    /// Eligible stock: 10
    ///      │
    ///      ▼
    /// InsufficientStock { medicine_id, requested: 15, available: 10 }
    ///      │
    ///      ▼
    /// UI offers: "Dispense 10 of 15 (partial)?"
    /// ```
    #[error("Insufficient stock for medicine {medicine_id}: available {available}, requested {requested}")]
    InsufficientStock {
        medicine_id: String,
        requested: i64,
        available: i64,
    },

    /// A referenced batch is expired, disposed or otherwise not dispensable.
    #[error("Batch {batch_id} is not eligible: {reason}")]
    BatchNotEligible { batch_id: String, reason: String },

    /// Stock changed between preview and commit, or another fulfillment
    /// holds the prescription. Safe to re-preview and retry.
    #[error("Concurrent modification: {reason}")]
    ConcurrentModification { reason: String },

    #[error("Prescription not found: {0}")]
    PrescriptionNotFound(String),

    #[error("Medicine not found: {0}")]
    MedicineNotFound(String),

    /// The prescription is not in a state that allows the operation.
    #[error("Prescription {prescription_id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        prescription_id: String,
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },

    /// The patient fills this prescription outside the hospital.
    #[error("Prescription {0} is not dispensed by the hospital pharmacy")]
    NotDispensedByPharmacy(String),

    /// The request dispenses less than prescribed without saying so.
    #[error("Line {line_id} dispenses {dispensing} of {prescribed} prescribed; partial fulfillment must be confirmed")]
    PartialNotConfirmed {
        line_id: String,
        prescribed: i64,
        dispensing: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Shorthand for [`CoreError::InvalidAllocation`].
    pub fn invalid_allocation(line_id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidAllocation {
            line_id: line_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may re-preview and resubmit the same intent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ConcurrentModification { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate batch number for a medicine).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
