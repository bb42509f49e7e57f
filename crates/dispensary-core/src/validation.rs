//! # Validation Module
//!
//! Field-level input validation for the dispensary.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler (axum)                                          │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: field rules (quantities, reasons, names)             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: line_validator / availability                                │
//! │  └── Cross-entity rules (prescribed qty, batch eligibility)            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity_remaining >= 0)                                   │
//! │  ├── UNIQUE (medicine_id, batch_number)                                │
//! │  └── Foreign keys, append-only allocation triggers                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::{MAX_LINE_QUANTITY, MAX_REASON_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an identifier supplied by a caller (path segment, body field).
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates a medicine name.
///
/// ## Example
/// ```rust
/// use dispensary_core::validation::validate_medicine_name;
///
/// assert!(validate_medicine_name("Paracetamol 500mg").is_ok());
/// assert!(validate_medicine_name("  ").is_err());
/// ```
pub fn validate_medicine_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a lot number.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, numbers, hyphens, underscores and slashes only
pub fn validate_batch_number(batch_number: &str) -> ValidationResult<()> {
    let batch_number = batch_number.trim();

    if batch_number.is_empty() {
        return Err(ValidationError::Required {
            field: "batch_number".to_string(),
        });
    }

    if batch_number.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "batch_number".to_string(),
            max: 50,
        });
    }

    if !batch_number
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '/')
    {
        return Err(ValidationError::InvalidFormat {
            field: "batch_number".to_string(),
            reason: "must contain only letters, numbers, hyphens, underscores, and slashes"
                .to_string(),
        });
    }

    Ok(())
}

/// Validates a cancel/reject reason.
///
/// ## Returns
/// The trimmed reason.
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }

    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LENGTH,
        });
    }

    Ok(reason.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a positive quantity (prescribed, requested or drawn).
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the stock a batch is received with. Zero is allowed.
pub fn validate_stock_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::OutOfRange {
            field: "quantity_remaining".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a unit price in cents. Zero is allowed (free-issue stock).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// A batch cannot expire before it was imported.
pub fn validate_batch_dates(import_date: NaiveDate, expiry_date: NaiveDate) -> ValidationResult<()> {
    if expiry_date < import_date {
        return Err(ValidationError::InvalidFormat {
            field: "expiry_date".to_string(),
            reason: format!("expiry {} is before import {}", expiry_date, import_date),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("prescription_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_id("prescription_id", "").is_err());
        assert!(validate_id("prescription_id", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_batch_number() {
        assert!(validate_batch_number("LOT-2024/07").is_ok());
        assert!(validate_batch_number("A_1").is_ok());

        assert!(validate_batch_number("").is_err());
        assert!(validate_batch_number("has space").is_err());
        assert!(validate_batch_number(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_reason_trims() {
        assert_eq!(validate_reason("  out of stock  ").unwrap(), "out of stock");
        assert!(validate_reason("   ").is_err());
        assert!(validate_reason(&"r".repeat(MAX_REASON_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity("quantity", 1).is_ok());
        assert!(validate_quantity("quantity", MAX_LINE_QUANTITY).is_ok());

        assert!(validate_quantity("quantity", 0).is_err());
        assert!(validate_quantity("quantity", -1).is_err());
        assert!(validate_quantity("quantity", MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_stock_and_price() {
        assert!(validate_stock_quantity(0).is_ok());
        assert!(validate_stock_quantity(-1).is_err());
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-100).is_err());
    }

    #[test]
    fn test_validate_batch_dates() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert!(validate_batch_dates(d(2024, 1, 1), d(2024, 1, 1)).is_ok());
        assert!(validate_batch_dates(d(2024, 1, 2), d(2024, 1, 1)).is_err());
    }
}
