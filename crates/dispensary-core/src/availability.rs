//! # Availability Calculator
//!
//! Answers "how much of this medicine can we dispense today, and from which
//! lots, in which order?"
//!
//! ## FIFO-by-Expiry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  candidate batches (any order, any medicine, any status)               │
//! │        │                                                               │
//! │        ▼  filter: medicine_id matches                                  │
//! │        ▼  filter: status == Active AND expiry_date >= today            │
//! │        ▼  filter: quantity_remaining > 0                               │
//! │        │                                                               │
//! │        ▼  sort:   expiry_date ↑, import_date ↑, batch_id ↑             │
//! │        │          (total order, so previews are reproducible)          │
//! │        ▼                                                               │
//! │  AvailabilityReport { batches, total_available, shortage }            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The soonest-expiring lot leaves the shelf first, which minimises waste.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::Batch;
use crate::validation::validate_quantity;

// =============================================================================
// Report Types
// =============================================================================

/// One eligible lot as seen by the planner and the preview screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BatchAvailability {
    pub batch_id: String,
    pub batch_number: String,
    #[ts(as = "String")]
    pub expiry_date: NaiveDate,
    #[ts(as = "String")]
    pub import_date: NaiveDate,
    pub quantity_remaining: i64,
}

impl From<&Batch> for BatchAvailability {
    fn from(batch: &Batch) -> Self {
        BatchAvailability {
            batch_id: batch.id.clone(),
            batch_number: batch.batch_number.clone(),
            expiry_date: batch.expiry_date,
            import_date: batch.import_date,
            quantity_remaining: batch.quantity_remaining,
        }
    }
}

/// Eligible stock for one medicine against one requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AvailabilityReport {
    pub medicine_id: String,
    pub quantity_requested: i64,
    /// Eligible lots in dispensing order.
    pub batches: Vec<BatchAvailability>,
    pub total_available: i64,
    /// `max(0, quantity_requested - total_available)`
    pub shortage: i64,
}

impl AvailabilityReport {
    #[inline]
    pub fn can_fulfill(&self) -> bool {
        self.shortage == 0
    }

    /// Fails with `InsufficientStock` when the request cannot be covered.
    pub fn ensure_sufficient(&self) -> CoreResult<()> {
        if self.can_fulfill() {
            return Ok(());
        }

        Err(CoreError::InsufficientStock {
            medicine_id: self.medicine_id.clone(),
            requested: self.quantity_requested,
            available: self.total_available,
        })
    }
}

// =============================================================================
// Ordering & Selection
// =============================================================================

/// Dispensing order: earliest expiry, then earliest import, then id.
pub fn fifo_order(a: &Batch, b: &Batch) -> Ordering {
    a.expiry_date
        .cmp(&b.expiry_date)
        .then_with(|| a.import_date.cmp(&b.import_date))
        .then_with(|| a.id.cmp(&b.id))
}

/// Returns the batches of `medicine_id` that can be drawn from on `today`,
/// in dispensing order. Empty lots are skipped.
pub fn eligible_batches<'a>(
    medicine_id: &str,
    batches: &'a [Batch],
    today: NaiveDate,
) -> Vec<&'a Batch> {
    let mut eligible: Vec<&Batch> = batches
        .iter()
        .filter(|b| b.medicine_id == medicine_id)
        .filter(|b| b.is_eligible(today))
        .filter(|b| b.quantity_remaining > 0)
        .collect();

    eligible.sort_by(|a, b| fifo_order(a, b));
    eligible
}

// =============================================================================
// Availability
// =============================================================================

/// Computes eligible stock for `medicine_id` against `quantity_requested`.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use dispensary_core::availability::availability;
/// use dispensary_core::types::Batch;
///
/// let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
/// let batches = vec![
///     Batch::new("a", "PARA-500", "LOT-A", 20, d(2024, 1, 1), d(2025, 1, 1)),
///     Batch::new("b", "PARA-500", "LOT-B", 50, d(2024, 6, 1), d(2025, 6, 1)),
/// ];
///
/// let report = availability("PARA-500", 80, &batches, d(2024, 12, 1)).unwrap();
/// assert_eq!(report.total_available, 70);
/// assert_eq!(report.shortage, 10);
/// assert!(!report.can_fulfill());
/// ```
pub fn availability(
    medicine_id: &str,
    quantity_requested: i64,
    batches: &[Batch],
    today: NaiveDate,
) -> CoreResult<AvailabilityReport> {
    validate_quantity("quantity_requested", quantity_requested)?;

    let ordered: Vec<BatchAvailability> = eligible_batches(medicine_id, batches, today)
        .into_iter()
        .map(BatchAvailability::from)
        .collect();

    let total_available: i64 = ordered.iter().map(|b| b.quantity_remaining).sum();
    let shortage = (quantity_requested - total_available).max(0);

    Ok(AvailabilityReport {
        medicine_id: medicine_id.to_string(),
        quantity_requested,
        batches: ordered,
        total_available,
        shortage,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchStatus;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn paracetamol_batches() -> Vec<Batch> {
        vec![
            Batch::new("b", "PARA-500", "LOT-B", 50, d(2024, 6, 1), d(2025, 6, 1)),
            Batch::new("a", "PARA-500", "LOT-A", 20, d(2024, 1, 1), d(2025, 1, 1)),
        ]
    }

    #[test]
    fn test_orders_by_expiry_then_import_then_id() {
        let batches = vec![
            Batch::new("z", "m", "LOT-Z", 5, d(2024, 2, 1), d(2025, 1, 1)),
            Batch::new("y", "m", "LOT-Y", 5, d(2024, 1, 1), d(2025, 1, 1)),
            Batch::new("x", "m", "LOT-X", 5, d(2024, 1, 1), d(2025, 1, 1)),
            Batch::new("w", "m", "LOT-W", 5, d(2024, 3, 1), d(2024, 12, 31)),
        ];

        let report = availability("m", 1, &batches, d(2024, 6, 1)).unwrap();
        let ids: Vec<&str> = report.batches.iter().map(|b| b.batch_id.as_str()).collect();
        assert_eq!(ids, vec!["w", "x", "y", "z"]);
    }

    #[test]
    fn test_sufficient_stock() {
        let report = availability("PARA-500", 30, &paracetamol_batches(), d(2024, 12, 1)).unwrap();

        assert_eq!(report.total_available, 70);
        assert_eq!(report.shortage, 0);
        assert!(report.can_fulfill());
        assert!(report.ensure_sufficient().is_ok());
        assert_eq!(report.batches[0].batch_id, "a");
    }

    #[test]
    fn test_shortage() {
        let report = availability("PARA-500", 80, &paracetamol_batches(), d(2024, 12, 1)).unwrap();

        assert_eq!(report.shortage, 10);
        match report.ensure_sufficient() {
            Err(CoreError::InsufficientStock {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 80);
                assert_eq!(available, 70);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
    }

    #[test]
    fn test_excludes_ineligible_and_foreign_batches() {
        let mut disposed = Batch::new("c", "PARA-500", "LOT-C", 100, d(2024, 1, 1), d(2026, 1, 1));
        disposed.status = BatchStatus::Disposed;
        let mut marked = Batch::new("e", "PARA-500", "LOT-E", 100, d(2024, 1, 1), d(2026, 1, 1));
        marked.status = BatchStatus::Expired;

        let batches = vec![
            Batch::new("a", "PARA-500", "LOT-A", 20, d(2023, 1, 1), d(2024, 11, 30)),
            Batch::new("b", "PARA-500", "LOT-B", 50, d(2024, 6, 1), d(2025, 6, 1)),
            Batch::new("o", "AMOX-250", "LOT-O", 99, d(2024, 1, 1), d(2026, 1, 1)),
            Batch::new("z", "PARA-500", "LOT-Z", 0, d(2024, 1, 1), d(2026, 1, 1)),
            disposed,
            marked,
        ];

        let report = availability("PARA-500", 10, &batches, d(2024, 12, 1)).unwrap();
        assert_eq!(report.batches.len(), 1);
        assert_eq!(report.batches[0].batch_id, "b");
        assert_eq!(report.total_available, 50);
    }

    #[test]
    fn test_expiry_today_counts() {
        let batches = vec![Batch::new("a", "m", "LOT-A", 7, d(2024, 1, 1), d(2024, 12, 1))];
        let report = availability("m", 7, &batches, d(2024, 12, 1)).unwrap();
        assert_eq!(report.total_available, 7);
    }

    #[test]
    fn test_no_stock_at_all() {
        let report = availability("m", 5, &[], d(2024, 12, 1)).unwrap();
        assert!(report.batches.is_empty());
        assert_eq!(report.total_available, 0);
        assert_eq!(report.shortage, 5);
    }

    #[test]
    fn test_rejects_non_positive_request() {
        let err = availability("m", 0, &[], d(2024, 12, 1)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
