//! # Prescription Line Validator
//!
//! Checks a pharmacist's proposed draws against the line and against live
//! batch state. Runs twice per fulfillment:
//!
//! ```text
//!   request ──► validate_request(.., PreCommit)       stale snapshot
//!                   │  structural errors → InvalidAllocation
//!                   ▼
//!   BEGIN; lock prescription; re-read batches
//!                   │
//!                   ▼
//!               validate_request(.., InTransaction)   fresh reads
//!                   │  stock moved → ConcurrentModification
//!                   ▼
//!   decrement; insert allocations + payment; COMMIT
//! ```
//!
//! The same checks run both times; only the error a shortfall maps to differs.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use thiserror::Error;

use crate::dispense::{BatchDraw, FulfillmentRequest};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{Batch, Ineligibility, Prescription, PrescriptionLine, PrescriptionStatus};
use crate::MAX_LINE_QUANTITY;

// =============================================================================
// Rejection
// =============================================================================

/// Why a line's draws were refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineRejection {
    #[error("quantity {quantity} from batch {batch_id} must be positive")]
    NonPositiveQuantity { batch_id: String, quantity: i64 },

    #[error("batch {batch_id} appears more than once")]
    DuplicateBatch { batch_id: String },

    #[error("requested {requested} exceeds prescribed quantity {prescribed}")]
    ExceedsPrescribed { prescribed: i64, requested: i64 },

    #[error("batch {batch_id} does not exist")]
    UnknownBatch { batch_id: String },

    #[error("batch {batch_id} holds medicine {actual}, line needs {expected}")]
    WrongMedicine {
        batch_id: String,
        expected: String,
        actual: String,
    },

    #[error("batch {batch_id}: {reason}")]
    NotEligible {
        batch_id: String,
        reason: Ineligibility,
    },

    #[error("batch {batch_id} has {remaining} remaining, {requested} requested")]
    ExceedsRemaining {
        batch_id: String,
        remaining: i64,
        requested: i64,
    },
}

/// When the check ran. Decides how a stock shortfall is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckContext {
    /// Against a snapshot read outside the commit transaction.
    PreCommit,
    /// Against fresh reads taken under the write lock.
    InTransaction,
}

impl LineRejection {
    pub fn into_core_error(self, line_id: &str, context: CheckContext) -> CoreError {
        match self {
            LineRejection::NotEligible { batch_id, reason } => CoreError::BatchNotEligible {
                batch_id,
                reason: reason.to_string(),
            },
            LineRejection::ExceedsRemaining { .. } if context == CheckContext::InTransaction => {
                CoreError::ConcurrentModification {
                    reason: format!("line {}: {}", line_id, self),
                }
            }
            other => CoreError::invalid_allocation(line_id, other.to_string()),
        }
    }
}

// =============================================================================
// Single Line
// =============================================================================

/// Outcome of a line that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCheck {
    pub line_id: String,
    pub medicine_id: String,
    pub prescribed: i64,
    pub dispensed: i64,
}

impl LineCheck {
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.dispensed < self.prescribed
    }
}

/// Validates the draws proposed for one line.
///
/// `live` maps batch id to the batch as currently stored. Checks, in order:
/// positive quantities, no repeated batch, total within the prescription,
/// then for each draw that the batch exists, holds the line's medicine, is
/// eligible on `today` and has enough units.
pub fn validate_line(
    line: &PrescriptionLine,
    draws: &[BatchDraw],
    live: &HashMap<String, Batch>,
    today: NaiveDate,
) -> Result<LineCheck, LineRejection> {
    let mut seen = HashSet::with_capacity(draws.len());
    let mut requested: i64 = 0;

    for draw in draws {
        if draw.quantity <= 0 {
            return Err(LineRejection::NonPositiveQuantity {
                batch_id: draw.batch_id.clone(),
                quantity: draw.quantity,
            });
        }
        if !seen.insert(draw.batch_id.as_str()) {
            return Err(LineRejection::DuplicateBatch {
                batch_id: draw.batch_id.clone(),
            });
        }
        // Saturating keeps absurd inputs in the ExceedsPrescribed branch.
        requested = requested.saturating_add(draw.quantity);
    }

    if requested > line.quantity_prescribed || requested > MAX_LINE_QUANTITY {
        return Err(LineRejection::ExceedsPrescribed {
            prescribed: line.quantity_prescribed,
            requested,
        });
    }

    for draw in draws {
        let batch = live
            .get(&draw.batch_id)
            .ok_or_else(|| LineRejection::UnknownBatch {
                batch_id: draw.batch_id.clone(),
            })?;

        if batch.medicine_id != line.medicine_id {
            return Err(LineRejection::WrongMedicine {
                batch_id: batch.id.clone(),
                expected: line.medicine_id.clone(),
                actual: batch.medicine_id.clone(),
            });
        }

        if let Some(reason) = batch.ineligibility(today) {
            return Err(LineRejection::NotEligible {
                batch_id: batch.id.clone(),
                reason,
            });
        }

        if draw.quantity > batch.quantity_remaining {
            return Err(LineRejection::ExceedsRemaining {
                batch_id: batch.id.clone(),
                remaining: batch.quantity_remaining,
                requested: draw.quantity,
            });
        }
    }

    Ok(LineCheck {
        line_id: line.id.clone(),
        medicine_id: line.medicine_id.clone(),
        prescribed: line.quantity_prescribed,
        dispensed: requested,
    })
}

// =============================================================================
// Whole Request
// =============================================================================

/// One accepted draw, ready to become an allocation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraw {
    pub line_id: String,
    pub batch_id: String,
    pub medicine_id: String,
    pub quantity: i64,
}

/// A request that passed every check against one view of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// One entry per prescription line, in prescription order.
    pub lines: Vec<LineCheck>,
    pub draws: Vec<ValidatedDraw>,
}

impl ValidatedRequest {
    pub fn total_dispensed(&self) -> i64 {
        self.lines.iter().map(|l| l.dispensed).sum()
    }

    /// Units drawn per batch across all lines.
    pub fn per_batch(&self) -> HashMap<&str, i64> {
        let mut totals: HashMap<&str, i64> = HashMap::new();
        for draw in &self.draws {
            *totals.entry(draw.batch_id.as_str()).or_default() += draw.quantity;
        }
        totals
    }
}

/// Validates a whole fulfillment request.
///
/// Beyond [`validate_line`]: the prescription must be dispensable here, every
/// `line_id` must belong to it and appear once, at least one unit must be
/// dispensed, per-batch totals across lines must fit the batch, and any
/// short line needs `confirm_partial`.
pub fn validate_request(
    prescription: &Prescription,
    lines: &[PrescriptionLine],
    request: &FulfillmentRequest,
    live: &HashMap<String, Batch>,
    today: NaiveDate,
    context: CheckContext,
) -> CoreResult<ValidatedRequest> {
    if !prescription.use_hospital_pharmacy {
        return Err(CoreError::NotDispensedByPharmacy(prescription.id.clone()));
    }
    prescription
        .status
        .ensure_transition(&prescription.id, PrescriptionStatus::Completed)?;

    let by_id: HashMap<&str, &PrescriptionLine> =
        lines.iter().map(|l| (l.id.as_str(), l)).collect();

    let mut requested: HashMap<&str, &[BatchDraw]> = HashMap::new();
    for entry in &request.lines {
        if !by_id.contains_key(entry.line_id.as_str()) {
            return Err(CoreError::invalid_allocation(
                &entry.line_id,
                format!("line does not belong to prescription {}", prescription.id),
            ));
        }
        if requested
            .insert(entry.line_id.as_str(), entry.draws.as_slice())
            .is_some()
        {
            return Err(CoreError::invalid_allocation(
                &entry.line_id,
                "line appears more than once",
            ));
        }
    }

    let mut checks = Vec::with_capacity(lines.len());
    let mut draws = Vec::new();
    let mut batch_totals: HashMap<&str, i64> = HashMap::new();

    for line in lines {
        let line_draws = requested.get(line.id.as_str()).copied().unwrap_or(&[]);
        let check = validate_line(line, line_draws, live, today)
            .map_err(|r| r.into_core_error(&line.id, context))?;

        for draw in line_draws {
            let total = batch_totals.entry(draw.batch_id.as_str()).or_default();
            *total += draw.quantity;

            // validate_line already proved the batch exists
            let remaining = live
                .get(&draw.batch_id)
                .map(|b| b.quantity_remaining)
                .unwrap_or(0);
            if *total > remaining {
                return Err(LineRejection::ExceedsRemaining {
                    batch_id: draw.batch_id.clone(),
                    remaining,
                    requested: *total,
                }
                .into_core_error(&line.id, context));
            }

            draws.push(ValidatedDraw {
                line_id: line.id.clone(),
                batch_id: draw.batch_id.clone(),
                medicine_id: line.medicine_id.clone(),
                quantity: draw.quantity,
            });
        }

        checks.push(check);
    }

    if draws.is_empty() {
        return Err(CoreError::Validation(ValidationError::MustBePositive {
            field: "dispensed quantity".to_string(),
        }));
    }

    if !request.confirm_partial {
        if let Some(short) = checks.iter().find(|c| c.is_partial()) {
            return Err(CoreError::PartialNotConfirmed {
                line_id: short.line_id.clone(),
                prescribed: short.prescribed,
                dispensing: short.dispensed,
            });
        }
    }

    Ok(ValidatedRequest {
        lines: checks,
        draws,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispense::LineDraws;
    use crate::types::{BatchStatus, PaymentMethod};
    use chrono::Utc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn today() -> NaiveDate {
        d(2024, 12, 1)
    }

    fn line(id: &str, medicine_id: &str, qty: i64) -> PrescriptionLine {
        PrescriptionLine {
            id: id.into(),
            prescription_id: "rx-1".into(),
            medicine_id: medicine_id.into(),
            quantity_prescribed: qty,
            dosage: None,
            frequency: None,
            duration: None,
            instructions: None,
        }
    }

    fn prescription() -> Prescription {
        let now = Utc::now();
        Prescription {
            id: "rx-1".into(),
            appointment_id: "appt-1".into(),
            status: PrescriptionStatus::Processing,
            note: None,
            use_hospital_pharmacy: true,
            status_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn live() -> HashMap<String, Batch> {
        let mut disposed = Batch::new("gone", "para", "LOT-G", 100, d(2024, 1, 1), d(2026, 1, 1));
        disposed.status = BatchStatus::Disposed;

        [
            Batch::new("a", "para", "LOT-A", 20, d(2024, 1, 1), d(2025, 1, 1)),
            Batch::new("b", "para", "LOT-B", 50, d(2024, 6, 1), d(2025, 6, 1)),
            Batch::new("old", "para", "LOT-O", 9, d(2023, 1, 1), d(2024, 11, 1)),
            Batch::new("x", "amox", "LOT-X", 5, d(2024, 1, 1), d(2025, 3, 1)),
            disposed,
        ]
        .into_iter()
        .map(|b| (b.id.clone(), b))
        .collect()
    }

    fn draw(batch_id: &str, quantity: i64) -> BatchDraw {
        BatchDraw {
            batch_id: batch_id.into(),
            quantity,
        }
    }

    fn request(lines: Vec<(&str, Vec<BatchDraw>)>, confirm_partial: bool) -> FulfillmentRequest {
        FulfillmentRequest {
            lines: lines
                .into_iter()
                .map(|(id, draws)| LineDraws {
                    line_id: id.into(),
                    draws,
                })
                .collect(),
            payment_method: PaymentMethod::Cash,
            confirm_partial,
        }
    }

    // -------------------------------------------------------------------------
    // validate_line
    // -------------------------------------------------------------------------

    #[test]
    fn test_line_accepts_valid_draws() {
        let check = validate_line(&line("l1", "para", 30), &[draw("a", 20), draw("b", 10)], &live(), today())
            .unwrap();
        assert_eq!(check.dispensed, 30);
        assert!(!check.is_partial());
    }

    #[test]
    fn test_line_rejects_non_positive() {
        let err = validate_line(&line("l1", "para", 30), &[draw("a", 0)], &live(), today()).unwrap_err();
        assert!(matches!(err, LineRejection::NonPositiveQuantity { .. }));

        let err = validate_line(&line("l1", "para", 30), &[draw("a", -3)], &live(), today()).unwrap_err();
        assert!(matches!(err, LineRejection::NonPositiveQuantity { quantity: -3, .. }));
    }

    #[test]
    fn test_line_rejects_duplicate_batch() {
        let err = validate_line(&line("l1", "para", 30), &[draw("a", 5), draw("a", 5)], &live(), today())
            .unwrap_err();
        assert_eq!(err, LineRejection::DuplicateBatch { batch_id: "a".into() });
    }

    #[test]
    fn test_line_rejects_over_prescribed() {
        let err = validate_line(&line("l1", "para", 25), &[draw("a", 20), draw("b", 10)], &live(), today())
            .unwrap_err();
        assert_eq!(
            err,
            LineRejection::ExceedsPrescribed {
                prescribed: 25,
                requested: 30
            }
        );
    }

    #[test]
    fn test_line_rejects_unknown_and_foreign_batches() {
        let err = validate_line(&line("l1", "para", 5), &[draw("nope", 1)], &live(), today()).unwrap_err();
        assert!(matches!(err, LineRejection::UnknownBatch { .. }));

        let err = validate_line(&line("l1", "para", 5), &[draw("x", 1)], &live(), today()).unwrap_err();
        assert!(matches!(err, LineRejection::WrongMedicine { .. }));
    }

    #[test]
    fn test_line_rejects_ineligible_batches() {
        let err = validate_line(&line("l1", "para", 5), &[draw("old", 1)], &live(), today()).unwrap_err();
        assert!(matches!(
            err,
            LineRejection::NotEligible {
                reason: Ineligibility::PastExpiry { .. },
                ..
            }
        ));

        let err = validate_line(&line("l1", "para", 5), &[draw("gone", 1)], &live(), today()).unwrap_err();
        assert!(matches!(
            err,
            LineRejection::NotEligible {
                reason: Ineligibility::Disposed,
                ..
            }
        ));
    }

    #[test]
    fn test_line_rejects_more_than_remaining() {
        let err = validate_line(&line("l1", "para", 30), &[draw("a", 21)], &live(), today()).unwrap_err();
        assert!(matches!(err, LineRejection::ExceedsRemaining { remaining: 20, .. }));
    }

    #[test]
    fn test_empty_draws_dispense_nothing() {
        let check = validate_line(&line("l1", "para", 30), &[], &live(), today()).unwrap();
        assert_eq!(check.dispensed, 0);
        assert!(check.is_partial());
    }

    #[test]
    fn test_rejection_mapping_depends_on_context() {
        let shortfall = LineRejection::ExceedsRemaining {
            batch_id: "a".into(),
            remaining: 3,
            requested: 5,
        };
        assert!(matches!(
            shortfall.clone().into_core_error("l1", CheckContext::PreCommit),
            CoreError::InvalidAllocation { .. }
        ));
        let err = shortfall.into_core_error("l1", CheckContext::InTransaction);
        assert!(err.is_retryable());

        let ineligible = LineRejection::NotEligible {
            batch_id: "a".into(),
            reason: Ineligibility::Disposed,
        };
        assert!(matches!(
            ineligible.into_core_error("l1", CheckContext::InTransaction),
            CoreError::BatchNotEligible { .. }
        ));
    }

    // -------------------------------------------------------------------------
    // validate_request
    // -------------------------------------------------------------------------

    #[test]
    fn test_request_full_fulfillment() {
        let lines = vec![line("l1", "para", 30), line("l2", "amox", 5)];
        let req = request(
            vec![("l1", vec![draw("a", 20), draw("b", 10)]), ("l2", vec![draw("x", 5)])],
            false,
        );

        let validated =
            validate_request(&prescription(), &lines, &req, &live(), today(), CheckContext::PreCommit)
                .unwrap();
        assert_eq!(validated.total_dispensed(), 35);
        assert_eq!(validated.draws.len(), 3);
        assert_eq!(validated.per_batch()["a"], 20);
    }

    #[test]
    fn test_request_partial_needs_confirmation() {
        let lines = vec![line("l1", "para", 80)];
        let plan = vec![("l1", vec![draw("a", 20), draw("b", 50)])];

        let err = validate_request(
            &prescription(),
            &lines,
            &request(plan.clone(), false),
            &live(),
            today(),
            CheckContext::PreCommit,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::PartialNotConfirmed {
                prescribed: 80,
                dispensing: 70,
                ..
            }
        ));

        let ok = validate_request(
            &prescription(),
            &lines,
            &request(plan, true),
            &live(),
            today(),
            CheckContext::PreCommit,
        )
        .unwrap();
        assert_eq!(ok.total_dispensed(), 70);
    }

    #[test]
    fn test_absent_line_counts_as_partial() {
        let lines = vec![line("l1", "para", 5), line("l2", "amox", 5)];
        let req = request(vec![("l1", vec![draw("a", 5)])], false);

        let err = validate_request(&prescription(), &lines, &req, &live(), today(), CheckContext::PreCommit)
            .unwrap_err();
        assert!(matches!(err, CoreError::PartialNotConfirmed { line_id, .. } if line_id == "l2"));
    }

    #[test]
    fn test_request_rejects_foreign_and_duplicate_lines() {
        let lines = vec![line("l1", "para", 5)];

        let req = request(vec![("other", vec![draw("a", 1)])], true);
        let err = validate_request(&prescription(), &lines, &req, &live(), today(), CheckContext::PreCommit)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAllocation { line_id, .. } if line_id == "other"));

        let req = request(vec![("l1", vec![draw("a", 1)]), ("l1", vec![draw("b", 1)])], true);
        let err = validate_request(&prescription(), &lines, &req, &live(), today(), CheckContext::PreCommit)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAllocation { .. }));
    }

    #[test]
    fn test_request_must_dispense_something() {
        let lines = vec![line("l1", "para", 5)];
        let req = request(vec![("l1", vec![])], true);
        let err = validate_request(&prescription(), &lines, &req, &live(), today(), CheckContext::PreCommit)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_request_aggregates_shared_batch_across_lines() {
        let lines = vec![line("l1", "para", 15), line("l2", "para", 15)];
        let req = request(
            vec![("l1", vec![draw("a", 15)]), ("l2", vec![draw("a", 10)])],
            true,
        );

        let err = validate_request(&prescription(), &lines, &req, &live(), today(), CheckContext::PreCommit)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAllocation { line_id, .. } if line_id == "l2"));

        let err =
            validate_request(&prescription(), &lines, &req, &live(), today(), CheckContext::InTransaction)
                .unwrap_err();
        assert!(matches!(err, CoreError::ConcurrentModification { .. }));
    }

    #[test]
    fn test_request_checks_prescription_state() {
        let lines = vec![line("l1", "para", 5)];
        let req = request(vec![("l1", vec![draw("a", 5)])], false);

        let mut rx = prescription();
        rx.status = PrescriptionStatus::Completed;
        let err = validate_request(&rx, &lines, &req, &live(), today(), CheckContext::PreCommit)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStatusTransition { .. }));

        let mut rx = prescription();
        rx.use_hospital_pharmacy = false;
        let err = validate_request(&rx, &lines, &req, &live(), today(), CheckContext::PreCommit)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotDispensedByPharmacy(_)));
    }
}
