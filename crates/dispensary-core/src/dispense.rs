//! # Dispense Types
//!
//! The two halves of the preview-then-commit protocol.
//!
//! ```text
//! ┌──────────────────────┐      pharmacist adjusts      ┌──────────────────────┐
//! │ PrescriptionPreview  │ ───────────────────────────► │ FulfillmentRequest   │
//! │  per line:           │   (may only lower quantities)│  per line:           │
//! │   availability       │                              │   [BatchDraw]        │
//! │   default plan       │                              │  payment_method      │
//! │  (read-only, stale)  │                              │  confirm_partial     │
//! └──────────────────────┘                              └──────────┬───────────┘
//!                                                                  │ commit
//!                                                       ┌──────────▼───────────┐
//!                                                       │ FulfillmentReceipt   │
//!                                                       │  allocations         │
//!                                                       │  payment             │
//!                                                       │  status = completed  │
//!                                                       └──────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::availability::{availability, BatchAvailability};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::planner::{plan, PlannedDraw};
use crate::types::{
    Allocation, Batch, Medicine, Payment, PaymentMethod, Prescription, PrescriptionLine,
    PrescriptionStatus,
};

// =============================================================================
// Request
// =============================================================================

/// Units to take from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BatchDraw {
    pub batch_id: String,
    pub quantity: i64,
}

/// All draws for one prescription line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LineDraws {
    pub line_id: String,
    #[serde(default)]
    pub draws: Vec<BatchDraw>,
}

/// What the pharmacist submits to dispense a prescription.
///
/// Lines left out of `lines` dispense nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FulfillmentRequest {
    pub lines: Vec<LineDraws>,
    pub payment_method: PaymentMethod,
    /// Must be true when any line dispenses less than prescribed.
    #[serde(default)]
    pub confirm_partial: bool,
}

impl FulfillmentRequest {
    /// Every batch id referenced by the request, deduplicated, sorted.
    pub fn batch_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lines
            .iter()
            .flat_map(|l| l.draws.iter().map(|d| d.batch_id.clone()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

// =============================================================================
// Receipt
// =============================================================================

/// Result of a committed fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FulfillmentReceipt {
    pub prescription_id: String,
    pub allocations: Vec<Allocation>,
    pub payment: Payment,
    pub prescription_status: PrescriptionStatus,
}

/// Σ unit_price × quantity over the allocations, checked for overflow.
pub fn payment_total(allocations: &[Allocation]) -> CoreResult<Money> {
    allocations.iter().try_fold(Money::zero(), |acc, a| {
        Money::from_cents(a.unit_price_cents)
            .checked_multiply_quantity(a.quantity_allocated)
            .and_then(|line| acc.checked_add(line))
            .ok_or_else(|| {
                CoreError::Validation(ValidationError::OutOfRange {
                    field: "payment amount".to_string(),
                    min: 0,
                    max: i64::MAX,
                })
            })
    })
}

// =============================================================================
// Preview
// =============================================================================

/// Availability and default plan for one prescription line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LinePreview {
    pub line_id: String,
    pub medicine_id: String,
    pub medicine_name: String,
    pub unit: String,
    pub quantity_prescribed: i64,
    pub total_available: i64,
    pub shortage: i64,
    pub can_fulfill: bool,
    pub batches: Vec<BatchAvailability>,
    pub plan: Vec<PlannedDraw>,
}

/// Read-only dispensing proposal for a whole prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PrescriptionPreview {
    pub prescription_id: String,
    pub status: PrescriptionStatus,
    pub lines: Vec<LinePreview>,
    pub can_fulfill_all: bool,
}

impl PrescriptionPreview {
    /// The default plan as a submit-ready request.
    ///
    /// `confirm_partial` is always false; a short plan only commits after
    /// the caller sets it explicitly.
    pub fn to_request(&self, payment_method: PaymentMethod) -> FulfillmentRequest {
        FulfillmentRequest {
            lines: self
                .lines
                .iter()
                .map(|l| LineDraws {
                    line_id: l.line_id.clone(),
                    draws: l
                        .plan
                        .iter()
                        .map(|d| BatchDraw {
                            batch_id: d.batch_id.clone(),
                            quantity: d.quantity,
                        })
                        .collect(),
                })
                .collect(),
            payment_method,
            confirm_partial: false,
        }
    }
}

/// Builds the preview from a snapshot of the prescription, its lines, the
/// medicines they reference and the candidate batches.
///
/// Each line is planned independently against the full shelf, so two lines
/// for the same medicine can both be shown as fulfillable while together
/// they are not. The commit path aggregates per batch and catches that.
pub fn build_preview(
    prescription: &Prescription,
    lines: &[PrescriptionLine],
    medicines: &HashMap<String, Medicine>,
    batches: &[Batch],
    today: NaiveDate,
) -> CoreResult<PrescriptionPreview> {
    if !prescription.use_hospital_pharmacy {
        return Err(CoreError::NotDispensedByPharmacy(prescription.id.clone()));
    }

    let mut previews = Vec::with_capacity(lines.len());
    for line in lines {
        let medicine = medicines
            .get(&line.medicine_id)
            .ok_or_else(|| CoreError::MedicineNotFound(line.medicine_id.clone()))?;

        let report = availability(&line.medicine_id, line.quantity_prescribed, batches, today)?;
        let default_plan = plan(&report.batches, line.quantity_prescribed);

        previews.push(LinePreview {
            line_id: line.id.clone(),
            medicine_id: medicine.id.clone(),
            medicine_name: medicine.name.clone(),
            unit: medicine.unit.clone(),
            quantity_prescribed: line.quantity_prescribed,
            total_available: report.total_available,
            shortage: report.shortage,
            can_fulfill: report.can_fulfill(),
            batches: report.batches,
            plan: default_plan.draws,
        });
    }

    let can_fulfill_all = previews.iter().all(|l| l.can_fulfill);

    Ok(PrescriptionPreview {
        prescription_id: prescription.id.clone(),
        status: prescription.status,
        lines: previews,
        can_fulfill_all,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
