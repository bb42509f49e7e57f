//! # Domain Types
//!
//! Core domain types used throughout the dispensary.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Medicine     │◄──│      Batch      │   │  Prescription   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name, unit     │   │  batch_number   │   │  appointment_id │       │
//! │  │  unit_price     │   │  qty_remaining  │   │  status         │       │
//! │  └─────────────────┘   │  expiry_date    │   └────────┬────────┘       │
//! │                        └────────┬────────┘            │ 1..n           │
//! │                                 │            ┌────────▼────────┐       │
//! │                                 │            │PrescriptionLine │       │
//! │                                 │            │  qty_prescribed │       │
//! │                                 │            └────────┬────────┘       │
//! │                                 │ 1..n                │ 0..n           │
//! │                        ┌────────▼─────────────────────▼────────┐       │
//! │                        │    Allocation (append-only ledger)    │       │
//! │                        │    line × batch × quantity_allocated  │       │
//! │                        └───────────────────────────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Payment      │   │  PaymentMethod  │   │  PaymentStatus  │       │
//! │  │  one per Rx     │   │  Cash, EWallet  │   │  Pending, Paid  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity carries a UUID v4 `id` used for relations. Batches also carry
//! a human-readable `batch_number` (the lot printed on the box), unique per
//! medicine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Medicine
// =============================================================================

/// A medicine in the hospital formulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to the pharmacist.
    pub name: String,

    /// Dispensing unit ("tablet", "capsule", "ml").
    pub unit: String,

    /// Price of one unit in cents.
    pub unit_price_cents: i64,

    /// Supplier name, informational only.
    pub supplier: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Medicine {
    /// Returns the unit price as a Money type.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

// =============================================================================
// Batch Status
// =============================================================================

/// Administrative status of a batch.
///
/// Only `Active` batches can be dispensed from. `Expired` is set by the
/// pharmacy once a lot is pulled from the shelf; a batch past its expiry date
/// that is still marked `Active` is ineligible anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Expired,
    Disposed,
}

impl BatchStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Expired => "expired",
            BatchStatus::Disposed => "disposed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BatchStatus::Active),
            "expired" => Ok(BatchStatus::Expired),
            "disposed" => Ok(BatchStatus::Disposed),
            _ => Err(ValidationError::NotAllowed {
                field: "batch_status".to_string(),
                allowed: vec!["active".into(), "expired".into(), "disposed".into()],
            }),
        }
    }
}

// =============================================================================
// Batch
// =============================================================================

/// A lot of one medicine received on one import date.
///
/// ## Eligibility
/// ```text
/// status == Active  AND  expiry_date >= today  AND  quantity_remaining > 0
///        │                      │                          │
///        │                      │                          └─ empty lots are skipped
///        │                      └─ expiring today is still usable
///        └─ expired/disposed lots are never touched
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Medicine this lot belongs to.
    pub medicine_id: String,

    /// Lot number printed on the packaging. Unique per medicine.
    pub batch_number: String,

    /// Units left on the shelf. Never negative.
    pub quantity_remaining: i64,

    #[ts(as = "String")]
    pub import_date: NaiveDate,

    #[ts(as = "String")]
    pub expiry_date: NaiveDate,

    pub status: BatchStatus,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// Creates a new active batch stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        medicine_id: impl Into<String>,
        batch_number: impl Into<String>,
        quantity_remaining: i64,
        import_date: NaiveDate,
        expiry_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Batch {
            id: id.into(),
            medicine_id: medicine_id.into(),
            batch_number: batch_number.into(),
            quantity_remaining,
            import_date,
            expiry_date,
            status: BatchStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns why this batch cannot be drawn from today, if anything.
    ///
    /// Quantity is not part of this check: an active, unexpired batch with
    /// zero units is still "eligible" and simply has nothing to give.
    pub fn ineligibility(&self, today: NaiveDate) -> Option<Ineligibility> {
        match self.status {
            BatchStatus::Expired => return Some(Ineligibility::MarkedExpired),
            BatchStatus::Disposed => return Some(Ineligibility::Disposed),
            BatchStatus::Active => {}
        }

        if self.expiry_date < today {
            return Some(Ineligibility::PastExpiry {
                expiry_date: self.expiry_date,
            });
        }

        None
    }

    /// Checks if this batch can be dispensed from on `today`.
    #[inline]
    pub fn is_eligible(&self, today: NaiveDate) -> bool {
        self.ineligibility(today).is_none()
    }
}

/// Reason a batch cannot be dispensed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    MarkedExpired,
    Disposed,
    PastExpiry { expiry_date: NaiveDate },
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::MarkedExpired => f.write_str("batch is marked expired"),
            Ineligibility::Disposed => f.write_str("batch has been disposed"),
            Ineligibility::PastExpiry { expiry_date } => {
                write!(f, "batch expired on {}", expiry_date)
            }
        }
    }
}

// =============================================================================
// Prescription Status
// =============================================================================

/// Lifecycle of a prescription inside the pharmacy.
///
/// ## State Machine
/// ```text
///   ┌────────────────┐   process    ┌────────────┐
///   │ PendingPrepare │─────────────►│ Processing │
///   └───┬────┬───┬───┘              └─┬────┬─────┘
///       │    │   │      fulfill       │    │
///       │    │   └──────────┐ ┌───────┘    │
///       │    │              ▼ ▼            │
///       │    │          ┌───────────┐      │
///       │    │          │ Completed │      │
///       │    │          └───────────┘      │
///       │    └──── cancel ──► Cancelled ◄──┘
///       └───────── reject ──► Rejected
/// ```
/// Completed, Cancelled and Rejected are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    /// Written by the doctor, waiting for the pharmacy.
    PendingPrepare,
    /// A pharmacist has started preparing it.
    Processing,
    /// Dispensed and paid (or awaiting e-wallet settlement).
    Completed,
    Cancelled,
    Rejected,
}

impl PrescriptionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::PendingPrepare => "pending_prepare",
            PrescriptionStatus::Processing => "processing",
            PrescriptionStatus::Completed => "completed",
            PrescriptionStatus::Cancelled => "cancelled",
            PrescriptionStatus::Rejected => "rejected",
        }
    }

    /// Terminal states accept no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            PrescriptionStatus::Completed
                | PrescriptionStatus::Cancelled
                | PrescriptionStatus::Rejected
        )
    }

    /// A prescription can be fulfilled only from these states.
    pub const fn is_dispensable(&self) -> bool {
        matches!(
            self,
            PrescriptionStatus::PendingPrepare | PrescriptionStatus::Processing
        )
    }

    /// Checks whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: PrescriptionStatus) -> bool {
        use PrescriptionStatus::*;

        match (self, next) {
            (PendingPrepare, Processing) => true,
            (PendingPrepare | Processing, Completed | Cancelled) => true,
            (PendingPrepare, Rejected) => true,
            // Once preparation has started, declining is a cancel.
            (Processing, Rejected) => false,
            _ => false,
        }
    }

    /// Like [`can_transition_to`](Self::can_transition_to) but returns a
    /// typed error naming the prescription.
    pub fn ensure_transition(
        &self,
        prescription_id: &str,
        next: PrescriptionStatus,
    ) -> CoreResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidStatusTransition {
                prescription_id: prescription_id.to_string(),
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Prescription
// =============================================================================

/// A prescription written during an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Appointment that produced this prescription.
    pub appointment_id: String,

    pub status: PrescriptionStatus,

    /// Free-text note from the doctor.
    pub note: Option<String>,

    /// False when the patient fills the prescription elsewhere.
    pub use_hospital_pharmacy: bool,

    /// Reason recorded on cancel/reject.
    pub status_reason: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One medicine line on a prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionLine {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub prescription_id: String,

    pub medicine_id: String,

    /// Units the doctor prescribed. Always positive.
    pub quantity_prescribed: i64,

    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

// =============================================================================
// Allocation
// =============================================================================

/// One draw of units from one batch for one prescription line.
///
/// Allocations are the permanent dispensing ledger: they are inserted in the
/// fulfillment commit and never updated or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub prescription_id: String,

    pub prescription_line_id: String,

    pub batch_id: String,

    /// Denormalized from the batch for reporting.
    pub medicine_id: String,

    /// Units drawn. Always positive.
    pub quantity_allocated: i64,

    /// Medicine unit price at the moment of dispensing.
    pub unit_price_cents: i64,

    #[ts(as = "String")]
    pub allocated_at: DateTime<Utc>,
}

impl Allocation {
    /// Price of this draw (unit price x quantity).
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity_allocated)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// How the patient pays for dispensed medicine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Paid at the counter. Settled immediately.
    Cash,
    /// Paid through the e-wallet provider. Settled asynchronously.
    EWallet,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::EWallet => "e_wallet",
        }
    }

    /// Status a fresh payment starts in for this method.
    pub const fn initial_status(&self) -> PaymentStatus {
        match self {
            PaymentMethod::Cash => PaymentStatus::Paid,
            PaymentMethod::EWallet => PaymentStatus::Pending,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "e_wallet" => Ok(PaymentMethod::EWallet),
            _ => Err(ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                allowed: vec!["cash".into(), "e_wallet".into()],
            }),
        }
    }
}

/// Settlement state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

/// The single payment recorded for a fulfilled prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub prescription_id: String,

    /// Sum of unit price x quantity over every allocation.
    pub amount_cents: i64,

    pub method: PaymentMethod,

    pub status: PaymentStatus,

    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
