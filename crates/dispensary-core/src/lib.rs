//! # dispensary-core: Pure Fulfillment Logic for the Hospital Pharmacy
//!
//! This crate decides *what* a prescription fulfillment should do. It never
//! touches the database: the caller hands in batches, lines and "today", and
//! gets back plans, checks and typed errors.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Dispensary Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 dispensary-api (axum handlers)                  │   │
//! │  │        preview ──► fulfill ──► process / cancel / reject       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            ★ dispensary-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────────┐  ┌───────────┐  ┌────────────────┐           │   │
//! │  │  │ availability │─►│  planner  │  │ line_validator │           │   │
//! │  │  │ eligible +   │  │ greedy    │  │ re-check before│           │   │
//! │  │  │ FIFO order   │  │ draw-down │  │ and in commit  │           │   │
//! │  │  └──────────────┘  └───────────┘  └────────────────┘           │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • "TODAY" PASSED IN • PURE FUNCTIONS    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               dispensary-db (Fulfillment Transactor)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Medicine, Batch, Prescription, Allocation, Payment)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Field-level input validation
//! - [`availability`] - Availability Calculator (eligibility + FIFO-by-expiry)
//! - [`planner`] - Allocation Planner (greedy draw-down)
//! - [`line_validator`] - Prescription Line Validator
//! - [`dispense`] - Fulfillment request/receipt types and payment math
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use dispensary_core::availability::availability;
//! use dispensary_core::planner::plan;
//! use dispensary_core::types::Batch;
//!
//! let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
//! let batches = vec![
//!     Batch::new("b", "PARA-500", "LOT-B", 50, d(2024, 6, 1), d(2025, 6, 1)),
//!     Batch::new("a", "PARA-500", "LOT-A", 20, d(2024, 1, 1), d(2025, 1, 1)),
//! ];
//!
//! let report = availability("PARA-500", 30, &batches, d(2024, 12, 1)).unwrap();
//! let plan = plan(&report.batches, 30);
//!
//! assert_eq!(plan.draws[0].batch_id, "a");
//! assert_eq!(plan.draws[0].quantity, 20);
//! assert_eq!(plan.draws[1].quantity, 10);
//! assert_eq!(plan.unmet, 0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod dispense;
pub mod error;
pub mod line_validator;
pub mod money;
pub mod planner;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity on a single prescription line or batch draw.
///
/// ## Business Reason
/// Catches typos in the dispense screen (1000 instead of 10) before they
/// reach the ledger.
pub const MAX_LINE_QUANTITY: i64 = 10_000;

/// Maximum length of a cancel/reject reason.
pub const MAX_REASON_LENGTH: usize = 500;
