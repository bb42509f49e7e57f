//! # Repository Module
//!
//! Database repository implementations for the dispensary.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  HTTP handler                                                          │
//! │       │                                                                 │
//! │       │  db.fulfillment().fulfill(id, &request, today)                 │
//! │       ▼                                                                 │
//! │  FulfillmentRepository ──► batches.quantity_remaining (decrement)      │
//! │                        ──► allocations, payments (insert)              │
//! │                        ──► prescriptions.status = completed            │
//! │                                                                         │
//! │  PrescriptionRepository ──► processing / cancelled / rejected          │
//! │  BatchRepository        ──► intake, administrative status              │
//! │  MedicineRepository     ──► formulary                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`MedicineRepository`](medicine::MedicineRepository) - Formulary
//! - [`BatchRepository`](batch::BatchRepository) - Batch ledger reads and intake
//! - [`PrescriptionRepository`](prescription::PrescriptionRepository) - Prescriptions and non-dispensing transitions
//! - [`FulfillmentRepository`](fulfillment::FulfillmentRepository) - Preview and atomic commit

pub mod batch;
pub mod fulfillment;
pub mod medicine;
pub mod prescription;
