//! # dispensary-db: Database Layer for the Hospital Pharmacy
//!
//! SQLite storage for medicines, batches, prescriptions and the dispensing
//! ledger, with sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Dispensary Data Flow                             │
//! │                                                                         │
//! │  HTTP route (POST /prescriptions/:id/fulfill)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  dispensary-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ MedicineRepo   │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ BatchRepo      │   │ 001_init.sql │  │   │
//! │  │   │ busy_timeout  │    │ PrescriptionRe │   │              │  │   │
//! │  │   │ RetryPolicy   │    │ FulfillmentRe  │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and fulfillment error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dispensary_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("dispensary.db")).await?;
//!
//! let preview = db.fulfillment().preview(&prescription_id, today).await?;
//! let request = preview.to_request(PaymentMethod::Cash);
//! let receipt = db.fulfillment().fulfill(&prescription_id, &request, today).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult, FulfillmentError};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::batch::BatchRepository;
pub use repository::fulfillment::{DispenseRecord, FulfillmentRepository, RetryPolicy};
pub use repository::medicine::MedicineRepository;
pub use repository::prescription::PrescriptionRepository;

// =============================================================================
// Test Fixtures
// =============================================================================
