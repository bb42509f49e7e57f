//! # Dispensary API
//!
//! HTTP surface for the hospital pharmacy.
//!
//! ## Routes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET   /health                               liveness + database ping   │
//! │                                                                         │
//! │  GET   /medicines/{id}/availability          ?quantity=N&requireFull    │
//! │  GET   /prescriptions                        ?status=..&limit=..        │
//! │  GET   /prescriptions/{id}/preview           availability + FIFO plan   │
//! │  POST  /prescriptions/{id}/fulfill           atomic commit              │
//! │  PATCH /prescriptions/{id}/process           pending → processing       │
//! │  PATCH /prescriptions/{id}/cancel            { reason }                 │
//! │  PATCH /prescriptions/{id}/reject            { reason }                 │
//! │  GET   /prescriptions/{id}/allocations       audit read                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config`]. Environment variables:
//! - `DISPENSARY_CONFIG` - Path to dispensary.toml
//! - `DISPENSARY_DB_PATH` - SQLite file
//! - `DISPENSARY_PORT` / `DISPENSARY_BIND_ADDR` - Listener
//! - `DISPENSARY_MAX_ATTEMPTS` - Commit attempts under lock contention
//! - `RUST_LOG` - Log filter (default `info,dispensary=debug,sqlx=warn`)

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use chrono::{NaiveDate, Utc};

use dispensary_db::Database;

// Re-exports
pub use config::{ConfigError, DispensaryConfig};
pub use error::{ApiError, ErrorCode};

/// Shared application state.
pub struct AppState {
    pub db: Database,
}

impl AppState {
    /// The calendar day expiry is judged against.
    pub fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/medicines/{id}/availability",
            get(routes::medicines::availability),
        )
        .route("/prescriptions", get(routes::prescriptions::worklist))
        .route(
            "/prescriptions/{id}/preview",
            get(routes::prescriptions::preview),
        )
        .route(
            "/prescriptions/{id}/fulfill",
            post(routes::prescriptions::fulfill),
        )
        .route(
            "/prescriptions/{id}/process",
            patch(routes::prescriptions::start_processing),
        )
        .route(
            "/prescriptions/{id}/cancel",
            patch(routes::prescriptions::cancel),
        )
        .route(
            "/prescriptions/{id}/reject",
            patch(routes::prescriptions::reject),
        )
        .route(
            "/prescriptions/{id}/allocations",
            get(routes::prescriptions::allocations),
        )
        .with_state(state)
}
