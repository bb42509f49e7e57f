//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                       Busy → retried by the transactor         │
//! │       ▼                                                                 │
//! │  FulfillmentError ← Rejected(CoreError) | TransactionAborted(DbError)  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError (in HTTP app) ← Serialized for the pharmacist UI             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use dispensary_core::CoreError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate batch number for the same medicine
    /// - Second payment for one prescription
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint or trigger refused the write.
    ///
    /// ## When This Occurs
    /// - quantity_remaining would go negative
    /// - UPDATE/DELETE against the append-only allocations table
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Another writer held the database lock past `busy_timeout`.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Lock contention that a fresh attempt may get past.
    pub fn is_busy(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }
}

/// SQLite primary/extended result codes for SQLITE_BUSY and SQLITE_LOCKED.
const BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → code / message decides:
///                                 busy, locked   → Busy
///                                 UNIQUE         → UniqueViolation
///                                 FOREIGN KEY    → ForeignKeyViolation
///                                 CHECK, trigger → ConstraintViolation
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();

                if code.as_deref().is_some_and(|c| BUSY_CODES.contains(&c))
                    || msg.contains("database is locked")
                    || msg.contains("database table is locked")
                {
                    DbError::Busy(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed")
                    || msg.contains("append-only")
                    || msg.contains("has allocations")
                {
                    DbError::ConstraintViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Fulfillment Error
// =============================================================================

/// Outcome of a failed fulfillment.
///
/// Either the request broke a business rule (nothing was written), or storage
/// failed mid-commit (everything was rolled back).
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error(transparent)]
    Rejected(#[from] CoreError),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(#[from] DbError),
}

impl FulfillmentError {
    /// Whether the caller may re-preview and try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            FulfillmentError::Rejected(e) => e.is_retryable(),
            FulfillmentError::TransactionAborted(_) => true,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
