//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  dispensary-api startup                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(path) ← Configure pool settings + lock timeout          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ One task per HTTP request                                       │
//! │       ▼                                                                 │
//! │  preview   ──► any connection, reads run in parallel                    │
//! │  fulfill A ──► takes the write lock                                     │
//! │  fulfill B ──► waits up to busy_timeout, then DbError::Busy             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled so previews keep reading
//! while a fulfillment commit holds the single write lock.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::batch::BatchRepository;
use crate::repository::fulfillment::{FulfillmentRepository, RetryPolicy};
use crate::repository::medicine::MedicineRepository;
use crate::repository::prescription::PrescriptionRepository;

// =============================================================================
// Configuration
// =============================================================================

const IN_MEMORY_PATH: &str = ":memory:";

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/dispensary/dispensary.db")
///     .max_connections(5)
///     .lock_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// How long a statement waits for another writer's lock (busy_timeout).
    /// Default: 5 seconds
    pub lock_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let config = DbConfig::new("./data/dispensary.db");
    /// ```
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            lock_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets how long to wait on a locked database before failing.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let config = DbConfig::in_memory();
    /// let db = Database::new(config).await?;
    /// // Database is isolated, perfect for tests
    /// ```
    pub fn in_memory() -> Self {
        // Each connection to ":memory:" is its own database, hence one.
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            lock_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone: the pool is reference counted. The HTTP app keeps one in
/// its shared state and hands out repositories per request.
///
/// ## Usage in Handlers
/// ```rust,ignore
/// async fn preview(
///     State(state): State<Arc<AppState>>,
///     Path(id): Path<String>,
/// ) -> Result<Json<PrescriptionPreview>, ApiError> {
///     let preview = state.db.fulfillment().preview(&id, today()).await?;
///     Ok(Json(preview))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Retry schedule handed to every fulfillment repository.
    retry: RetryPolicy,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    ///    - busy_timeout from `lock_timeout`
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    ///
    /// ## Arguments
    /// * `config` - Database configuration
    ///
    /// ## Returns
    /// * `Ok(Database)` - Ready-to-use database handle
    /// * `Err(DbError)` - Connection or migration failed
    ///
    /// ## Example
    /// ```rust,ignore
    /// let config = DbConfig::new("./dispensary.db");
    /// let db = Database::new(config).await?;
    /// ```
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let in_memory = config.database_path.as_os_str() == IN_MEMORY_PATH;

        // sqlite://path?mode=rwc creates the file if it doesn't exist
        let connect_url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.database_path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            // Readers don't block the writer, the writer doesn't block readers
            .journal_mode(SqliteJournalMode::Wal)
            // Safe from corruption, may lose the last transaction on power loss
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            // Bounded wait for the write lock instead of failing immediately
            .busy_timeout(config.lock_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        // Build the pool
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            // Closing the only in-memory connection would drop the database
            .idle_timeout((!in_memory).then_some(config.idle_timeout))
            .max_lifetime((!in_memory).then_some(Duration::from_secs(1800)))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            lock_timeout_ms = config.lock_timeout.as_millis() as u64,
            "Database pool created"
        );

        let db = Database {
            pool,
            retry: RetryPolicy::default(),
        };

        // Run migrations if enabled
        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    ///
    /// ## What This Does
    /// - Applies all pending migrations in order
    /// - Tracks applied migrations in `_sqlx_migrations` table
    /// - Idempotent: safe to run multiple times
    ///
    /// ## When To Call
    /// - Automatically called by `new()` if `run_migrations` is true
    /// - Manually call when migrations are disabled in config
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// ## Usage
    /// For advanced queries not covered by repositories.
    /// Prefer using repository methods when available.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replaces the retry schedule used by [`fulfillment`](Self::fulfillment).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the medicine repository.
    pub fn medicines(&self) -> MedicineRepository {
        MedicineRepository::new(self.pool.clone())
    }

    /// Returns the batch repository.
    pub fn batches(&self) -> BatchRepository {
        BatchRepository::new(self.pool.clone())
    }

    /// Returns the prescription repository.
    pub fn prescriptions(&self) -> PrescriptionRepository {
        PrescriptionRepository::new(self.pool.clone())
    }

    /// Returns the fulfillment repository (preview, commit, audit reads).
    ///
    /// ## Example
    /// ```rust,ignore
    /// let receipt = db.fulfillment().fulfill(&rx_id, &request, today).await?;
    /// ```
    pub fn fulfillment(&self) -> FulfillmentRepository {
        FulfillmentRepository::new(self.pool.clone(), self.retry.clone())
    }

    /// Closes the database connection pool.
    ///
    /// ## When To Call
    /// - On application shutdown
    /// - When switching databases (rare)
    ///
    /// ## Note
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    ///
    /// ## Returns
    /// * `true` - Database is responsive
    /// * `false` - Database is unavailable
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let config = DbConfig::in_memory();
        let db = Database::new(config).await.unwrap();

        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_in_memory_has_schema() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();

        for table in ["allocations", "batches", "medicines", "payments", "prescription_lines", "prescriptions"] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
    }

    #[tokio::test]
    async fn test_file_database_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispensary.db");

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        assert!(db.health_check().await);
        db.close().await;

        assert!(path.exists());
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .lock_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
    }
}
