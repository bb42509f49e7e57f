//! # Batch Repository
//!
//! Reads of the Batch Ledger, plus the intake and status paths that belong
//! to the stock-receipt and maintenance workflows.
//!
//! ```text
//!   intake ──► insert()           quantity_remaining set once
//!   maint. ──► set_status()       active → expired / disposed
//!   commit ──► (fulfillment.rs)   the ONLY decrement of quantity_remaining
//! ```

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult, FulfillmentError};
use dispensary_core::availability::eligible_batches;
use dispensary_core::validation::{
    validate_batch_dates, validate_batch_number, validate_stock_quantity,
};
use dispensary_core::{Batch, BatchStatus, CoreError};

const BATCH_COLUMNS: &str = "id, medicine_id, batch_number, quantity_remaining, \
     import_date, expiry_date, status, created_at, updated_at";

/// Repository for batch database operations.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    /// Creates a new BatchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    /// Records a received lot.
    ///
    /// A duplicate `(medicine_id, batch_number)` surfaces as
    /// `DbError::UniqueViolation`.
    pub async fn insert(&self, batch: &Batch) -> Result<(), FulfillmentError> {
        validate_batch_number(&batch.batch_number).map_err(CoreError::from)?;
        validate_stock_quantity(batch.quantity_remaining).map_err(CoreError::from)?;
        validate_batch_dates(batch.import_date, batch.expiry_date).map_err(CoreError::from)?;

        debug!(
            id = %batch.id,
            medicine_id = %batch.medicine_id,
            batch_number = %batch.batch_number,
            quantity = batch.quantity_remaining,
            "Inserting batch"
        );

        sqlx::query(
            r#"
            INSERT INTO batches (
                id, medicine_id, batch_number, quantity_remaining,
                import_date, expiry_date, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.medicine_id)
        .bind(&batch.batch_number)
        .bind(batch.quantity_remaining)
        .bind(batch.import_date)
        .bind(batch.expiry_date)
        .bind(batch.status)
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(())
    }

    /// Gets a batch by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Batch>> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?1");
        let batch = sqlx::query_as::<_, Batch>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(batch)
    }

    /// All batches of the given medicines, any status. Ordering is left to
    /// the availability calculator.
    pub async fn list_for_medicines(&self, medicine_ids: &[String]) -> DbResult<Vec<Batch>> {
        if medicine_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {BATCH_COLUMNS} FROM batches WHERE medicine_id IN ("));
        let mut separated = qb.separated(", ");
        for id in medicine_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let batches: Vec<Batch> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(batches)
    }

    /// Batches of one medicine that can be dispensed on `today`, in FIFO
    /// order. The SQL narrows by the eligibility index; the core decides.
    pub async fn list_eligible(&self, medicine_id: &str, today: NaiveDate) -> DbResult<Vec<Batch>> {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM batches \
             WHERE medicine_id = ?1 AND status = 'active' AND expiry_date >= ?2"
        );
        let candidates: Vec<Batch> = sqlx::query_as::<_, Batch>(&sql)
            .bind(medicine_id)
            .bind(today)
            .fetch_all(&self.pool)
            .await?;

        Ok(eligible_batches(medicine_id, &candidates, today)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Changes a batch's administrative status. Never touches quantity.
    pub async fn set_status(&self, id: &str, status: BatchStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE batches SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Batch", id));
        }

        info!(batch_id = %id, status = %status, "Batch status changed");
        Ok(())
    }

    /// Counts batches.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batches")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Batches by id on an existing connection or transaction.
///
/// Inside the commit transaction this is the fresh read the validator
/// re-runs against.
pub(crate) async fn fetch_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> DbResult<HashMap<String, Batch>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id IN ("));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let batches: Vec<Batch> = qb.build_query_as().fetch_all(&mut *conn).await?;

    Ok(batches.into_iter().map(|b| (b.id.clone(), b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{batch, d, medicine, test_db};

    #[tokio::test]
    async fn test_insert_and_list_eligible_in_fifo_order() {
        let db = test_db().await;
        let para = medicine("Paracetamol 500mg", 150);
        db.medicines().insert(&para).await.unwrap();

        let late = batch(&para.id, "LOT-B", 50, d(2024, 6, 1), d(2025, 6, 1));
        let early = batch(&para.id, "LOT-A", 20, d(2024, 1, 1), d(2025, 1, 1));
        let stale = batch(&para.id, "LOT-OLD", 9, d(2023, 1, 1), d(2024, 11, 1));
        for b in [&late, &early, &stale] {
            db.batches().insert(b).await.unwrap();
        }

        let eligible = db.batches().list_eligible(&para.id, d(2024, 12, 1)).await.unwrap();
        let numbers: Vec<&str> = eligible.iter().map(|b| b.batch_number.as_str()).collect();
        assert_eq!(numbers, vec!["LOT-A", "LOT-B"]);
    }

    #[tokio::test]
    async fn test_duplicate_batch_number_rejected() {
        let db = test_db().await;
        let para = medicine("Paracetamol 500mg", 150);
        db.medicines().insert(&para).await.unwrap();

        db.batches()
            .insert(&batch(&para.id, "LOT-A", 20, d(2024, 1, 1), d(2025, 1, 1)))
            .await
            .unwrap();
        let err = db
            .batches()
            .insert(&batch(&para.id, "LOT-A", 5, d(2024, 2, 1), d(2025, 2, 1)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FulfillmentError::TransactionAborted(DbError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_negative_quantity_rejected() {
        let db = test_db().await;
        let para = medicine("Paracetamol 500mg", 150);
        db.medicines().insert(&para).await.unwrap();

        let bad = batch(&para.id, "LOT-A", -1, d(2024, 1, 1), d(2025, 1, 1));
        assert!(matches!(
            db.batches().insert(&bad).await,
            Err(FulfillmentError::Rejected(CoreError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_storage_refuses_negative_quantity() {
        let db = test_db().await;
        let para = medicine("Paracetamol 500mg", 150);
        db.medicines().insert(&para).await.unwrap();
        let lot = batch(&para.id, "LOT-A", 3, d(2024, 1, 1), d(2025, 1, 1));
        db.batches().insert(&lot).await.unwrap();

        let err = sqlx::query("UPDATE batches SET quantity_remaining = -1 WHERE id = ?1")
            .bind(&lot.id)
            .execute(db.pool())
            .await
            .map_err(DbError::from)
            .unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    async fn test_set_status_removes_from_eligible() {
        let db = test_db().await;
        let para = medicine("Paracetamol 500mg", 150);
        db.medicines().insert(&para).await.unwrap();
        let lot = batch(&para.id, "LOT-A", 20, d(2024, 1, 1), d(2025, 1, 1));
        db.batches().insert(&lot).await.unwrap();

        db.batches().set_status(&lot.id, BatchStatus::Disposed).await.unwrap();

        let loaded = db.batches().get_by_id(&lot.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, BatchStatus::Disposed);
        assert_eq!(loaded.quantity_remaining, 20);
        assert!(db.batches().list_eligible(&para.id, d(2024, 12, 1)).await.unwrap().is_empty());

        assert!(matches!(
            db.batches().set_status("ghost", BatchStatus::Expired).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
