//! # Prescription Repository
//!
//! Prescription reads and the status transitions that carry no inventory
//! effect.
//!
//! ## Status Transitions Handled Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  start_processing()   pending_prepare            → processing          │
//! │  cancel(reason)       pending_prepare|processing → cancelled           │
//! │  reject(reason)       pending_prepare            → rejected            │
//! │                                                                         │
//! │  → completed is NOT here: only the fulfillment commit may set it.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each transition is one guarded `UPDATE … WHERE status IN (…)`, so two
//! racing pharmacists cannot both move the same prescription.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult, FulfillmentError};
use dispensary_core::validation::{validate_quantity, validate_reason};
use dispensary_core::{CoreError, Prescription, PrescriptionLine, PrescriptionStatus};

const PRESCRIPTION_COLUMNS: &str = "id, appointment_id, status, note, \
     use_hospital_pharmacy, status_reason, created_at, updated_at, completed_at";

const LINE_COLUMNS: &str = "id, prescription_id, medicine_id, quantity_prescribed, \
     dosage, frequency, duration, instructions";

/// Repository for prescription database operations.
#[derive(Debug, Clone)]
pub struct PrescriptionRepository {
    pool: SqlitePool,
}

impl PrescriptionRepository {
    /// Creates a new PrescriptionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PrescriptionRepository { pool }
    }

    /// Inserts a prescription and its lines in one transaction.
    pub async fn insert(
        &self,
        prescription: &Prescription,
        lines: &[PrescriptionLine],
    ) -> Result<(), FulfillmentError> {
        for line in lines {
            validate_quantity("quantity_prescribed", line.quantity_prescribed)
                .map_err(CoreError::from)?;
            if line.prescription_id != prescription.id {
                return Err(CoreError::invalid_allocation(
                    &line.id,
                    "line belongs to a different prescription",
                )
                .into());
            }
        }

        debug!(
            prescription_id = %prescription.id,
            lines = lines.len(),
            "Inserting prescription"
        );

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        sqlx::query(
            r#"
            INSERT INTO prescriptions (
                id, appointment_id, status, note, use_hospital_pharmacy,
                status_reason, created_at, updated_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&prescription.id)
        .bind(&prescription.appointment_id)
        .bind(prescription.status)
        .bind(&prescription.note)
        .bind(prescription.use_hospital_pharmacy)
        .bind(&prescription.status_reason)
        .bind(prescription.created_at)
        .bind(prescription.updated_at)
        .bind(prescription.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO prescription_lines (
                    id, prescription_id, medicine_id, quantity_prescribed,
                    dosage, frequency, duration, instructions
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&line.id)
            .bind(&line.prescription_id)
            .bind(&line.medicine_id)
            .bind(line.quantity_prescribed)
            .bind(&line.dosage)
            .bind(&line.frequency)
            .bind(&line.duration)
            .bind(&line.instructions)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    /// Gets a prescription by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Prescription>> {
        let mut conn = self.pool.acquire().await?;
        fetch_prescription(&mut conn, id).await
    }

    /// Gets the lines of a prescription in insertion order.
    pub async fn get_lines(&self, prescription_id: &str) -> DbResult<Vec<PrescriptionLine>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lines(&mut conn, prescription_id).await
    }

    /// Lists prescriptions in a given status, oldest first.
    pub async fn list_by_status(
        &self,
        status: PrescriptionStatus,
        limit: i64,
    ) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions \
             WHERE status = ?1 ORDER BY created_at LIMIT ?2"
        );
        let prescriptions = sqlx::query_as::<_, Prescription>(&sql)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(prescriptions)
    }

    /// pending_prepare → processing.
    pub async fn start_processing(&self, id: &str) -> Result<Prescription, FulfillmentError> {
        self.transition(id, PrescriptionStatus::Processing, None).await
    }

    /// pending_prepare | processing → cancelled. No inventory effect.
    pub async fn cancel(&self, id: &str, reason: &str) -> Result<Prescription, FulfillmentError> {
        let reason = validate_reason(reason).map_err(CoreError::from)?;
        self.transition(id, PrescriptionStatus::Cancelled, Some(reason)).await
    }

    /// pending_prepare → rejected. No inventory effect.
    pub async fn reject(&self, id: &str, reason: &str) -> Result<Prescription, FulfillmentError> {
        let reason = validate_reason(reason).map_err(CoreError::from)?;
        self.transition(id, PrescriptionStatus::Rejected, Some(reason)).await
    }

    async fn transition(
        &self,
        id: &str,
        to: PrescriptionStatus,
        reason: Option<String>,
    ) -> Result<Prescription, FulfillmentError> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::PrescriptionNotFound(id.to_string()))?;
        current.status.ensure_transition(id, to)?;

        let from: Vec<PrescriptionStatus> = [
            PrescriptionStatus::PendingPrepare,
            PrescriptionStatus::Processing,
        ]
        .into_iter()
        .filter(|s| s.can_transition_to(to))
        .collect();

        // Re-checked in SQL: another request may have moved it since the read.
        let placeholders = (0..from.len())
            .map(|i| format!("?{}", i + 5))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE prescriptions SET status = ?2, status_reason = COALESCE(?3, status_reason), \
             updated_at = ?4 WHERE id = ?1 AND status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(id)
            .bind(to)
            .bind(&reason)
            .bind(Utc::now());
        for status in &from {
            query = query.bind(*status);
        }
        let result = query.execute(&self.pool).await.map_err(DbError::from)?;

        let updated = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::PrescriptionNotFound(id.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::InvalidStatusTransition {
                prescription_id: id.to_string(),
                from: updated.status,
                to,
            }
            .into());
        }

        info!(
            prescription_id = %id,
            from = %current.status,
            to = %to,
            reason = reason.as_deref().unwrap_or(""),
            "Prescription status changed"
        );

        Ok(updated)
    }

    /// Counts prescriptions.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prescriptions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

pub(crate) async fn fetch_prescription(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Prescription>> {
    let sql = format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1");
    let prescription = sqlx::query_as::<_, Prescription>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(prescription)
}

pub(crate) async fn fetch_lines(
    conn: &mut SqliteConnection,
    prescription_id: &str,
) -> DbResult<Vec<PrescriptionLine>> {
    let sql = format!(
        "SELECT {LINE_COLUMNS} FROM prescription_lines WHERE prescription_id = ?1 ORDER BY rowid"
    );
    let lines = sqlx::query_as::<_, PrescriptionLine>(&sql)
        .bind(prescription_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{line, medicine, prescription, test_db};

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = test_db().await;
        let para = medicine("Paracetamol 500mg", 150);
        db.medicines().insert(&para).await.unwrap();

        let rx = prescription();
        let lines = vec![line(&rx.id, &para.id, 30), line(&rx.id, &para.id, 10)];
        db.prescriptions().insert(&rx, &lines).await.unwrap();

        let loaded = db.prescriptions().get_by_id(&rx.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PrescriptionStatus::PendingPrepare);
        assert!(loaded.use_hospital_pharmacy);

        let loaded_lines = db.prescriptions().get_lines(&rx.id).await.unwrap();
        assert_eq!(loaded_lines, lines);

        let pending = db
            .prescriptions()
            .list_by_status(PrescriptionStatus::PendingPrepare, 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_is_atomic() {
        let db = test_db().await;
        let rx = prescription();
        // Unknown medicine → FK failure on the line rolls back the header too
        let lines = vec![line(&rx.id, "ghost", 1)];

        assert!(db.prescriptions().insert(&rx, &lines).await.is_err());
        assert_eq!(db.prescriptions().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_records_reason() {
        let db = test_db().await;
        let rx = prescription();
        db.prescriptions().insert(&rx, &[]).await.unwrap();

        db.prescriptions().start_processing(&rx.id).await.unwrap();
        let cancelled = db
            .prescriptions()
            .cancel(&rx.id, "  patient left  ")
            .await
            .unwrap();

        assert_eq!(cancelled.status, PrescriptionStatus::Cancelled);
        assert_eq!(cancelled.status_reason.as_deref(), Some("patient left"));
    }

    #[tokio::test]
    async fn test_reject_only_from_pending() {
        let db = test_db().await;
        let rx = prescription();
        db.prescriptions().insert(&rx, &[]).await.unwrap();
        db.prescriptions().start_processing(&rx.id).await.unwrap();

        let err = db.prescriptions().reject(&rx.id, "wrong dose").await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::Rejected(CoreError::InvalidStatusTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_reason_required() {
        let db = test_db().await;
        let rx = prescription();
        db.prescriptions().insert(&rx, &[]).await.unwrap();

        let err = db.prescriptions().reject(&rx.id, "   ").await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Rejected(CoreError::Validation(_))));

        let unchanged = db.prescriptions().get_by_id(&rx.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, PrescriptionStatus::PendingPrepare);
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let db = test_db().await;
        let rx = prescription();
        db.prescriptions().insert(&rx, &[]).await.unwrap();
        db.prescriptions().reject(&rx.id, "duplicate order").await.unwrap();

        for result in [
            db.prescriptions().cancel(&rx.id, "again").await,
            db.prescriptions().start_processing(&rx.id).await,
        ] {
            assert!(matches!(
                result,
                Err(FulfillmentError::Rejected(CoreError::InvalidStatusTransition { .. }))
            ));
        }
    }

    #[tokio::test]
    async fn test_unknown_prescription() {
        let db = test_db().await;
        let err = db.prescriptions().cancel("ghost", "reason").await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::Rejected(CoreError::PrescriptionNotFound(_))
        ));
    }
}
