//! # Fulfillment Repository
//!
//! Preview and commit for dispensing a prescription.
//!
//! ## Commit Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  fulfill(request)                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  pre-check on a snapshot ──► InvalidAllocation / PartialNotConfirmed    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────────── BEGIN ────────────────────────────────────────┐  │
//! │  │ 1. UPDATE prescriptions … WHERE status IN (pending, processing)  │  │
//! │  │    (first write: takes the database write lock)                  │  │
//! │  │ 2. fresh read of the referenced batches                          │  │
//! │  │ 3. validate again ──► ConcurrentModification / BatchNotEligible  │  │
//! │  │ 4. UPDATE batches SET remaining = remaining - n                  │  │
//! │  │       WHERE remaining >= n AND active AND not past expiry        │  │
//! │  │ 5. INSERT allocations (unit price stamped)                       │  │
//! │  │ 6. INSERT payment (sum of price x quantity)                      │  │
//! │  │ 7. UPDATE prescriptions SET status = completed                   │  │
//! │  └──────────────────── COMMIT ───────────────────────────────────────┘  │
//! │       │                                                                 │
//! │       ├── any error ──► transaction dropped ──► ROLLBACK, nothing kept  │
//! │       └── lock busy ──► backoff, retry up to max_attempts               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A plan that disagrees with the fresh read is not retried: stock only ever
//! goes down, so the same plan would fail again. The caller re-previews.

use std::collections::BTreeMap;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult, FulfillmentError};
use crate::repository::batch::{fetch_by_ids, BatchRepository};
use crate::repository::medicine::fetch_many;
use crate::repository::prescription::{fetch_lines, fetch_prescription};
use dispensary_core::dispense::{
    build_preview, payment_total, FulfillmentReceipt, FulfillmentRequest, PrescriptionPreview,
};
use dispensary_core::line_validator::{validate_request, CheckContext, ValidatedRequest};
use dispensary_core::{Allocation, CoreError, Payment, PaymentStatus, PrescriptionStatus};

// =============================================================================
// Retry Policy
// =============================================================================

/// How often, and how patiently, a commit is retried when the database
/// write lock is held by another commit.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Wait before the second attempt.
    pub initial_backoff: Duration,

    /// Upper bound on any single wait.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // bounded by max_attempts instead
            ..Default::default()
        }
    }
}

// =============================================================================
// Dispense Record
// =============================================================================

/// What was dispensed for a prescription: the allocation rows and the
/// payment, if the prescription has been fulfilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispenseRecord {
    pub allocations: Vec<Allocation>,
    pub payment: Option<Payment>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the preview and the atomic fulfillment commit.
#[derive(Debug, Clone)]
pub struct FulfillmentRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl FulfillmentRepository {
    /// Creates a new FulfillmentRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        FulfillmentRepository { pool, retry }
    }

    /// Per-line availability and suggested FIFO plan.
    ///
    /// Read-only: calling it any number of times changes nothing.
    pub async fn preview(
        &self,
        prescription_id: &str,
        today: NaiveDate,
    ) -> Result<PrescriptionPreview, FulfillmentError> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        let prescription = fetch_prescription(&mut conn, prescription_id)
            .await?
            .ok_or_else(|| CoreError::PrescriptionNotFound(prescription_id.to_string()))?;
        let lines = fetch_lines(&mut conn, prescription_id).await?;

        let mut medicine_ids: Vec<String> = lines.iter().map(|l| l.medicine_id.clone()).collect();
        medicine_ids.sort();
        medicine_ids.dedup();

        let medicines = fetch_many(&mut conn, &medicine_ids).await?;
        drop(conn);

        let batches = BatchRepository::new(self.pool.clone())
            .list_for_medicines(&medicine_ids)
            .await?;

        debug!(
            prescription_id = %prescription_id,
            lines = lines.len(),
            batches = batches.len(),
            "Building preview"
        );

        Ok(build_preview(&prescription, &lines, &medicines, &batches, today)?)
    }

    /// Commits a fulfillment request as one transaction.
    ///
    /// On success the batches are decremented, one allocation per draw is
    /// recorded, the payment exists and the prescription is completed. On
    /// any error none of that happened.
    ///
    /// Only a locked database is retried. A `ConcurrentModification` from
    /// the fresh read goes straight back to the caller, since stock only
    /// decreases and the same draws would fail again; the caller previews
    /// anew.
    pub async fn fulfill(
        &self,
        prescription_id: &str,
        request: &FulfillmentRequest,
        today: NaiveDate,
    ) -> Result<FulfillmentReceipt, FulfillmentError> {
        self.pre_check(prescription_id, request, today).await?;

        let mut backoff = self.retry.create_backoff();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.commit_once(prescription_id, request, today).await {
                Ok(receipt) => {
                    info!(
                        prescription_id = %prescription_id,
                        allocations = receipt.allocations.len(),
                        amount = %receipt.payment.amount(),
                        method = %receipt.payment.method,
                        attempt,
                        "Prescription fulfilled"
                    );
                    return Ok(receipt);
                }
                Err(FulfillmentError::TransactionAborted(e)) if e.is_busy() => {
                    if attempt >= self.retry.max_attempts {
                        warn!(
                            prescription_id = %prescription_id,
                            attempts = attempt,
                            error = %e,
                            "Giving up on fulfillment, database stayed locked"
                        );
                        return Err(CoreError::ConcurrentModification {
                            reason: format!("database busy after {attempt} attempts"),
                        }
                        .into());
                    }

                    let wait = backoff.next_backoff().unwrap_or(self.retry.max_backoff);
                    warn!(
                        prescription_id = %prescription_id,
                        attempt,
                        ?wait,
                        error = %e,
                        "Fulfillment hit a locked database, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    debug!(prescription_id = %prescription_id, error = %e, "Fulfillment rejected");
                    return Err(e);
                }
            }
        }
    }

    /// Allocations and payment recorded for a prescription.
    pub async fn dispense_record(&self, prescription_id: &str) -> DbResult<DispenseRecord> {
        let allocations = sqlx::query_as::<_, Allocation>(
            r#"
            SELECT id, prescription_id, prescription_line_id, batch_id, medicine_id,
                   quantity_allocated, unit_price_cents, allocated_at
            FROM allocations
            WHERE prescription_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(prescription_id)
        .fetch_all(&self.pool)
        .await?;

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, prescription_id, amount_cents, method, status, paid_at, created_at
            FROM payments
            WHERE prescription_id = ?1
            "#,
        )
        .bind(prescription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(DispenseRecord {
            allocations,
            payment,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Validation against a snapshot, outside any transaction. Catches bad
    /// requests without taking the write lock.
    async fn pre_check(
        &self,
        prescription_id: &str,
        request: &FulfillmentRequest,
        today: NaiveDate,
    ) -> Result<ValidatedRequest, FulfillmentError> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        let prescription = fetch_prescription(&mut conn, prescription_id)
            .await?
            .ok_or_else(|| CoreError::PrescriptionNotFound(prescription_id.to_string()))?;
        let lines = fetch_lines(&mut conn, prescription_id).await?;
        let snapshot = fetch_by_ids(&mut conn, &request.batch_ids()).await?;

        Ok(validate_request(
            &prescription,
            &lines,
            request,
            &snapshot,
            today,
            CheckContext::PreCommit,
        )?)
    }

    async fn commit_once(
        &self,
        prescription_id: &str,
        request: &FulfillmentRequest,
        today: NaiveDate,
    ) -> Result<FulfillmentReceipt, FulfillmentError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let now = Utc::now();

        // 1. Claim the prescription. Being a write, this is also where a
        //    concurrent commit blocks until the other transaction finishes.
        let claimed = sqlx::query(
            "UPDATE prescriptions SET updated_at = ?2 \
             WHERE id = ?1 AND status IN ('pending_prepare', 'processing')",
        )
        .bind(prescription_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        if claimed.rows_affected() == 0 {
            return Err(unclaimable(&mut tx, prescription_id).await?.into());
        }

        // 2. Fresh reads under the lock.
        let prescription = fetch_prescription(&mut tx, prescription_id)
            .await?
            .ok_or_else(|| CoreError::PrescriptionNotFound(prescription_id.to_string()))?;
        let lines = fetch_lines(&mut tx, prescription_id).await?;
        let live = fetch_by_ids(&mut tx, &request.batch_ids()).await?;

        // 3. Re-validate.
        let validated = validate_request(
            &prescription,
            &lines,
            request,
            &live,
            today,
            CheckContext::InTransaction,
        )?;

        // 4. Decrement, one statement per batch, in id order.
        let per_batch: BTreeMap<&str, i64> = validated.per_batch().into_iter().collect();
        for (batch_id, quantity) in per_batch {
            let result = sqlx::query(
                r#"
                UPDATE batches
                SET quantity_remaining = quantity_remaining - ?2, updated_at = ?4
                WHERE id = ?1
                  AND quantity_remaining >= ?2
                  AND status = 'active'
                  AND expiry_date >= ?3
                "#,
            )
            .bind(batch_id)
            .bind(quantity)
            .bind(today)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

            if result.rows_affected() == 0 {
                return Err(CoreError::ConcurrentModification {
                    reason: format!("batch {batch_id} changed before {quantity} units could be taken"),
                }
                .into());
            }

            debug!(batch_id = %batch_id, quantity, "Batch decremented");
        }

        // 5. Allocations at the current unit price.
        let mut medicine_ids: Vec<String> =
            validated.draws.iter().map(|d| d.medicine_id.clone()).collect();
        medicine_ids.sort();
        medicine_ids.dedup();
        let medicines = fetch_many(&mut tx, &medicine_ids).await?;

        let mut allocations = Vec::with_capacity(validated.draws.len());
        for draw in &validated.draws {
            let medicine = medicines
                .get(&draw.medicine_id)
                .ok_or_else(|| CoreError::MedicineNotFound(draw.medicine_id.clone()))?;

            let allocation = Allocation {
                id: Uuid::new_v4().to_string(),
                prescription_id: prescription_id.to_string(),
                prescription_line_id: draw.line_id.clone(),
                batch_id: draw.batch_id.clone(),
                medicine_id: draw.medicine_id.clone(),
                quantity_allocated: draw.quantity,
                unit_price_cents: medicine.unit_price_cents,
                allocated_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO allocations (
                    id, prescription_id, prescription_line_id, batch_id, medicine_id,
                    quantity_allocated, unit_price_cents, allocated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&allocation.id)
            .bind(&allocation.prescription_id)
            .bind(&allocation.prescription_line_id)
            .bind(&allocation.batch_id)
            .bind(&allocation.medicine_id)
            .bind(allocation.quantity_allocated)
            .bind(allocation.unit_price_cents)
            .bind(allocation.allocated_at)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

            allocations.push(allocation);
        }

        // 6. Payment.
        let amount = payment_total(&allocations)?;
        let status = request.payment_method.initial_status();
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            prescription_id: prescription_id.to_string(),
            amount_cents: amount.cents(),
            method: request.payment_method,
            status,
            paid_at: (status == PaymentStatus::Paid).then_some(now),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, prescription_id, amount_cents, method, status, paid_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.prescription_id)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(payment.status)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        // 7. Complete.
        let completed = sqlx::query(
            "UPDATE prescriptions SET status = 'completed', completed_at = ?2, updated_at = ?2 \
             WHERE id = ?1 AND status IN ('pending_prepare', 'processing')",
        )
        .bind(prescription_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        if completed.rows_affected() == 0 {
            return Err(CoreError::ConcurrentModification {
                reason: format!("prescription {prescription_id} changed during fulfillment"),
            }
            .into());
        }

        tx.commit().await.map_err(DbError::from)?;

        Ok(FulfillmentReceipt {
            prescription_id: prescription_id.to_string(),
            allocations,
            payment,
            prescription_status: PrescriptionStatus::Completed,
        })
    }
}

/// Why the claim UPDATE matched nothing: missing, or not dispensable.
async fn unclaimable(conn: &mut SqliteConnection, prescription_id: &str) -> DbResult<CoreError> {
    Ok(match fetch_prescription(conn, prescription_id).await? {
        None => CoreError::PrescriptionNotFound(prescription_id.to_string()),
        Some(p) => CoreError::InvalidStatusTransition {
            prescription_id: prescription_id.to_string(),
            from: p.status,
            to: PrescriptionStatus::Completed,
        },
    })
}

// =============================================================================
// Tests
// =============================================================================
