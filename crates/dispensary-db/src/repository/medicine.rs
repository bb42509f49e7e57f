//! # Medicine Repository
//!
//! Formulary reads plus the insert path used by seeding and tests.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use dispensary_core::validation::{validate_medicine_name, validate_price_cents};
use dispensary_core::{CoreError, Medicine};

const MEDICINE_COLUMNS: &str = "id, name, unit, unit_price_cents, supplier, created_at";

/// Repository for medicine database operations.
#[derive(Debug, Clone)]
pub struct MedicineRepository {
    pool: SqlitePool,
}

impl MedicineRepository {
    /// Creates a new MedicineRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MedicineRepository { pool }
    }

    /// Inserts a medicine after field validation.
    pub async fn insert(&self, medicine: &Medicine) -> Result<(), crate::FulfillmentError> {
        validate_medicine_name(&medicine.name).map_err(CoreError::from)?;
        validate_price_cents(medicine.unit_price_cents).map_err(CoreError::from)?;

        debug!(id = %medicine.id, name = %medicine.name, "Inserting medicine");

        sqlx::query(
            r#"
            INSERT INTO medicines (id, name, unit, unit_price_cents, supplier, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&medicine.id)
        .bind(&medicine.name)
        .bind(&medicine.unit)
        .bind(medicine.unit_price_cents)
        .bind(&medicine.supplier)
        .bind(medicine.created_at)
        .execute(&self.pool)
        .await
        .map_err(crate::DbError::from)?;

        Ok(())
    }

    /// Gets a medicine by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Medicine>> {
        let sql = format!("SELECT {MEDICINE_COLUMNS} FROM medicines WHERE id = ?1");
        let medicine = sqlx::query_as::<_, Medicine>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(medicine)
    }

    /// Loads several medicines keyed by id. Unknown ids are simply absent.
    pub async fn get_many(&self, ids: &[String]) -> DbResult<HashMap<String, Medicine>> {
        let mut conn = self.pool.acquire().await?;
        fetch_many(&mut conn, ids).await
    }

    /// Counts medicines in the formulary.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM medicines")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Medicines by id on an existing connection or transaction.
pub(crate) async fn fetch_many(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> DbResult<HashMap<String, Medicine>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {MEDICINE_COLUMNS} FROM medicines WHERE id IN ("));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let medicines: Vec<Medicine> = qb.build_query_as().fetch_all(&mut *conn).await?;

    Ok(medicines.into_iter().map(|m| (m.id.clone(), m)).collect())
}
