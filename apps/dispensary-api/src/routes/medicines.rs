//! Stock lookup for one medicine, outside any prescription.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use dispensary_core::availability::{availability as compute_availability, AvailabilityReport};
use dispensary_core::CoreError;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub quantity: i64,

    /// Answer 422 instead of reporting a shortage.
    #[serde(default)]
    pub require_full: bool,
}

/// `GET /medicines/{id}/availability?quantity=N[&requireFull=true]`
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityReport>, ApiError> {
    if state.db.medicines().get_by_id(&id).await?.is_none() {
        return Err(CoreError::MedicineNotFound(id).into());
    }

    let today = state.today();
    let batches = state.db.batches().list_eligible(&id, today).await?;
    let report = compute_availability(&id, query.quantity, &batches, today)?;

    if query.require_full {
        report.ensure_sufficient()?;
    }
    Ok(Json(report))
}
