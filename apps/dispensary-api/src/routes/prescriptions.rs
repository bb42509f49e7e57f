//! Prescription handlers: preview, fulfill, and the status transitions
//! that carry no inventory effect.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use dispensary_core::dispense::{FulfillmentReceipt, FulfillmentRequest, PrescriptionPreview};
use dispensary_core::{Allocation, Payment, Prescription, PrescriptionStatus};

use crate::error::ApiError;
use crate::AppState;

/// Body of cancel and reject.
#[derive(Debug, Clone, Deserialize)]
pub struct ReasonBody {
    pub reason: String,
}

/// Audit view of what a prescription dispensed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationsResponse {
    pub prescription_id: String,
    pub allocations: Vec<Allocation>,
    pub payment: Option<Payment>,
}

/// Largest page the worklist returns.
pub const MAX_WORKLIST: i64 = 200;

/// Query of the pharmacy worklist.
#[derive(Debug, Clone, Deserialize)]
pub struct WorklistQuery {
    #[serde(default = "default_worklist_status")]
    pub status: PrescriptionStatus,

    #[serde(default = "default_worklist_limit")]
    pub limit: i64,
}

fn default_worklist_status() -> PrescriptionStatus {
    PrescriptionStatus::PendingPrepare
}

fn default_worklist_limit() -> i64 {
    50
}

/// `GET /prescriptions?status=pending_prepare&limit=50`, oldest first.
pub async fn worklist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WorklistQuery>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let limit = query.limit.clamp(1, MAX_WORKLIST);
    let prescriptions = state
        .db
        .prescriptions()
        .list_by_status(query.status, limit)
        .await?;
    Ok(Json(prescriptions))
}

/// `GET /prescriptions/{id}/preview`
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PrescriptionPreview>, ApiError> {
    let preview = state.db.fulfillment().preview(&id, state.today()).await?;
    Ok(Json(preview))
}

/// `POST /prescriptions/{id}/fulfill`
pub async fn fulfill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<FulfillmentRequest>,
) -> Result<Json<FulfillmentReceipt>, ApiError> {
    info!(
        prescription_id = %id,
        lines = request.lines.len(),
        method = %request.payment_method,
        "Fulfillment requested"
    );

    let receipt = state
        .db
        .fulfillment()
        .fulfill(&id, &request, state.today())
        .await?;
    Ok(Json(receipt))
}

/// `PATCH /prescriptions/{id}/process`
pub async fn start_processing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Prescription>, ApiError> {
    let prescription = state.db.prescriptions().start_processing(&id).await?;
    Ok(Json(prescription))
}

/// `PATCH /prescriptions/{id}/cancel`
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<Prescription>, ApiError> {
    let prescription = state.db.prescriptions().cancel(&id, &body.reason).await?;
    Ok(Json(prescription))
}

/// `PATCH /prescriptions/{id}/reject`
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<Prescription>, ApiError> {
    let prescription = state.db.prescriptions().reject(&id, &body.reason).await?;
    Ok(Json(prescription))
}

/// `GET /prescriptions/{id}/allocations`
pub async fn allocations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AllocationsResponse>, ApiError> {
    if state.db.prescriptions().get_by_id(&id).await?.is_none() {
        return Err(ApiError::not_found("Prescription", &id));
    }

    let record = state.db.fulfillment().dispense_record(&id).await?;
    Ok(Json(AllocationsResponse {
        prescription_id: id,
        allocations: record.allocations,
        payment: record.payment,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use axum::http::StatusCode;
    use chrono::{Days, Utc};
    use dispensary_core::{
        Batch, Medicine, PaymentMethod, PaymentStatus, PrescriptionLine, PrescriptionStatus,
    };
    use dispensary_db::{Database, DbConfig};

    struct Fixture {
        state: Arc<AppState>,
        prescription_id: String,
        line_id: String,
        soon: Batch,
        later: Batch,
    }

    /// One medicine with two lots (20 expiring soon, 50 later) and a
    /// prescription for 30.
    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let today = Utc::now().date_naive();
        let now = Utc::now();

        let medicine = Medicine {
            id: "med-para".into(),
            name: "Paracetamol 500mg".into(),
            unit: "tablet".into(),
            unit_price_cents: 150,
            supplier: None,
            created_at: now,
        };
        db.medicines().insert(&medicine).await.unwrap();

        let import = today - Days::new(90);
        let soon = Batch::new("lot-a", "med-para", "LOT-A", 20, import, today + Days::new(30));
        let later = Batch::new("lot-b", "med-para", "LOT-B", 50, import, today + Days::new(200));
        db.batches().insert(&soon).await.unwrap();
        db.batches().insert(&later).await.unwrap();

        let prescription = Prescription {
            id: "rx-1".into(),
            appointment_id: "appt-1".into(),
            status: PrescriptionStatus::PendingPrepare,
            note: None,
            use_hospital_pharmacy: true,
            status_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let line = PrescriptionLine {
            id: "line-1".into(),
            prescription_id: "rx-1".into(),
            medicine_id: "med-para".into(),
            quantity_prescribed: 30,
            dosage: None,
            frequency: None,
            duration: None,
            instructions: None,
        };
        db.prescriptions().insert(&prescription, &[line]).await.unwrap();

        Fixture {
            state: Arc::new(AppState { db }),
            prescription_id: "rx-1".into(),
            line_id: "line-1".into(),
            soon,
            later,
        }
    }

    #[tokio::test]
    async fn test_preview_then_fulfill() {
        let fx = fixture().await;

        let Json(preview) = preview(State(fx.state.clone()), Path(fx.prescription_id.clone()))
            .await
            .unwrap();
        assert!(preview.can_fulfill_all);
        let plan: Vec<(&str, i64)> = preview.lines[0]
            .plan
            .iter()
            .map(|p| (p.batch_id.as_str(), p.quantity))
            .collect();
        assert_eq!(plan, vec![(fx.soon.id.as_str(), 20), (fx.later.id.as_str(), 10)]);

        let request = preview.to_request(PaymentMethod::Cash);
        let Json(receipt) = fulfill(
            State(fx.state.clone()),
            Path(fx.prescription_id.clone()),
            Json(request),
        )
        .await
        .unwrap();
        assert_eq!(receipt.prescription_status, PrescriptionStatus::Completed);
        assert_eq!(receipt.payment.amount_cents, 4500);
        assert_eq!(receipt.payment.status, PaymentStatus::Paid);

        let Json(audit) = allocations(State(fx.state.clone()), Path(fx.prescription_id.clone()))
            .await
            .unwrap();
        assert_eq!(audit.allocations.len(), 2);
        assert!(audit.payment.is_some());
    }

    #[tokio::test]
    async fn test_fulfill_body_is_camel_case() {
        let fx = fixture().await;
        let body = serde_json::json!({
            "lines": [{ "lineId": fx.line_id, "draws": [{ "batchId": fx.later.id, "quantity": 5 }] }],
            "paymentMethod": "e_wallet",
            "confirmPartial": true
        });
        let request: FulfillmentRequest = serde_json::from_value(body).unwrap();

        let Json(receipt) = fulfill(State(fx.state.clone()), Path(fx.prescription_id), Json(request))
            .await
            .unwrap();
        assert_eq!(receipt.payment.status, PaymentStatus::Pending);
        assert_eq!(receipt.allocations[0].quantity_allocated, 5);
    }

    #[tokio::test]
    async fn test_partial_without_confirmation_is_422() {
        let fx = fixture().await;
        let request = FulfillmentRequest {
            lines: vec![dispensary_core::dispense::LineDraws {
                line_id: fx.line_id.clone(),
                draws: vec![dispensary_core::dispense::BatchDraw {
                    batch_id: fx.soon.id.clone(),
                    quantity: 10,
                }],
            }],
            payment_method: PaymentMethod::Cash,
            confirm_partial: false,
        };

        let err = fulfill(State(fx.state.clone()), Path(fx.prescription_id), Json(request))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PartialNotConfirmed);
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_cancel_then_fulfill_conflicts() {
        let fx = fixture().await;

        let Json(cancelled) = cancel(
            State(fx.state.clone()),
            Path(fx.prescription_id.clone()),
            Json(ReasonBody {
                reason: "Patient declined".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(cancelled.status, PrescriptionStatus::Cancelled);
        assert_eq!(cancelled.status_reason.as_deref(), Some("Patient declined"));

        let Json(preview_after) =
            preview(State(fx.state.clone()), Path(fx.prescription_id.clone()))
                .await
                .unwrap();
        let request = preview_after.to_request(PaymentMethod::Cash);
        let err = fulfill(State(fx.state.clone()), Path(fx.prescription_id), Json(request))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let fx = fixture().await;

        let err = reject(
            State(fx.state.clone()),
            Path(fx.prescription_id.clone()),
            Json(ReasonBody { reason: "  ".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let Json(processing) =
            start_processing(State(fx.state.clone()), Path(fx.prescription_id.clone()))
                .await
                .unwrap();
        assert_eq!(processing.status, PrescriptionStatus::Processing);

        // Rejection is only possible before preparation starts.
        let err = reject(
            State(fx.state.clone()),
            Path(fx.prescription_id),
            Json(ReasonBody {
                reason: "Interaction with current medication".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);
    }

    #[tokio::test]
    async fn test_worklist_follows_status() {
        let fx = fixture().await;
        let pending = || {
            Query(WorklistQuery {
                status: PrescriptionStatus::PendingPrepare,
                limit: 0,
            })
        };

        let Json(list) = worklist(State(fx.state.clone()), pending()).await.unwrap();
        let ids: Vec<&str> = list.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![fx.prescription_id.as_str()]);

        start_processing(State(fx.state.clone()), Path(fx.prescription_id.clone()))
            .await
            .unwrap();
        let Json(list) = worklist(State(fx.state.clone()), pending()).await.unwrap();
        assert!(list.is_empty());

        let query: WorklistQuery = serde_json::from_value(serde_json::json!({
            "status": "processing"
        }))
        .unwrap();
        assert_eq!(query.limit, 50);
        let Json(list) = worklist(State(fx.state), Query(query)).await.unwrap();
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_prescription_is_404() {
        let fx = fixture().await;

        let err = preview(State(fx.state.clone()), Path("ghost".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = allocations(State(fx.state), Path("ghost".into()))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
