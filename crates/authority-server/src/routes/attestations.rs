//! Attestation routes: `/v1/work-orders/{work_order_id}/attest`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{work_order_id}/attest", post(register_attestation))
}

#[derive(Debug, Deserialize)]
pub struct AttestRequest {
    pub operator_id: String,
    pub rationale: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttestResponse {
    pub quorum_reached: bool,
}

async fn register_attestation(
    State(state): State<Arc<AppState>>,
    Path(work_order_id): Path<uuid::Uuid>,
    Json(body): Json<AttestRequest>,
) -> Result<Json<AttestResponse>, AppError> {
    let action_id = authority_core::WorkOrderId::from(work_order_id);
    let quorum_reached = state
        .core
        .register_attestation(&action_id, body.operator_id, body.rationale)?;

    Ok(Json(AttestResponse { quorum_reached }))
}
