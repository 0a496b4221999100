//! Dispatch routes: `/v1/work-orders/{work_order_id}/dispatch`

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use authority_core::CoreDispatchResult;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{work_order_id}/dispatch", post(dispatch))
}

/// An optional embedded attestation, applied as part of the dispatcher's own
/// quorum composition step before checking whether the envelope has sealed.
/// Tolerates an empty body — dispatch is legal to attempt without attesting
/// inline, e.g. to poll a HIGH-risk work order that another caller already
/// attested via `/v1/work-orders/{id}/attest`.
#[derive(Debug, Default, Deserialize)]
pub struct DispatchRequest {
    pub operator_id: Option<String>,
    pub rationale: Option<String>,
}

async fn dispatch(State(state): State<Arc<AppState>>, Path(work_order_id): Path<uuid::Uuid>, body: Bytes) -> Response {
    let request = if body.is_empty() {
        DispatchRequest::default()
    } else {
        match serde_json::from_slice::<DispatchRequest>(&body) {
            Ok(request) => request,
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": "bad_request", "message": err.to_string()})),
                )
                    .into_response();
            }
        }
    };

    let action_id = authority_core::WorkOrderId::from(work_order_id);
    let result = state
        .core
        .dispatch(&action_id, request.operator_id, request.rationale)
        .await;

    if let (CoreDispatchResult::Done(_), Some(backend)) = (&result, &state.storage) {
        if let Some(entry) = state.core.log().export().last() {
            if let Err(err) = state.core.log().mirror(entry, backend.as_ref()).await {
                tracing::warn!(%err, "failed to mirror forensic entry to durable storage");
            }
        }
    }

    match &result {
        CoreDispatchResult::PendingAttestation => (StatusCode::ACCEPTED, Json(result)).into_response(),
        CoreDispatchResult::Done(_) => (StatusCode::OK, Json(result)).into_response(),
    }
}
