//! Lease routes: `/v1/leases`
//!
//! Issues and refreshes the short-lived quorum-gate bypasses a session
//! needs to dispatch repeated LOW-risk work without re-attesting every time
//! (`spec.md` §4.5).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use authority_core::{ExecutionDomain, Lease};

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_lease))
        .route("/{lease_id}", get(get_lease))
        .route("/{lease_id}/heartbeat", post(heartbeat_lease))
}

#[derive(Debug, Deserialize)]
pub struct CreateLeaseRequest {
    pub session_id: String,
    pub domain: String,
}

async fn create_lease(State(state): State<Arc<AppState>>, Json(body): Json<CreateLeaseRequest>) -> Json<Lease> {
    let lease = state.core.create_lease(body.session_id, &ExecutionDomain::new(body.domain));
    Json(lease)
}

async fn get_lease(State(state): State<Arc<AppState>>, Path(lease_id): Path<String>) -> Result<Json<Lease>, AppError> {
    state
        .core
        .leases()
        .find_by_id(&lease_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("lease not found: {lease_id}")))
}

#[derive(Debug, Serialize)]
struct HeartbeatResponse {
    refreshed: bool,
}

async fn heartbeat_lease(State(state): State<Arc<AppState>>, Path(lease_id): Path<String>) -> Response {
    let refreshed = state.core.heartbeat_lease(&lease_id);
    let status = if refreshed { StatusCode::OK } else { StatusCode::NOT_FOUND };
    (status, Json(HeartbeatResponse { refreshed })).into_response()
}
