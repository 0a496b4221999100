//! Forensic log routes: `/v1/forensic-log/*`

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use authority_core::LogEntry;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/verify", get(verify))
        .route("/export", get(export))
        .route("/stats", get(stats))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

async fn verify(State(state): State<Arc<AppState>>) -> Result<Json<VerifyResponse>, AppError> {
    state.core.verify_log()?;
    Ok(Json(VerifyResponse { valid: true }))
}

async fn export(State(state): State<Arc<AppState>>) -> Json<Vec<LogEntry>> {
    Json(state.core.log().export())
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub entry_count: usize,
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        entry_count: state.core.log().len(),
    })
}
