//! Context routes: `/v1/context/switch`
//!
//! Wires [`authority_core::ContextBinder::switch_context`] to
//! [`authority_core::FsmRegistry::expire_context`] so a new operational
//! context invalidates every in-flight FSM bound to whatever context was
//! current before the switch (`spec.md` §4.2).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/switch", post(switch_context))
}

#[derive(Debug, Deserialize)]
pub struct SwitchContextRequest {
    pub context_id: String,
    pub source_hash: String,
}

#[derive(Debug, Serialize)]
pub struct SwitchContextResponse {
    pub invalidated_context_id: Option<String>,
    pub fsms_expired: usize,
}

async fn switch_context(State(state): State<Arc<AppState>>, Json(body): Json<SwitchContextRequest>) -> Json<SwitchContextResponse> {
    let (invalidated_context_id, fsms_expired) = state.core.switch_context(body.context_id, body.source_hash);
    Json(SwitchContextResponse {
        invalidated_context_id,
        fsms_expired,
    })
}
