//! Proposal routes: `/v1/proposals/*`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use authority_core::{Event, ExecutionDomain, RiskLevel, State as FsmState};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/proposals` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(submit_proposal))
        .route("/{action_id}/advance", post(advance_fsm))
}

#[derive(Debug, Deserialize)]
pub struct SubmitProposalRequest {
    pub description: String,
    pub domain: String,
    pub bridge_type: String,
    pub payload: serde_json::Value,
    pub risk_level: RiskLevel,
    pub session_id: String,
    pub context_id: String,
    pub rationale: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitProposalResponse {
    pub action_id: String,
}

async fn submit_proposal(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitProposalRequest>,
) -> Result<Json<SubmitProposalResponse>, AppError> {
    let action_id = state.core.submit_proposal(
        body.description,
        ExecutionDomain::new(body.domain),
        body.bridge_type,
        body.payload,
        body.risk_level,
        body.session_id,
        body.context_id,
        body.rationale,
    )?;

    Ok(Json(SubmitProposalResponse {
        action_id: action_id.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FsmEventRequest {
    Show,
    HoldStart,
    HoldEnd,
    HoldTimeout,
    Confirm,
    Expire,
    Reject,
}

impl From<FsmEventRequest> for Event {
    fn from(value: FsmEventRequest) -> Self {
        match value {
            FsmEventRequest::Show => Event::Show,
            FsmEventRequest::HoldStart => Event::HoldStart,
            FsmEventRequest::HoldEnd => Event::HoldEnd,
            FsmEventRequest::HoldTimeout => Event::HoldTimeout,
            FsmEventRequest::Confirm => Event::Confirm,
            FsmEventRequest::Expire => Event::Expire,
            FsmEventRequest::Reject => Event::Reject,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdvanceFsmRequest {
    pub event: FsmEventRequest,
}

#[derive(Debug, Serialize)]
pub struct AdvanceFsmResponse {
    pub state: FsmState,
}

async fn advance_fsm(
    State(state): State<Arc<AppState>>,
    Path(action_id): Path<uuid::Uuid>,
    Json(body): Json<AdvanceFsmRequest>,
) -> Result<Json<AdvanceFsmResponse>, AppError> {
    let action_id = authority_core::WorkOrderId::from(action_id);
    let new_state = state.core.advance_fsm(&action_id, body.event.into())?;
    Ok(Json(AdvanceFsmResponse { state: new_state }))
}
