//! Action Authority HTTP server.
//!
//! Wires the core library into a running Axum server exposing the control
//! surface documented in `SPEC_FULL.md` §6: proposal submission, FSM
//! advancement, attestation registration, dispatch, lease issuance and
//! heartbeat, context switching, and forensic log inspection.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use authority_core::{Core, EchoBridge};
use authority_storage::{FileBackend, StorageBackend};

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build the shared application state: a fresh [`Core`] with the built-in
/// echo bridges registered, and an optional durable forensic-log mirror.
pub async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let core = Arc::new(Core::new().context("failed to initialize authority core")?);

    core.bridges().register(Arc::new(EchoBridge::new("chrome")));
    core.bridges().register(Arc::new(EchoBridge::new("excel")));
    core.bridges().register(Arc::new(EchoBridge::new("terminal")));

    let storage: Option<Arc<dyn StorageBackend>> = match &config.forensic_file_path {
        Some(path) => {
            info!(path = %path, "mirroring forensic log to file backend");
            Some(Arc::new(FileBackend::open(path).await.context("failed to open forensic file backend")?))
        }
        None => {
            info!("forensic log has no durable mirror (in-memory only)");
            None
        }
    };

    Ok(Arc::new(AppState { core, storage }))
}

/// Build the Axum router: all route modules nested under their
/// `/v1/...` prefixes, with tracing, CORS, and a hardened response header.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .nest("/v1/proposals", routes::proposals::router())
        .nest("/v1/work-orders", routes::attestations::router())
        .nest("/v1/work-orders", routes::dispatch::router())
        .nest("/v1/forensic-log", routes::forensic_log::router())
        .nest("/v1/leases", routes::leases::router())
        .nest("/v1/context", routes::context::router())
        .nest("/v1/health", routes::health::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}
