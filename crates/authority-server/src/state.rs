//! Shared application state for the Action Authority server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use authority_core::Core;
use authority_storage::StorageBackend;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// The wired-together authority subsystems.
    pub core: Arc<Core>,
    /// Optional durable mirror for the forensic log.
    pub storage: Option<Arc<dyn StorageBackend>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
