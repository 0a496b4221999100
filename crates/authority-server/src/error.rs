//! HTTP error types for the Action Authority server.
//!
//! Maps domain errors from `authority-core` into HTTP responses per the
//! status table: forbidden FSM transitions and context invalidation are
//! `409`, policy violations are `422`, engine-internal failures are `500`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use authority_core::error::{AuthorizationError, BridgeError, LogError, PolicyError, QuorumError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    Conflict(String),
    UnprocessableEntity(String),
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "policy_violation", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<AuthorizationError> for AppError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::ForbiddenTransition
            | AuthorizationError::TerminalState
            | AuthorizationError::ContextInvalidated => Self::Conflict(err.to_string()),
            AuthorizationError::MissingAuditBinding => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<QuorumError> for AppError {
    fn from(err: QuorumError) -> Self {
        match err {
            QuorumError::EnvelopeSealed { .. } => Self::Conflict(err.to_string()),
        }
    }
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::PolicyViolation { .. } => Self::UnprocessableEntity(err.to_string()),
            PolicyError::InvalidConfig { .. } => Self::BadRequest(err.to_string()),
            PolicyError::PolicyEngineError { .. }
            | PolicyError::AlreadyInitialized
            | PolicyError::NotInitialized => Self::Internal(err.to_string()),
        }
    }
}

impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NoBridgeForDomain { .. } => Self::NotFound(err.to_string()),
            BridgeError::BridgeException { .. } | BridgeError::BridgeTimeout => Self::Internal(err.to_string()),
        }
    }
}

impl From<LogError> for AppError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::LogSealed => Self::Conflict(err.to_string()),
            LogError::ChainCorruption { .. } => Self::Internal(err.to_string()),
        }
    }
}
