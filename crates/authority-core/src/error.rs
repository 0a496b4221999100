//! Error taxonomy for the Action Authority core.
//!
//! Every variant carries enough context to reconstruct what happened without
//! a debugger. No error type is caught and swallowed silently — every
//! fatal or terminal outcome is surfaced to the dispatcher and recorded in
//! the forensic log.

use crate::policy::Severity;

/// Errors from [`crate::fsm::AuthorityFsm`] transitions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthorizationError {
    /// The requested event is not legal from the FSM's current state.
    #[error("event is not a legal transition from the current state")]
    ForbiddenTransition,

    /// The FSM has already reached a terminal state; no further events are
    /// accepted.
    #[error("FSM is in a terminal state and accepts no further events")]
    TerminalState,

    /// The caller's `current_context_id` does not match the FSM's bound
    /// context. The FSM has already moved to `EXPIRED` by the time this is
    /// returned.
    #[error("action context has been invalidated; FSM moved to EXPIRED")]
    ContextInvalidated,

    /// A work order was presented to the dispatcher without an audit
    /// binding.
    #[error("work order has no audit binding")]
    MissingAuditBinding,
}

/// Errors from [`crate::quorum::QuorumGate`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QuorumError {
    /// The envelope already reached quorum and is frozen; it cannot accept
    /// attestations from a session that has not already signed it.
    #[error("authorization envelope for work order {work_order_id} is already sealed")]
    EnvelopeSealed { work_order_id: String },
}

/// Errors from [`crate::lease::LeaseManager`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LeaseError {
    /// The lease was not found.
    #[error("lease not found: {lease_id}")]
    NotFound { lease_id: String },

    /// The lease's TTL has elapsed.
    #[error("lease expired: {lease_id}")]
    LeaseExpired { lease_id: String },

    /// The heartbeat interval was exceeded at validation time.
    #[error("lease {lease_id} heartbeat missed (last heartbeat {gap_ms}ms ago, interval {interval_ms}ms)")]
    HeartbeatMissed {
        lease_id: String,
        gap_ms: i64,
        interval_ms: i64,
    },

    /// The lease's domain does not match the work order's domain.
    #[error("lease {lease_id} is scoped to domain '{lease_domain}', not '{requested_domain}'")]
    ScopeViolation {
        lease_id: String,
        lease_domain: String,
        requested_domain: String,
    },

    /// A HIGH-risk action was attempted while a lease was active.
    #[error("lease {lease_id} revoked due to risk escalation")]
    RiskEscalation { lease_id: String },

    /// The lease has already been revoked.
    #[error("lease already revoked: {lease_id}")]
    LeaseRevoked { lease_id: String },
}

/// A single rule violation surfaced by the policy engine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PolicyViolationDetail {
    pub rule: String,
    pub severity: Severity,
    pub detail: String,
}

/// Errors from [`crate::policy::PolicyEngine`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    /// The proposed action failed one or more blocking policy rules. Not
    /// fatal — the dispatch fails cleanly with this as the recorded reason.
    #[error("policy violation: {reason}")]
    PolicyViolation {
        reason: String,
        violations: Vec<PolicyViolationDetail>,
    },

    /// A rule evaluator raised an exception. Fatal — the containing
    /// dispatch MUST NOT execute (fail-closed).
    #[error("policy engine error: {inner}")]
    PolicyEngineError { inner: String },

    /// The engine has already been initialized; `initialize` cannot be
    /// called twice on the same instance. Use `reload` instead.
    #[error("policy engine is already initialized")]
    AlreadyInitialized,

    /// `reload` was called before `initialize`.
    #[error("policy engine has not been initialized")]
    NotInitialized,

    /// A `PolicyConfig` supplied to `initialize`/`reload` contained an
    /// invalid regex pattern.
    #[error("invalid policy configuration: {detail}")]
    InvalidConfig { detail: String },
}

/// Errors from bridge dispatch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// No bridge is registered for the work order's domain.
    #[error("no bridge registered for domain '{domain}'")]
    NoBridgeForDomain { domain: String },

    /// The bridge panicked or otherwise violated its contract of never
    /// raising.
    #[error("bridge raised an exception: {inner}")]
    BridgeException { inner: String },

    /// The bridge did not complete within its allotted time.
    #[error("bridge timed out")]
    BridgeTimeout,
}

/// Errors from [`crate::forensic::ForensicLog`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LogError {
    /// The log has been sealed; no further writes are accepted.
    #[error("forensic log is sealed")]
    LogSealed,

    /// Hash-chain verification found a broken link.
    #[error("chain corruption detected at entry {first_bad_entry}")]
    ChainCorruption { first_bad_entry: usize },
}
