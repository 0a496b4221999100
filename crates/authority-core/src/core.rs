//! The facade tying every subsystem together into the control-surface
//! operations: `submit_proposal`, `advance_fsm`, `register_attestation`,
//! `dispatch`, `create_lease`, `heartbeat_lease`, `switch_context`,
//! `verify_log`.
//!
//! `Core` is the single explicit value threading context binding, the FSM
//! registry, the quorum gate, the lease manager, the policy engine, the
//! bridge registry, and the forensic log together — there is no hidden
//! global or singleton state anywhere in this crate.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bridge::BridgeRegistry;
use crate::context::{ActionContext, ContextBinder};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::{AuthorizationError, QuorumError};
use crate::forensic::ForensicLog;
use crate::fsm::{AuthorityFsm, Clock, Event, FsmRegistry, State, SystemClock};
use crate::lease::{Lease, LeaseManager, RevokeReason};
use crate::policy::{PolicyConfig, PolicyEngine};
use crate::quorum::{Attestation, QuorumGate};
use crate::work_order::{
    AuditBinding, AuditId, ExecutionDomain, ForensicMeta, RiskLevel, WorkOrder, WorkOrderId,
};

/// The inputs needed to construct a [`WorkOrder`] once its FSM reaches
/// `EXECUTED`; held between `submit_proposal` and `advance_fsm`.
struct PendingProposal {
    description: String,
    domain: ExecutionDomain,
    bridge_type: String,
    payload: serde_json::Value,
    risk_level: RiskLevel,
    session_id: String,
    rationale: String,
    context_id: String,
}

/// Outcome of a `dispatch` call: either the work order is not yet ready
/// (its FSM has not reached `EXECUTED`, or its quorum envelope has not
/// sealed — both map to HTTP 202 at the control surface) or it ran through
/// the dispatcher pipeline to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoreDispatchResult {
    PendingAttestation,
    Done(DispatchOutcome),
}

/// Wires every authority subsystem together behind the control-surface
/// operations.
pub struct Core {
    context: ContextBinder,
    fsms: FsmRegistry,
    quorum: Arc<QuorumGate>,
    leases: Arc<LeaseManager>,
    policy: Arc<PolicyEngine>,
    bridges: Arc<BridgeRegistry>,
    log: Arc<ForensicLog>,
    dispatcher: Dispatcher,
    clock: Box<dyn Clock>,
    pending: Mutex<HashMap<String, PendingProposal>>,
    authorized: Mutex<HashMap<String, WorkOrder>>,
}

impl Core {
    /// Build a `Core` with the production system clock and the default
    /// policy configuration.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::PolicyError::AlreadyInitialized`] if
    /// called on an already-initialized policy engine, which cannot happen
    /// for a freshly constructed `Core`.
    pub fn new() -> Result<Self, crate::error::PolicyError> {
        Self::with_clock(Box::new(SystemClock))
    }

    /// Build a `Core` with an injectable clock, for deterministic tests.
    pub fn with_clock(clock: Box<dyn Clock>) -> Result<Self, crate::error::PolicyError> {
        let policy = Arc::new(PolicyEngine::new());
        policy.initialize(PolicyConfig::default())?;
        let leases = Arc::new(LeaseManager::new());
        let bridges = Arc::new(BridgeRegistry::new());
        let quorum = Arc::new(QuorumGate::new());
        let log = Arc::new(ForensicLog::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&policy),
            Arc::clone(&bridges),
            Arc::clone(&leases),
            Arc::clone(&quorum),
            Arc::clone(&log),
        );

        Ok(Self {
            context: ContextBinder::new(),
            fsms: FsmRegistry::new(),
            quorum,
            leases,
            policy,
            bridges,
            log,
            dispatcher,
            clock,
            pending: Mutex::new(HashMap::new()),
            authorized: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn context(&self) -> &ContextBinder {
        &self.context
    }

    #[must_use]
    pub fn bridges(&self) -> &BridgeRegistry {
        &self.bridges
    }

    #[must_use]
    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    #[must_use]
    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    #[must_use]
    pub fn log(&self) -> &ForensicLog {
        &self.log
    }

    /// Submit a new proposal, opening its FSM and quorum envelope. The
    /// caller-supplied `context_id` must match the currently bound context
    /// (or there must be none yet bound, in which case it is bound now).
    #[allow(clippy::too_many_arguments)]
    pub fn submit_proposal(
        &self,
        description: impl Into<String>,
        domain: ExecutionDomain,
        bridge_type: impl Into<String>,
        payload: serde_json::Value,
        risk_level: RiskLevel,
        session_id: impl Into<String>,
        context_id: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Result<WorkOrderId, AuthorizationError> {
        let context_id = context_id.into();
        if self.context.current().is_none() {
            self.context.bind(ActionContext::new(context_id.clone(), "genesis"));
        } else if !self.context.validate_action(&context_id, None) {
            return Err(AuthorizationError::ContextInvalidated);
        }

        let action_id = WorkOrderId::new();
        let fsm = Arc::new(AuthorityFsm::new(self.clock.as_ref(), context_id.clone()));
        self.fsms.insert(action_id.to_string(), fsm);
        self.quorum.open(action_id.to_string(), risk_level);

        let mut pending = self.pending.lock();
        pending.insert(
            action_id.to_string(),
            PendingProposal {
                description: description.into(),
                domain,
                bridge_type: bridge_type.into(),
                payload,
                risk_level,
                session_id: session_id.into(),
                rationale: rationale.into(),
                context_id,
            },
        );

        tracing::info!(action_id = %action_id, "proposal submitted");
        Ok(action_id)
    }

    /// Drive a proposal's FSM with `event`. The moment the FSM reaches
    /// `EXECUTED`, freezes and stores the [`WorkOrder`] (capturing the
    /// realized hold duration for the forensic trace) so `dispatch` can find
    /// it.
    pub fn advance_fsm(&self, action_id: &WorkOrderId, event: Event) -> Result<State, AuthorizationError> {
        let key = action_id.to_string();
        let fsm = self.fsms.get(&key).ok_or(AuthorizationError::ForbiddenTransition)?;
        let current_context = self.context.current().map(|c| c.context_id).unwrap_or_default();
        let state = fsm.advance(event, self.clock.as_ref(), &current_context)?;

        if state == State::Executed {
            let pending = self.pending.lock().remove(&key);
            if let Some(pending) = pending {
                let audit = AuditBinding {
                    audit_id: AuditId::new(uuid::Uuid::new_v4().to_string()),
                    context_hash: pending.context_id.clone(),
                    authorized_at: chrono::Utc::now(),
                    context_id: pending.context_id.clone(),
                    source_hash: pending.context_id.clone(),
                };
                let work_order = WorkOrder::new(
                    action_id.clone(),
                    pending.description,
                    pending.domain,
                    pending.bridge_type,
                    pending.payload,
                    pending.risk_level,
                    audit,
                    Some(ForensicMeta {
                        rationale: pending.rationale,
                        authority_trace: serde_json::json!({
                            "action_id": action_id.to_string(),
                            "hold_duration_ms": fsm.hold_duration_ms(),
                        }),
                        session: pending.session_id,
                    }),
                );
                self.authorized.lock().insert(key, work_order);
            }
        }

        Ok(state)
    }

    /// Register an operator attestation against a work order's quorum
    /// envelope. Returns `true` once this brings the envelope to quorum
    /// (duplicate operators do not count twice).
    ///
    /// # Errors
    ///
    /// Returns [`QuorumError::EnvelopeSealed`] if quorum was already
    /// reached.
    pub fn register_attestation(
        &self,
        action_id: &WorkOrderId,
        operator_id: impl Into<String>,
        rationale: Option<String>,
    ) -> Result<bool, QuorumError> {
        let attestation = Attestation {
            operator_id: operator_id.into(),
            signed_at: chrono::Utc::now(),
            rationale,
        };
        self.quorum.attest(&action_id.to_string(), attestation, &self.log)
    }

    /// Attempt to dispatch a proposal. Returns `PendingAttestation` if the
    /// FSM has not yet reached `EXECUTED`, or if the dispatcher's own quorum
    /// composition step finds the envelope still unsealed even after
    /// applying an inline `operator_id`/`rationale` attestation.
    pub async fn dispatch(
        &self,
        action_id: &WorkOrderId,
        operator_id: Option<String>,
        rationale: Option<String>,
    ) -> CoreDispatchResult {
        let work_order = self.authorized.lock().get(&action_id.to_string()).cloned();
        let Some(work_order) = work_order else {
            return CoreDispatchResult::PendingAttestation;
        };

        match self.dispatcher.dispatch(work_order, operator_id, rationale).await {
            Some(outcome) => CoreDispatchResult::Done(outcome),
            None => CoreDispatchResult::PendingAttestation,
        }
    }

    /// Issue a lease for `session_id` scoped to `domain`.
    pub fn create_lease(&self, session_id: impl Into<String>, domain: &ExecutionDomain) -> Lease {
        self.leases.create(session_id, domain, &self.log)
    }

    /// Refresh a lease's heartbeat by lease id. Returns `false` if the lease
    /// is unknown or already revoked.
    pub fn heartbeat_lease(&self, lease_id: &str) -> bool {
        self.leases.heartbeat_by_lease_id(lease_id)
    }

    /// Revoke a session's lease explicitly.
    pub fn revoke_lease(&self, session_id: &str) {
        self.leases.revoke(session_id, RevokeReason::Explicit, &self.log);
    }

    /// Switch the process-wide operational context, expiring every FSM
    /// bound to whatever context was previously current. Returns the
    /// invalidated context id (if the switch was not a no-op) and the
    /// number of FSMs expired as a result.
    pub fn switch_context(&self, context_id: impl Into<String>, source_hash: impl Into<String>) -> (Option<String>, usize) {
        let new_context = ActionContext::new(context_id, source_hash);
        let invalidated = self.context.switch_context(new_context);
        let expired = match &invalidated {
            Some(old_context_id) => self.fsms.expire_context(old_context_id, self.clock.as_ref()),
            None => 0,
        };
        (invalidated, expired)
    }

    /// Verify the forensic log's hash chain.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LogError::ChainCorruption`] at the first
    /// broken link.
    pub fn verify_log(&self) -> Result<(), crate::error::LogError> {
        self.log.verify()
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::EchoBridge;
    use crate::fsm::{FakeClock, HOLD_DURATION};

    fn core_with_fake_clock() -> (Core, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        let core = Core::with_clock(Box::new(FakeClockHandle(Arc::clone(&clock)))).unwrap();
        core.bridges().register(Arc::new(EchoBridge::new("chrome")));
        (core, clock)
    }

    struct FakeClockHandle(Arc<FakeClock>);
    impl Clock for FakeClockHandle {
        fn now(&self) -> std::time::Instant {
            self.0.now()
        }
    }

    fn arm_and_execute(core: &Core, action_id: &WorkOrderId, clock: &FakeClock) {
        core.advance_fsm(action_id, Event::Show).unwrap();
        core.advance_fsm(action_id, Event::HoldStart).unwrap();
        clock.advance(HOLD_DURATION);
        core.advance_fsm(action_id, Event::HoldTimeout).unwrap();
        core.advance_fsm(action_id, Event::Confirm).unwrap();
        core.advance_fsm(action_id, Event::Confirm).unwrap();
    }

    #[tokio::test]
    async fn happy_low_risk_path_reaches_dispatch() {
        let (core, clock) = core_with_fake_clock();

        let action_id = core
            .submit_proposal(
                "click button",
                ExecutionDomain::new("chrome"),
                "applescript",
                serde_json::json!({"selector": "#go"}),
                RiskLevel::Low,
                "session-1",
                "ctx-1",
                "user requested",
            )
            .unwrap();

        arm_and_execute(&core, &action_id, &clock);

        let outcome = core.dispatch(&action_id, Some("operator-1".to_owned()), None).await;
        assert!(matches!(outcome, CoreDispatchResult::Done(DispatchOutcome::Success { .. })));
    }

    #[tokio::test]
    async fn dispatch_before_fsm_reaches_executed_is_pending() {
        let (core, _clock) = core_with_fake_clock();

        let action_id = core
            .submit_proposal(
                "click button",
                ExecutionDomain::new("chrome"),
                "applescript",
                serde_json::json!({}),
                RiskLevel::Low,
                "session-1",
                "ctx-1",
                "user requested",
            )
            .unwrap();

        let outcome = core.dispatch(&action_id, Some("operator-1".to_owned()), None).await;
        assert!(matches!(outcome, CoreDispatchResult::PendingAttestation));
    }

    #[tokio::test]
    async fn dispatch_before_quorum_sealed_is_pending() {
        let (core, clock) = core_with_fake_clock();

        let action_id = core
            .submit_proposal(
                "dangerous op",
                ExecutionDomain::new("chrome"),
                "applescript",
                serde_json::json!({}),
                RiskLevel::High,
                "session-1",
                "ctx-1",
                "user requested",
            )
            .unwrap();

        arm_and_execute(&core, &action_id, &clock);

        let outcome = core.dispatch(&action_id, Some("operator-1".to_owned()), None).await;
        assert!(matches!(outcome, CoreDispatchResult::PendingAttestation));
    }

    #[tokio::test]
    async fn high_risk_requires_second_distinct_operator() {
        let (core, clock) = core_with_fake_clock();

        let action_id = core
            .submit_proposal(
                "dangerous op",
                ExecutionDomain::new("chrome"),
                "applescript",
                serde_json::json!({}),
                RiskLevel::High,
                "session-1",
                "ctx-1",
                "user requested",
            )
            .unwrap();

        arm_and_execute(&core, &action_id, &clock);

        let first = core.register_attestation(&action_id, "operator-1", None).unwrap();
        assert!(!first);

        let outcome = core.dispatch(&action_id, Some("operator-2".to_owned()), None).await;
        assert!(matches!(outcome, CoreDispatchResult::Done(DispatchOutcome::Success { .. })));
    }

    #[tokio::test]
    async fn lease_bypass_dispatches_without_quorum() {
        let (core, clock) = core_with_fake_clock();
        core.create_lease("session-1", &ExecutionDomain::new("chrome"));

        let action_id = core
            .submit_proposal(
                "low risk click",
                ExecutionDomain::new("chrome"),
                "applescript",
                serde_json::json!({"ok": true}),
                RiskLevel::Low,
                "session-1",
                "ctx-1",
                "user requested",
            )
            .unwrap();

        arm_and_execute(&core, &action_id, &clock);

        let outcome = core.dispatch(&action_id, None, None).await;
        assert!(matches!(outcome, CoreDispatchResult::Done(DispatchOutcome::Success { .. })));
    }

    #[test]
    fn switch_context_expires_fsms_bound_to_the_old_context() {
        let (core, _clock) = core_with_fake_clock();

        let action_id = core
            .submit_proposal(
                "click button",
                ExecutionDomain::new("chrome"),
                "applescript",
                serde_json::json!({}),
                RiskLevel::Low,
                "session-1",
                "ctx-1",
                "user requested",
            )
            .unwrap();

        let (invalidated, expired) = core.switch_context("ctx-2", "hash-b");
        assert_eq!(invalidated, Some("ctx-1".to_owned()));
        assert_eq!(expired, 1);

        let result = core.advance_fsm(&action_id, Event::Show);
        assert!(matches!(result, Err(AuthorizationError::TerminalState)));
    }
}
