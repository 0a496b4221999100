//! Dispatcher: the single pipeline a work order passes through from
//! "FSM reached `EXECUTED`" to a terminal, forensically-recorded outcome.
//!
//! Per `spec.md` §4.6 this is one pipeline, not a set of parallel `Core`
//! code paths: missing-audit check, risk pre-check/lease consultation,
//! quorum composition, policy evaluation, bridge routing, execution, and
//! forensic recording all happen inside [`Dispatcher::dispatch`]. A LOW-risk
//! action with a valid lease skips quorum and policy entirely and goes
//! straight to bridge routing; a HIGH-risk action always revokes any lease
//! the session holds and always needs its own quorum signatures.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bridge::BridgeRegistry;
use crate::error::{BridgeError, PolicyError};
use crate::forensic::ForensicLog;
use crate::lease::{LeaseManager, LeaseValidationOutcome};
use crate::policy::PolicyEngine;
use crate::quorum::{Attestation, QuorumGate};
use crate::work_order::{RiskLevel, WorkOrder};

/// Terminal result of a dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Success { output: serde_json::Value },
    Failed { reason: String },
}

/// Wires together the policy engine, bridge registry, lease manager, quorum
/// gate, and forensic log needed to run one work order's pipeline end to
/// end.
pub struct Dispatcher {
    policy: Arc<PolicyEngine>,
    bridges: Arc<BridgeRegistry>,
    leases: Arc<LeaseManager>,
    quorum: Arc<QuorumGate>,
    log: Arc<ForensicLog>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        policy: Arc<PolicyEngine>,
        bridges: Arc<BridgeRegistry>,
        leases: Arc<LeaseManager>,
        quorum: Arc<QuorumGate>,
        log: Arc<ForensicLog>,
    ) -> Self {
        Self {
            policy,
            bridges,
            leases,
            quorum,
            log,
        }
    }

    /// Run the full dispatch pipeline for a work order whose FSM has already
    /// reached `EXECUTED`. `operator_id`/`rationale`, if given, are attested
    /// inline as part of quorum composition (step 3) before checking whether
    /// the envelope has sealed.
    ///
    /// Returns `None` if the work order is still waiting on further quorum
    /// signatures — the caller should report this as pending, not failed.
    pub async fn dispatch(
        &self,
        work_order: WorkOrder,
        operator_id: Option<String>,
        rationale: Option<String>,
    ) -> Option<DispatchOutcome> {
        // Step 1: a work order with no audit binding never reaches the
        // dispatcher legitimately.
        if work_order.audit().audit_id.is_empty() {
            return Some(self.fail(&work_order, "missing audit binding").await);
        }

        // Step 2: risk pre-check / lease consultation.
        if work_order.risk_level() == RiskLevel::Low {
            if let Some(session_id) = work_order.session_id() {
                if matches!(
                    self.leases.validate(session_id, work_order.domain(), &self.log),
                    LeaseValidationOutcome::Bypass(_)
                ) {
                    // Lease bypass: skip quorum and policy, go straight to
                    // bridge routing.
                    return Some(self.run_bridge_pipeline(&work_order).await);
                }
            }
        } else if let Some(session_id) = work_order.session_id() {
            self.leases.escalate_if_present(session_id, &self.log);
        }

        // Step 3: quorum composition.
        let key = work_order.id().to_string();
        self.quorum.open(key.clone(), work_order.risk_level());
        if let Some(operator_id) = operator_id {
            let attestation = Attestation {
                operator_id,
                signed_at: chrono::Utc::now(),
                rationale,
            };
            // An `EnvelopeSealed` error here means another caller already
            // completed quorum concurrently; fall through to the sealed
            // check below rather than treating it as fatal.
            let _ = self.quorum.attest(&key, attestation, &self.log);
        }
        if !self.quorum.is_sealed(&key) {
            return None;
        }

        Some(self.run_bridge_pipeline(&work_order).await)
    }

    /// Steps 4-6: policy evaluation, bridge routing/execution, forensic
    /// recording of the terminal outcome.
    async fn run_bridge_pipeline(&self, work_order: &WorkOrder) -> DispatchOutcome {
        let policy_decision = match self.policy.evaluate(work_order.domain(), work_order.payload()) {
            Ok(decision) => decision,
            Err(PolicyError::PolicyEngineError { inner }) => {
                tracing::error!(action_id = %work_order.id(), %inner, "policy engine failed closed");
                return self.fail(work_order, &format!("policy engine error: {inner}")).await;
            }
            Err(other) => return self.fail(work_order, &other.to_string()).await,
        };

        if policy_decision.is_blocked() {
            let reason = policy_decision
                .violations
                .iter()
                .map(|v| v.rule.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return self.fail(work_order, &format!("policy violation: {reason}")).await;
        }

        let Some(bridge) = self.bridges.get(work_order.domain()) else {
            let err = BridgeError::NoBridgeForDomain {
                domain: work_order.domain().as_str().to_owned(),
            };
            return self.fail(work_order, &err.to_string()).await;
        };

        let wo = work_order.clone();
        let bridge = Arc::clone(&bridge);
        let execution = tokio::spawn(async move { bridge.execute(&wo).await }).await;

        match execution {
            Ok(Ok(outcome)) => self.succeed(work_order, outcome.output).await,
            Ok(Err(bridge_err)) => self.fail(work_order, &bridge_err.to_string()).await,
            Err(join_err) => {
                let err = BridgeError::BridgeException {
                    inner: join_err.to_string(),
                };
                self.fail(work_order, &err.to_string()).await
            }
        }
    }

    async fn succeed(&self, work_order: &WorkOrder, output: serde_json::Value) -> DispatchOutcome {
        match self.log.seal(
            "dispatch_succeeded",
            serde_json::json!({
                "action_id": work_order.id().to_string(),
                "domain": work_order.domain().as_str(),
                "output": output,
            }),
        ) {
            Ok(entry) => tracing::info!(action_id = %work_order.id(), sequence = entry.sequence, "dispatch succeeded"),
            Err(err) => tracing::error!(%err, action_id = %work_order.id(), "failed to seal dispatch_succeeded forensic entry"),
        }
        DispatchOutcome::Success { output }
    }

    async fn fail(&self, work_order: &WorkOrder, reason: &str) -> DispatchOutcome {
        match self.log.seal(
            "dispatch_failed",
            serde_json::json!({
                "action_id": work_order.id().to_string(),
                "domain": work_order.domain().as_str(),
                "reason": reason,
            }),
        ) {
            Ok(entry) => tracing::warn!(action_id = %work_order.id(), sequence = entry.sequence, %reason, "dispatch failed"),
            Err(err) => tracing::error!(%err, action_id = %work_order.id(), "failed to seal dispatch_failed forensic entry"),
        }
        DispatchOutcome::Failed {
            reason: reason.to_owned(),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
