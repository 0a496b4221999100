//! Quorum gate: collects distinct operator attestations against a work
//! order proposal until `risk_level.required_signatures()` is reached, then
//! freezes the envelope.
//!
//! Every method here is synchronous; sealing an envelope writes a forensic
//! entry before returning, per `spec.md` §4.5.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::QuorumError;
use crate::forensic::ForensicLog;
use crate::work_order::RiskLevel;

/// A single operator's signature against a work order proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attestation {
    pub operator_id: String,
    pub signed_at: DateTime<Utc>,
    pub rationale: Option<String>,
}

/// Per-work-order attestation state.
struct Envelope {
    risk_level: RiskLevel,
    attestations: Vec<Attestation>,
    sealed: bool,
}

/// Collects attestations across many work orders.
pub struct QuorumGate {
    envelopes: Mutex<HashMap<String, Envelope>>,
}

impl QuorumGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            envelopes: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new, empty envelope for a work order. Idempotent if
    /// called twice with the same id and risk level.
    pub fn open(&self, work_order_id: impl Into<String>, risk_level: RiskLevel) {
        let mut envelopes = self.envelopes.lock();
        envelopes.entry(work_order_id.into()).or_insert_with(|| Envelope {
            risk_level,
            attestations: Vec::new(),
            sealed: false,
        });
    }

    /// Register an attestation. Returns `true` once this brings the
    /// envelope to quorum (duplicate operators do not count twice).
    ///
    /// # Errors
    ///
    /// Returns [`QuorumError::EnvelopeSealed`] if the envelope has already
    /// reached quorum and been sealed.
    pub fn attest(
        &self,
        work_order_id: &str,
        attestation: Attestation,
        log: &ForensicLog,
    ) -> Result<bool, QuorumError> {
        let mut envelopes = self.envelopes.lock();
        let envelope = envelopes
            .entry(work_order_id.to_owned())
            .or_insert_with(|| Envelope {
                risk_level: RiskLevel::Low,
                attestations: Vec::new(),
                sealed: false,
            });

        if envelope.sealed {
            return Err(QuorumError::EnvelopeSealed {
                work_order_id: work_order_id.to_owned(),
            });
        }

        let already_signed = envelope
            .attestations
            .iter()
            .any(|a| a.operator_id == attestation.operator_id);
        if !already_signed {
            envelope.attestations.push(attestation);
        }

        let distinct = envelope.attestations.len() as u32;
        let reached = distinct >= envelope.risk_level.required_signatures();

        if reached {
            envelope.sealed = true;
            if let Err(err) = log.seal(
                "quorum_reached",
                serde_json::json!({
                    "work_order_id": work_order_id,
                    "signatures": distinct,
                }),
            ) {
                tracing::error!(%err, work_order_id, "failed to seal quorum_reached forensic entry");
            }
        }

        Ok(reached)
    }

    /// Current distinct-signature count for a work order, `0` if unopened.
    #[must_use]
    pub fn signature_count(&self, work_order_id: &str) -> u32 {
        let envelopes = self.envelopes.lock();
        envelopes
            .get(work_order_id)
            .map_or(0, |e| e.attestations.len() as u32)
    }

    #[must_use]
    pub fn is_sealed(&self, work_order_id: &str) -> bool {
        let envelopes = self.envelopes.lock();
        envelopes.get(work_order_id).is_some_and(|e| e.sealed)
    }
}

impl Default for QuorumGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QuorumGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuorumGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attestation(operator: &str) -> Attestation {
        Attestation {
            operator_id: operator.to_owned(),
            signed_at: Utc::now(),
            rationale: None,
        }
    }

    #[test]
    fn low_risk_reaches_quorum_on_first_signature() {
        let gate = QuorumGate::new();
        let log = ForensicLog::new();
        gate.open("wo-1", RiskLevel::Low);

        let reached = gate.attest("wo-1", attestation("op-1"), &log).unwrap();
        assert!(reached);
        assert!(gate.is_sealed("wo-1"));
    }

    #[test]
    fn high_risk_requires_two_distinct_operators() {
        let gate = QuorumGate::new();
        let log = ForensicLog::new();
        gate.open("wo-2", RiskLevel::High);

        let first = gate.attest("wo-2", attestation("op-1"), &log).unwrap();
        assert!(!first);
        assert!(!gate.is_sealed("wo-2"));

        let second = gate.attest("wo-2", attestation("op-2"), &log).unwrap();
        assert!(second);
        assert!(gate.is_sealed("wo-2"));
    }

    #[test]
    fn duplicate_operator_attestation_does_not_count_twice() {
        let gate = QuorumGate::new();
        let log = ForensicLog::new();
        gate.open("wo-3", RiskLevel::High);

        gate.attest("wo-3", attestation("op-1"), &log).unwrap();
        gate.attest("wo-3", attestation("op-1"), &log).unwrap();
        assert_eq!(gate.signature_count("wo-3"), 1);
        assert!(!gate.is_sealed("wo-3"));
    }

    #[test]
    fn sealed_envelope_rejects_further_attestations() {
        let gate = QuorumGate::new();
        let log = ForensicLog::new();
        gate.open("wo-4", RiskLevel::Low);
        gate.attest("wo-4", attestation("op-1"), &log).unwrap();

        let result = gate.attest("wo-4", attestation("op-2"), &log);
        assert!(matches!(result, Err(QuorumError::EnvelopeSealed { .. })));
    }
}
