//! Authority Lease Manager: short-lived bypass of the quorum gate for
//! LOW-risk work against a single session/domain pairing.
//!
//! A lease never survives a HIGH-risk attempt or a missed heartbeat — both
//! are atomically revoked and forensically recorded before the caller ever
//! sees the outcome, per `spec.md` §4.5.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::forensic::ForensicLog;
use crate::work_order::ExecutionDomain;

/// Default time-to-live for a newly created lease.
pub const DEFAULT_TTL_MS: i64 = 30_000;

/// Maximum tolerated gap between heartbeats before a lease is revoked.
/// `spec.md` §4.5's explicit default.
pub const HEARTBEAT_INTERVAL_MS: i64 = 50;

/// Why a lease was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevokeReason {
    Explicit,
    Expired,
    HeartbeatMissed,
    RiskEscalation,
}

/// A grant allowing a session to bypass the quorum gate for LOW-risk work
/// in a single domain, subject to a TTL and a heartbeat invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub lease_id: String,
    pub session_id: String,
    pub domain: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<RevokeReason>,
}

/// The outcome of validating a lease at dispatch time.
#[derive(Debug, Clone)]
pub enum LeaseValidationOutcome {
    /// The lease is valid for this session/domain; the dispatcher may skip
    /// straight to bridge routing.
    Bypass(Lease),
    /// No lease exists for this session.
    NoLease,
    /// A lease exists but is scoped to a different domain than requested.
    /// Per `SPEC_FULL.md` §9, this rejects only this dispatch — the lease
    /// itself remains active for its own domain.
    ScopeViolation { lease: Lease },
    /// The lease was already revoked (explicitly, by risk escalation, or by
    /// a prior expiry/heartbeat-miss detection).
    Revoked { lease: Lease },
    /// The lease's TTL has elapsed. Just revoked by this call.
    Expired { lease: Lease },
    /// The heartbeat interval was exceeded. Just revoked by this call.
    HeartbeatMissed { lease: Lease, gap_ms: i64 },
}

/// Manages all active leases, keyed by session id.
#[derive(Default)]
pub struct LeaseManager {
    leases: Mutex<HashMap<String, Lease>>,
}

impl LeaseManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new lease for `session_id`/`domain`, writing a forensic
    /// entry before returning.
    pub fn create(&self, session_id: impl Into<String>, domain: &ExecutionDomain, log: &ForensicLog) -> Lease {
        let session_id = session_id.into();
        let now = Utc::now();
        let lease = Lease {
            lease_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.clone(),
            domain: domain.as_str().to_owned(),
            issued_at: now,
            expires_at: now + ChronoDuration::milliseconds(DEFAULT_TTL_MS),
            last_heartbeat: now,
            revoked: false,
            revoked_at: None,
            revocation_reason: None,
        };

        if let Err(err) = log.seal(
            "lease_created",
            serde_json::json!({
                "lease_id": lease.lease_id,
                "session_id": lease.session_id,
                "domain": lease.domain,
            }),
        ) {
            tracing::error!(%err, lease_id = %lease.lease_id, "failed to seal lease_created forensic entry");
        }

        self.leases.lock().insert(session_id, lease.clone());
        lease
    }

    #[must_use]
    pub fn find_by_id(&self, lease_id: &str) -> Option<Lease> {
        self.leases.lock().values().find(|l| l.lease_id == lease_id).cloned()
    }

    /// Refresh a lease's heartbeat by session id. No-op (returns `false`) if
    /// the lease is unknown or already revoked.
    pub fn heartbeat(&self, session_id: &str) -> bool {
        let mut leases = self.leases.lock();
        match leases.get_mut(session_id) {
            Some(lease) if !lease.revoked => {
                lease.last_heartbeat = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Refresh a lease's heartbeat by lease id, for callers that only know
    /// the lease handle (e.g. the HTTP heartbeat route).
    pub fn heartbeat_by_lease_id(&self, lease_id: &str) -> bool {
        let mut leases = self.leases.lock();
        match leases.values_mut().find(|l| l.lease_id == lease_id) {
            Some(lease) if !lease.revoked => {
                lease.last_heartbeat = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Explicitly revoke a session's lease. Idempotent: revoking an
    /// already-revoked lease writes no second forensic entry.
    pub fn revoke(&self, session_id: &str, reason: RevokeReason, log: &ForensicLog) {
        let mut leases = self.leases.lock();
        if let Some(lease) = leases.get_mut(session_id) {
            Self::revoke_locked(lease, reason, log, serde_json::json!({}));
        }
    }

    /// If `session_id` holds a lease, revoke it for risk escalation. A
    /// HIGH-risk action is never allowed to coexist with an active LOW-risk
    /// bypass lease. Never grants a bypass itself.
    pub fn escalate_if_present(&self, session_id: &str, log: &ForensicLog) {
        let mut leases = self.leases.lock();
        if let Some(lease) = leases.get_mut(session_id) {
            if !lease.revoked {
                Self::revoke_locked(lease, RevokeReason::RiskEscalation, log, serde_json::json!({}));
            }
        }
    }

    fn revoke_locked(lease: &mut Lease, reason: RevokeReason, log: &ForensicLog, extra: serde_json::Value) {
        if lease.revoked {
            return;
        }
        lease.revoked = true;
        lease.revoked_at = Some(Utc::now());
        lease.revocation_reason = Some(reason);

        let mut payload = serde_json::json!({
            "lease_id": lease.lease_id,
            "session_id": lease.session_id,
            "reason": reason,
        });
        if let (serde_json::Value::Object(ref mut map), serde_json::Value::Object(extra_map)) = (&mut payload, extra) {
            map.extend(extra_map);
        }

        tracing::warn!(lease_id = %lease.lease_id, reason = ?reason, "lease revoked");
        if let Err(err) = log.seal("lease_revoked", payload) {
            tracing::error!(%err, lease_id = %lease.lease_id, "failed to seal lease_revoked forensic entry");
        }
    }

    /// Validate a session's lease against a requested domain, per
    /// `spec.md` §4.5's heartbeat invariant and scope rules. TTL overrun and
    /// heartbeat-miss atomically revoke the lease and write a forensic
    /// entry *within this call* before returning.
    pub fn validate(&self, session_id: &str, domain: &ExecutionDomain, log: &ForensicLog) -> LeaseValidationOutcome {
        let mut leases = self.leases.lock();
        let Some(lease) = leases.get_mut(session_id) else {
            return LeaseValidationOutcome::NoLease;
        };

        if lease.revoked {
            return LeaseValidationOutcome::Revoked { lease: lease.clone() };
        }

        let now = Utc::now();
        if now > lease.expires_at {
            Self::revoke_locked(lease, RevokeReason::Expired, log, serde_json::json!({}));
            return LeaseValidationOutcome::Expired { lease: lease.clone() };
        }

        // Strict `>`: a gap exactly equal to the interval is still tolerated.
        let gap_ms = (now - lease.last_heartbeat).num_milliseconds();
        if gap_ms > HEARTBEAT_INTERVAL_MS {
            Self::revoke_locked(
                lease,
                RevokeReason::HeartbeatMissed,
                log,
                serde_json::json!({ "gap_ms": gap_ms, "interval_ms": HEARTBEAT_INTERVAL_MS }),
            );
            return LeaseValidationOutcome::HeartbeatMissed { lease: lease.clone(), gap_ms };
        }

        if lease.domain != domain.as_str() {
            return LeaseValidationOutcome::ScopeViolation { lease: lease.clone() };
        }

        LeaseValidationOutcome::Bypass(lease.clone())
    }
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager")
            .field("count", &self.leases.lock().len())
            .finish_non_exhaustive()
    }
}
