//! The immutable work order data model.
//!
//! A [`WorkOrder`] is frozen at construction — there is no `set_*` method
//! anywhere on this type. It is the only artifact that crosses the
//! FSM/dispatcher boundary (`spec.md` §3), carried by value and cloned
//! freely since cloning an immutable value can never observe a mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a work order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkOrderId(Uuid);

impl WorkOrderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WorkOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for WorkOrderId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for WorkOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an audit (sealed FSM authorization) binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditId(String);

impl AuditId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for AuditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-empty, lowercase execution domain identifier (e.g. `logic_pro`,
/// `chrome`, `excel`). Bridges register against this exact value, so
/// normalization at construction keeps registry lookups exact-match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionDomain(String);

impl ExecutionDomain {
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutionDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `LOW` risk requires a single signature; `HIGH` requires two distinct
/// ones and never bypasses the lease lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    High,
}

impl RiskLevel {
    /// Number of unique operator signatures required to reach quorum.
    #[must_use]
    pub fn required_signatures(self) -> u32 {
        match self {
            RiskLevel::Low => 1,
            RiskLevel::High => 2,
        }
    }
}

/// The authorization receipt attached to a work order. Absence of this
/// block (i.e. no audit id) is a hard reject at the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditBinding {
    pub audit_id: AuditId,
    pub context_hash: String,
    pub authorized_at: DateTime<Utc>,
    pub context_id: String,
    pub source_hash: String,
}

/// Optional forensic metadata carried alongside a work order, used to
/// derive the [`crate::quorum::Attestation`] registered at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicMeta {
    pub rationale: String,
    pub authority_trace: serde_json::Value,
    pub session: String,
}

/// The immutable, audit-bound instruction handed from the authority core to
/// a bridge.
///
/// Constructed once via [`WorkOrder::new`]; every field is private and
/// exposed only through read-only accessors, so no caller can mutate a
/// work order after creation (`spec.md` P6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    action_id: WorkOrderId,
    description: String,
    domain: ExecutionDomain,
    bridge_type: String,
    payload: serde_json::Value,
    risk_level: RiskLevel,
    audit: AuditBinding,
    forensic: Option<ForensicMeta>,
}

impl WorkOrder {
    /// Construct a new, immediately-frozen work order.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        action_id: WorkOrderId,
        description: impl Into<String>,
        domain: ExecutionDomain,
        bridge_type: impl Into<String>,
        payload: serde_json::Value,
        risk_level: RiskLevel,
        audit: AuditBinding,
        forensic: Option<ForensicMeta>,
    ) -> Self {
        Self {
            action_id,
            description: description.into(),
            domain,
            bridge_type: bridge_type.into(),
            payload,
            risk_level,
            audit,
            forensic,
        }
    }

    #[must_use]
    pub fn id(&self) -> &WorkOrderId {
        &self.action_id
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn domain(&self) -> &ExecutionDomain {
        &self.domain
    }

    #[must_use]
    pub fn bridge_type(&self) -> &str {
        &self.bridge_type
    }

    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    #[must_use]
    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    #[must_use]
    pub fn audit(&self) -> &AuditBinding {
        &self.audit
    }

    #[must_use]
    pub fn forensic(&self) -> Option<&ForensicMeta> {
        self.forensic.as_ref()
    }

    /// Session id the work order was attested under, if any forensic
    /// metadata was attached.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.forensic.as_ref().map(|f| f.session.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_audit() -> AuditBinding {
        AuditBinding {
            audit_id: AuditId::new("audit-1"),
            context_hash: "hash".to_owned(),
            authorized_at: Utc::now(),
            context_id: "ctx-1".to_owned(),
            source_hash: "src-hash".to_owned(),
        }
    }

    #[test]
    fn work_order_serialization_is_idempotent() {
        let wo = WorkOrder::new(
            WorkOrderId::new(),
            "test action",
            ExecutionDomain::new("LOGIC_PRO"),
            "applescript",
            serde_json::json!({"key": "value"}),
            RiskLevel::Low,
            sample_audit(),
            None,
        );

        let once = serde_json::to_string(&wo).unwrap();
        let roundtripped: WorkOrder = serde_json::from_str(&once).unwrap();
        let twice = serde_json::to_string(&roundtripped).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn execution_domain_normalizes_case() {
        assert_eq!(ExecutionDomain::new("Chrome").as_str(), "chrome");
        assert_eq!(ExecutionDomain::new("  Excel  ").as_str(), "excel");
    }

    #[test]
    fn risk_level_signature_requirements() {
        assert_eq!(RiskLevel::Low.required_signatures(), 1);
        assert_eq!(RiskLevel::High.required_signatures(), 2);
    }
}
