//! Bridge interface: the boundary between the authority core and the
//! domain-specific executors that actually perform a work order's action.
//!
//! Bridges are registered by [`crate::work_order::ExecutionDomain`] and
//! invoked only by the dispatcher. A bridge's contract is "never raise" —
//! any panic escaping `execute` is caught via `tokio::spawn`/`JoinError`
//! and converted into [`crate::error::BridgeError::BridgeException`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::work_order::{ExecutionDomain, WorkOrder};

/// Default per-dispatch execution budget before a bridge call is treated as
/// timed out.
pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a bridge successfully executing a work order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeOutcome {
    pub output: serde_json::Value,
}

/// A domain-specific executor.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Human-readable domain this bridge serves, e.g. `"chrome"`.
    fn domain(&self) -> &str;

    /// Execute the work order's action. Implementations should not panic;
    /// any error condition should be returned as `Err`.
    async fn execute(&self, work_order: &WorkOrder) -> Result<BridgeOutcome, BridgeError>;
}

/// A no-op bridge used in tests and as a template for new bridges.
pub struct EchoBridge {
    domain: String,
}

impl EchoBridge {
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self { domain: domain.into() }
    }
}

#[async_trait]
impl Bridge for EchoBridge {
    fn domain(&self) -> &str {
        &self.domain
    }

    async fn execute(&self, work_order: &WorkOrder) -> Result<BridgeOutcome, BridgeError> {
        Ok(BridgeOutcome {
            output: serde_json::json!({
                "echoed": work_order.payload(),
                "action_id": work_order.id().to_string(),
            }),
        })
    }
}

/// Registry of bridges keyed by normalized execution domain.
#[derive(Default)]
pub struct BridgeRegistry {
    bridges: RwLock<HashMap<String, std::sync::Arc<dyn Bridge>>>,
}

impl BridgeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bridge: std::sync::Arc<dyn Bridge>) {
        let mut bridges = self.bridges.write();
        bridges.insert(bridge.domain().to_owned(), bridge);
    }

    #[must_use]
    pub fn get(&self, domain: &ExecutionDomain) -> Option<std::sync::Arc<dyn Bridge>> {
        self.bridges.read().get(domain.as_str()).cloned()
    }
}

impl std::fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRegistry")
            .field("domains", &self.bridges.read().keys().cloned().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_order::{AuditBinding, AuditId, RiskLevel, WorkOrderId};

    fn sample_work_order(domain: &str) -> WorkOrder {
        WorkOrder::new(
            WorkOrderId::new(),
            "test",
            ExecutionDomain::new(domain),
            "applescript",
            serde_json::json!({"k": "v"}),
            RiskLevel::Low,
            AuditBinding {
                audit_id: AuditId::new("audit-1"),
                context_hash: "hash".to_owned(),
                authorized_at: chrono::Utc::now(),
                context_id: "ctx-1".to_owned(),
                source_hash: "src".to_owned(),
            },
            None,
        )
    }

    #[tokio::test]
    async fn echo_bridge_returns_payload() {
        let bridge = EchoBridge::new("chrome");
        let wo = sample_work_order("chrome");
        let outcome = bridge.execute(&wo).await.unwrap();
        assert_eq!(outcome.output["echoed"], serde_json::json!({"k": "v"}));
    }

    #[test]
    fn registry_lookup_by_domain() {
        let registry = BridgeRegistry::new();
        registry.register(std::sync::Arc::new(EchoBridge::new("chrome")));

        assert!(registry.get(&ExecutionDomain::new("chrome")).is_some());
        assert!(registry.get(&ExecutionDomain::new("excel")).is_none());
    }
}
