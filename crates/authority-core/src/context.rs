//! Context binding: ownership of the "current operational context" for the
//! host, and invalidation of stale actions when it changes.
//!
//! An [`ActionContext`] is immutable: created at FSM birth, destroyed with
//! the FSM, never mutated. [`ContextBinder`] owns the process-wide current
//! context plus any per-session overrides, and produces the set of context
//! ids invalidated by a switch so the owning [`crate::fsm::FsmRegistry`]
//! can expire the FSMs bound to them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The immutable tuple identifying the operational context an action was
/// authorized against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub context_id: String,
    pub timestamp: DateTime<Utc>,
    pub source_hash: String,
}

impl ActionContext {
    #[must_use]
    pub fn new(context_id: impl Into<String>, source_hash: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            timestamp: Utc::now(),
            source_hash: source_hash.into(),
        }
    }

    /// Two contexts are interchangeable for switch purposes when both the
    /// id and source hash agree — `spec.md` §4.2's no-op switch condition.
    #[must_use]
    fn same_identity(&self, other: &ActionContext) -> bool {
        self.context_id == other.context_id && self.source_hash == other.source_hash
    }
}

/// Owns the "current operational context" for the host (or, per session,
/// for a set of concurrently-bound sessions).
pub struct ContextBinder {
    process_wide: Mutex<Option<ActionContext>>,
    per_session: Mutex<HashMap<String, ActionContext>>,
}

impl ContextBinder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            process_wide: Mutex::new(None),
            per_session: Mutex::new(HashMap::new()),
        }
    }

    /// Bind the process-wide current context, replacing whatever was bound
    /// before without running the no-op/invalidation logic of
    /// [`switch_context`](ContextBinder::switch_context). Used for initial
    /// binding at startup.
    pub fn bind(&self, context: ActionContext) {
        let mut current = self.process_wide.lock();
        tracing::info!(context_id = %context.context_id, "context bound");
        *current = Some(context);
    }

    /// Bind a context scoped to a specific session id.
    pub fn bind_session(&self, session_id: impl Into<String>, context: ActionContext) {
        let mut sessions = self.per_session.lock();
        sessions.insert(session_id.into(), context);
    }

    /// Switch the process-wide current context. Returns the previously
    /// bound context id if the switch was not a no-op (i.e. every FSM bound
    /// to that id must now be treated as invalid), or `None` if the new
    /// context has the same `(context_id, source_hash)` identity as the
    /// current one.
    pub fn switch_context(&self, new_context: ActionContext) -> Option<String> {
        let mut current = self.process_wide.lock();

        let invalidated = match current.as_ref() {
            Some(existing) if existing.same_identity(&new_context) => None,
            Some(existing) => Some(existing.context_id.clone()),
            None => None,
        };

        tracing::info!(
            new_context_id = %new_context.context_id,
            invalidated = invalidated.is_some(),
            "context switch"
        );
        *current = Some(new_context);
        invalidated
    }

    /// Current process-wide context, if bound.
    #[must_use]
    pub fn current(&self) -> Option<ActionContext> {
        self.process_wide.lock().clone()
    }

    /// Validate that `context_id` matches the currently bound context
    /// (process-wide, or the session's override if `session_id` is given).
    #[must_use]
    pub fn validate_action(&self, context_id: &str, session_id: Option<&str>) -> bool {
        if let Some(session_id) = session_id {
            let sessions = self.per_session.lock();
            if let Some(bound) = sessions.get(session_id) {
                return bound.context_id == context_id;
            }
        }
        let current = self.process_wide.lock();
        current
            .as_ref()
            .is_some_and(|c| c.context_id == context_id)
    }
}

impl Default for ContextBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBinder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_to_identical_identity_is_noop() {
        let binder = ContextBinder::new();
        binder.bind(ActionContext::new("ctx-1", "hash-a"));

        let invalidated = binder.switch_context(ActionContext::new("ctx-1", "hash-a"));
        assert_eq!(invalidated, None);
    }

    #[test]
    fn switching_to_new_identity_invalidates_old_context() {
        let binder = ContextBinder::new();
        binder.bind(ActionContext::new("ctx-1", "hash-a"));

        let invalidated = binder.switch_context(ActionContext::new("ctx-2", "hash-b"));
        assert_eq!(invalidated, Some("ctx-1".to_owned()));
        assert_eq!(binder.current().unwrap().context_id, "ctx-2");
    }

    #[test]
    fn same_id_different_source_hash_is_not_noop() {
        let binder = ContextBinder::new();
        binder.bind(ActionContext::new("ctx-1", "hash-a"));

        let invalidated = binder.switch_context(ActionContext::new("ctx-1", "hash-b"));
        assert_eq!(invalidated, Some("ctx-1".to_owned()));
    }

    #[test]
    fn validate_action_checks_session_override_first() {
        let binder = ContextBinder::new();
        binder.bind(ActionContext::new("global-ctx", "hash-a"));
        binder.bind_session("session-a", ActionContext::new("session-ctx", "hash-b"));

        assert!(binder.validate_action("session-ctx", Some("session-a")));
        assert!(!binder.validate_action("global-ctx", Some("session-a")));
        assert!(binder.validate_action("global-ctx", None));
    }
}
