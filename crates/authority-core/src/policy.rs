//! Policy engine: rule-based blocking independent of quorum/lease outcomes.
//!
//! Built-in rules are always active. A [`PolicyConfig`] document lets an
//! operator add host allowlist entries or extra blocked patterns without
//! recompiling (`spec.md` §4.3). Evaluation is fail-closed: a panicking rule
//! blocks the action rather than silently passing it (`catch_unwind`).
//! Every regex match is bounded by an iteration cap and a wall-clock budget
//! so a pathological payload cannot stall policy evaluation.

use std::collections::{HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PolicyError, PolicyViolationDetail};
use crate::work_order::ExecutionDomain;

/// Matching budget per `spec.md` §4.3: bound regex iteration so a
/// pathological payload cannot stall policy evaluation.
const MATCH_ITERATION_CAP: usize = 1000;
const MATCH_WALL_CLOCK_CAP: Duration = Duration::from_millis(50);

const CACHE_CAPACITY: usize = 512;

fn bounded_match_count(re: &Regex, text: &str) -> usize {
    let start = Instant::now();
    let mut count = 0usize;
    for _ in re.find_iter(text) {
        count += 1;
        if count >= MATCH_ITERATION_CAP || start.elapsed() >= MATCH_WALL_CLOCK_CAP {
            break;
        }
    }
    count
}

fn bounded_captures<'t>(re: &Regex, text: &'t str) -> Vec<regex::Captures<'t>> {
    let start = Instant::now();
    let mut out = Vec::new();
    for cap in re.captures_iter(text) {
        out.push(cap);
        if out.len() >= MATCH_ITERATION_CAP || start.elapsed() >= MATCH_WALL_CLOCK_CAP {
            break;
        }
    }
    out
}

/// Severity of a policy violation. `Critical` and `High` block dispatch;
/// `Warn` is recorded but does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn is_blocking(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

/// The accumulated result of evaluating every active rule against a work
/// order's payload.
#[derive(Debug, Clone, Default)]
pub struct PolicyDecision {
    pub violations: Vec<PolicyViolationDetail>,
}

impl PolicyDecision {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.violations.iter().any(|v| v.severity.is_blocking())
    }
}

/// A single policy rule. Implementations must never rely on external state
/// that can change between calls with the same inputs, since decisions are
/// cached by `(domain, payload)`.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, domain: &ExecutionDomain, payload: &serde_json::Value) -> Option<(Severity, String)>;
}

static PII_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(
        r"(?i)\b[\w.+-]+@[\w-]+\.[a-z]{2,}\b|\b\d{3}-\d{2}-\d{4}\b|\b\d{16}\b|\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
    )
    .unwrap()
});

/// PII exposure: email, SSN, phone, or credit-card-shaped number. Always
/// `Critical` per `spec.md` §4.3.
struct PiiExposureRule;

impl Rule for PiiExposureRule {
    fn name(&self) -> &str {
        "pii_exposure"
    }

    fn evaluate(&self, _domain: &ExecutionDomain, payload: &serde_json::Value) -> Option<(Severity, String)> {
        let text = payload.to_string();
        if bounded_match_count(&PII_PATTERN, &text) > 0 {
            Some((Severity::Critical, "payload appears to contain personally identifiable information".to_owned()))
        } else {
            None
        }
    }
}

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#"(?i)\b(?:https?|wss?)://([^/\s"']+)"#).unwrap()
});

/// External API/WebSocket calls to non-loopback hosts. `High` per
/// `spec.md` §4.3. `allowed_hosts` extends the built-in loopback allowlist.
struct ExternalHostRule {
    allowed_hosts: Vec<String>,
}

impl ExternalHostRule {
    fn new(extra_allowed_hosts: &[String]) -> Self {
        let mut allowed_hosts = vec!["localhost".to_owned(), "127.0.0.1".to_owned(), "::1".to_owned()];
        allowed_hosts.extend(extra_allowed_hosts.iter().map(|h| h.trim().to_lowercase()));
        Self { allowed_hosts }
    }

    fn is_allowed(&self, host: &str) -> bool {
        let host = host.split(':').next().unwrap_or(host).to_lowercase();
        self.allowed_hosts.iter().any(|allowed| allowed == &host)
    }
}

impl Rule for ExternalHostRule {
    fn name(&self) -> &str {
        "external_host"
    }

    fn evaluate(&self, _domain: &ExecutionDomain, payload: &serde_json::Value) -> Option<(Severity, String)> {
        let text = payload.to_string();
        for captures in bounded_captures(&URL_PATTERN, &text) {
            if let Some(host) = captures.get(1) {
                if !self.is_allowed(host.as_str()) {
                    return Some((
                        Severity::High,
                        format!("payload references external host '{}'", host.as_str()),
                    ));
                }
            }
        }
        None
    }
}

static DESTRUCTIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(delete|drop|truncate|rm\s+-rf|format\s+disk)\b").unwrap()
});
static PRODUCTION_MARKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(prod|production|prd)\b").unwrap()
});

/// Destructive operation (DELETE/DROP/TRUNCATE, etc.) co-occurring with a
/// production marker. `Critical` per `spec.md` §4.3 — either alone is not
/// enough to trip this rule.
struct DestructiveOpRule;

impl Rule for DestructiveOpRule {
    fn name(&self) -> &str {
        "destructive_operation"
    }

    fn evaluate(&self, _domain: &ExecutionDomain, payload: &serde_json::Value) -> Option<(Severity, String)> {
        let text = payload.to_string();
        let destructive = bounded_match_count(&DESTRUCTIVE_PATTERN, &text) > 0;
        let production = bounded_match_count(&PRODUCTION_MARKER_PATTERN, &text) > 0;
        if destructive && production {
            Some((
                Severity::Critical,
                "destructive operation co-occurs with a production marker".to_owned(),
            ))
        } else {
            None
        }
    }
}

/// Warns (non-blocking) the first time a payload targets a domain that has
/// never been seen before in this engine's lifetime.
struct UnknownDomainRule {
    seen: Mutex<HashSet<String>>,
}

impl UnknownDomainRule {
    fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl Rule for UnknownDomainRule {
    fn name(&self) -> &str {
        "unknown_domain"
    }

    fn evaluate(&self, domain: &ExecutionDomain, _payload: &serde_json::Value) -> Option<(Severity, String)> {
        let mut seen = self.seen.lock();
        if seen.insert(domain.as_str().to_owned()) {
            Some((Severity::Warn, format!("first action ever seen for domain '{domain}'")))
        } else {
            None
        }
    }
}

/// A single operator-supplied pattern added through [`PolicyConfig`].
/// `High` severity: an operator chose to explicitly block this pattern.
struct CustomPatternRule {
    pattern: Regex,
    raw: String,
}

impl Rule for CustomPatternRule {
    fn name(&self) -> &str {
        "custom_pattern"
    }

    fn evaluate(&self, _domain: &ExecutionDomain, payload: &serde_json::Value) -> Option<(Severity, String)> {
        let text = payload.to_string();
        if bounded_match_count(&self.pattern, &text) > 0 {
            Some((Severity::High, format!("payload matched configured pattern '{}'", self.raw)))
        } else {
            None
        }
    }
}

/// A `serde`-deserializable document (JSON) letting an operator extend the
/// built-in rule set without recompiling, per `spec.md` §4.3. Hot reload
/// replaces the frozen config atomically and clears the decision cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Hostnames treated as loopback/internal in addition to
    /// `localhost`/`127.0.0.1`/`::1`.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Extra regex patterns that block dispatch (`High`) when matched,
    /// beyond the built-in PII/external-host/destructive-op rules.
    #[serde(default)]
    pub extra_blocked_patterns: Vec<String>,
}

/// Bounded FIFO decision cache keyed by `SHA-256(domain || payload)`.
/// Insertion-order eviction, not true LRU — matches the teacher's hand-rolled
/// bounded-cache texture rather than a third-party LRU crate.
struct DecisionCache {
    order: VecDeque<String>,
    entries: std::collections::HashMap<String, PolicyDecision>,
}

impl DecisionCache {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            entries: std::collections::HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<PolicyDecision> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, decision: PolicyDecision) {
        if self.entries.contains_key(&key) {
            return;
        }
        if self.order.len() >= CACHE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, decision);
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

fn cache_key(domain: &ExecutionDomain, payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_str().as_bytes());
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn default_rules(config: &PolicyConfig) -> Result<Vec<Box<dyn Rule>>, PolicyError> {
    let mut rules: Vec<Box<dyn Rule>> = vec![
        Box::new(PiiExposureRule),
        Box::new(ExternalHostRule::new(&config.allowed_hosts)),
        Box::new(DestructiveOpRule),
        Box::new(UnknownDomainRule::new()),
    ];

    for raw in &config.extra_blocked_patterns {
        let pattern = Regex::new(raw).map_err(|err| PolicyError::InvalidConfig {
            detail: format!("invalid pattern '{raw}': {err}"),
        })?;
        rules.push(Box::new(CustomPatternRule {
            pattern,
            raw: raw.clone(),
        }));
    }

    Ok(rules)
}

/// Evaluates every active rule against a work order's domain and payload,
/// caching decisions and failing closed on any rule panic.
pub struct PolicyEngine {
    rules: Mutex<Option<Vec<Box<dyn Rule>>>>,
    cache: Mutex<DecisionCache>,
}

impl PolicyEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(None),
            cache: Mutex::new(DecisionCache::new()),
        }
    }

    /// Build the engine's rule set from `config`. May only be called once;
    /// use [`PolicyEngine::reload`] to replace a live configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::AlreadyInitialized`] if called twice, or
    /// [`PolicyError::InvalidConfig`] if `config` contains an invalid regex.
    pub fn initialize(&self, config: PolicyConfig) -> Result<(), PolicyError> {
        let mut rules = self.rules.lock();
        if rules.is_some() {
            return Err(PolicyError::AlreadyInitialized);
        }
        *rules = Some(default_rules(&config)?);
        Ok(())
    }

    /// Atomically replace the frozen configuration and clear the decision
    /// cache. Rejects re-initialization of an engine that was never
    /// initialized.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::NotInitialized`] if `initialize` was never
    /// called, or [`PolicyError::InvalidConfig`] if `config` is invalid.
    pub fn reload(&self, config: PolicyConfig) -> Result<(), PolicyError> {
        let mut rules = self.rules.lock();
        if rules.is_none() {
            return Err(PolicyError::NotInitialized);
        }
        *rules = Some(default_rules(&config)?);
        self.cache.lock().clear();
        Ok(())
    }

    /// Evaluate `payload` against `domain`, consulting and updating the
    /// decision cache. A panicking rule causes the whole decision to fail
    /// closed (recorded as a `PolicyEngineError`).
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::NotInitialized`] if the engine has not been
    /// initialized, or [`PolicyError::PolicyEngineError`] if a rule panics.
    pub fn evaluate(&self, domain: &ExecutionDomain, payload: &serde_json::Value) -> Result<PolicyDecision, PolicyError> {
        let key = cache_key(domain, payload);
        if let Some(cached) = self.cache.lock().get(&key) {
            return Ok(cached);
        }

        let rules = self.rules.lock();
        let rules = rules.as_ref().ok_or(PolicyError::NotInitialized)?;

        let mut violations = Vec::new();
        for rule in rules.iter() {
            let rule_name = rule.name().to_owned();
            let result = catch_unwind(AssertUnwindSafe(|| rule.evaluate(domain, payload)));
            match result {
                Ok(Some((severity, detail))) => violations.push(PolicyViolationDetail {
                    rule: rule_name,
                    severity,
                    detail,
                }),
                Ok(None) => {}
                Err(_) => {
                    return Err(PolicyError::PolicyEngineError {
                        inner: format!("rule '{rule_name}' panicked during evaluation"),
                    });
                }
            }
        }

        let decision = PolicyDecision { violations };
        self.cache.lock().insert(key, decision.clone());
        Ok(decision)
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("initialized", &self.rules.lock().is_some())
            .finish_non_exhaustive()
    }
}
