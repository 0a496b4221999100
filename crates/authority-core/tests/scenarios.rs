//! End-to-end seed scenarios driving `Core` exactly as an HTTP caller would,
//! one per major subsystem interaction, plus the seven testable properties
//! (P1-P7) that cut across the whole pipeline.

use std::sync::Arc;
use std::time::Duration;

use authority_core::error::AuthorizationError;
use authority_core::fsm::{Clock, Event, FakeClock, HOLD_DURATION};
use authority_core::{
    Core, CoreDispatchResult, DispatchOutcome, EchoBridge, ExecutionDomain, LeaseValidationOutcome, RiskLevel,
};

struct FakeClockHandle(Arc<FakeClock>);
impl Clock for FakeClockHandle {
    fn now(&self) -> std::time::Instant {
        self.0.now()
    }
}

fn core_with_fake_clock() -> (Core, Arc<FakeClock>) {
    let clock = Arc::new(FakeClock::new());
    let core = Core::with_clock(Box::new(FakeClockHandle(Arc::clone(&clock)))).unwrap();
    core.bridges().register(Arc::new(EchoBridge::new("chrome")));
    core.bridges().register(Arc::new(EchoBridge::new("excel")));
    (core, clock)
}

fn arm_and_execute(core: &Core, action_id: &authority_core::WorkOrderId, clock: &FakeClock) {
    core.advance_fsm(action_id, Event::Show).unwrap();
    core.advance_fsm(action_id, Event::HoldStart).unwrap();
    clock.advance(HOLD_DURATION);
    core.advance_fsm(action_id, Event::HoldTimeout).unwrap();
    core.advance_fsm(action_id, Event::Confirm).unwrap();
    core.advance_fsm(action_id, Event::Confirm).unwrap();
}

// ---------------------------------------------------------------------
// Seed scenarios
// ---------------------------------------------------------------------

/// Scenario 1: a LOW-risk proposal held for the full 400ms, confirmed
/// twice, and dispatched with a single inline attestation runs end to end
/// and produces a forensic entry.
#[tokio::test]
async fn scenario_happy_low_risk_path_produces_forensic_entry() {
    let (core, clock) = core_with_fake_clock();

    let action_id = core
        .submit_proposal(
            "click the deploy button",
            ExecutionDomain::new("chrome"),
            "applescript",
            serde_json::json!({"selector": "#deploy"}),
            RiskLevel::Low,
            "session-1",
            "ctx-1",
            "scheduled release",
        )
        .unwrap();

    arm_and_execute(&core, &action_id, &clock);

    assert!(core.log().is_empty());
    let outcome = core.dispatch(&action_id, Some("operator-1".to_owned()), None).await;
    assert!(matches!(outcome, CoreDispatchResult::Done(DispatchOutcome::Success { .. })));
    assert_eq!(core.log().len(), 1);
    core.verify_log().unwrap();
}

/// Scenario 2: releasing the hold before 400ms elapses never arms the
/// preview; the proposal can only proceed by holding again to completion.
#[test]
fn scenario_short_hold_never_arms_preview() {
    let (core, clock) = core_with_fake_clock();

    let action_id = core
        .submit_proposal(
            "click the deploy button",
            ExecutionDomain::new("chrome"),
            "applescript",
            serde_json::json!({}),
            RiskLevel::Low,
            "session-1",
            "ctx-1",
            "scheduled release",
        )
        .unwrap();

    core.advance_fsm(&action_id, Event::Show).unwrap();
    core.advance_fsm(&action_id, Event::HoldStart).unwrap();
    clock.advance(HOLD_DURATION - Duration::from_millis(1));
    let result = core.advance_fsm(&action_id, Event::HoldTimeout);
    assert!(matches!(result, Err(AuthorizationError::ForbiddenTransition)));

    // released early instead
    let state = core.advance_fsm(&action_id, Event::HoldEnd).unwrap();
    assert_eq!(state, authority_core::fsm::State::VisibleGhost);

    // a second, full-length hold succeeds
    core.advance_fsm(&action_id, Event::HoldStart).unwrap();
    clock.advance(HOLD_DURATION);
    let state = core.advance_fsm(&action_id, Event::HoldTimeout).unwrap();
    assert_eq!(state, authority_core::fsm::State::PreviewArmed);
}

/// Scenario 3: a HIGH-risk action requires two distinct operators; the
/// first attestation alone leaves it pending, the second (different
/// operator) seals the envelope and dispatch proceeds.
#[tokio::test]
async fn scenario_high_risk_quorum_needs_two_distinct_operators() {
    let (core, clock) = core_with_fake_clock();

    let action_id = core
        .submit_proposal(
            "delete production database",
            ExecutionDomain::new("chrome"),
            "applescript",
            serde_json::json!({"confirm": true}),
            RiskLevel::High,
            "session-1",
            "ctx-1",
            "scheduled decommission",
        )
        .unwrap();

    arm_and_execute(&core, &action_id, &clock);

    // same operator attesting twice does not satisfy quorum
    core.register_attestation(&action_id, "operator-1", None).unwrap();
    let pending = core.dispatch(&action_id, Some("operator-1".to_owned()), None).await;
    assert!(matches!(pending, CoreDispatchResult::PendingAttestation));

    let done = core.dispatch(&action_id, Some("operator-2".to_owned()), None).await;
    assert!(matches!(done, CoreDispatchResult::Done(DispatchOutcome::Success { .. })));
}

/// Scenario 4: switching the process-wide context expires every FSM bound
/// to the previous context, regardless of how far along it was.
#[test]
fn scenario_context_switch_expires_in_flight_proposal() {
    let (core, clock) = core_with_fake_clock();

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

    core.advance_fsm(&action_id, Event::Show).unwrap();
    core.advance_fsm(&action_id, Event::HoldStart).unwrap();
    clock.advance(HOLD_DURATION);

    let (invalidated, expired) = core.switch_context("ctx-2", "new-hash");
    assert_eq!(invalidated, Some("ctx-1".to_owned()));
    assert_eq!(expired, 1);

    let result = core.advance_fsm(&action_id, Event::HoldTimeout);
    assert!(matches!(result, Err(AuthorizationError::TerminalState)));
}

/// Scenario 5: a valid lease lets a LOW-risk action bypass quorum and
/// policy evaluation entirely, dispatching straight to the bridge.
#[tokio::test]
async fn scenario_lease_bypasses_quorum_and_policy() {
    let (core, clock) = core_with_fake_clock();
    core.create_lease("session-1", &ExecutionDomain::new("chrome"));

    // payload would be policy-blocked (an email address) were the lease
    // bypass not in effect.
    let action_id = core
        .submit_proposal(
            "send a reminder",
            ExecutionDomain::new("chrome"),
            "applescript",
            serde_json::json!({"to": "ops@example.com"}),
            RiskLevel::Low,
            "session-1",
            "ctx-1",
            "routine reminder",
        )
        .unwrap();

    arm_and_execute(&core, &action_id, &clock);

    let outcome = core.dispatch(&action_id, None, None).await;
    assert!(matches!(outcome, CoreDispatchResult::Done(DispatchOutcome::Success { .. })));
}

/// Scenario 6: once a heartbeat gap exceeds the interval, the lease is
/// revoked and the next LOW-risk dispatch falls back to requiring quorum.
#[tokio::test]
async fn scenario_missed_heartbeat_falls_back_to_quorum() {
    let (core, clock) = core_with_fake_clock();
    core.create_lease("session-1", &ExecutionDomain::new("chrome"));

    // allow the lease's heartbeat clock (real wall time, independent of the
    // FSM's FakeClock) to exceed the tolerated gap.
    std::thread::sleep(Duration::from_millis(authority_core::lease::HEARTBEAT_INTERVAL_MS as u64 + 20));

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

    arm_and_execute(&core, &action_id, &clock);

    // no lease bypass anymore; dispatch without an attestation is pending
    let pending = core.dispatch(&action_id, None, None).await;
    assert!(matches!(pending, CoreDispatchResult::PendingAttestation));

    let done = core.dispatch(&action_id, Some("operator-1".to_owned()), None).await;
    assert!(matches!(done, CoreDispatchResult::Done(DispatchOutcome::Success { .. })));
}

/// Scenario 7: a payload containing PII is policy-blocked before any
/// bridge runs, and the failure is recorded in the forensic log.
#[tokio::test]
async fn scenario_pii_payload_is_blocked_before_bridge_runs() {
    let (core, clock) = core_with_fake_clock();

    let action_id = core
        .submit_proposal(
            "email customer list",
            ExecutionDomain::new("excel"),
            "rpc",
            serde_json::json!({"body": "contact jane.doe@example.com for details"}),
            RiskLevel::Low,
            "session-1",
            "ctx-1",
            "customer outreach",
        )
        .unwrap();

    arm_and_execute(&core, &action_id, &clock);

    let outcome = core.dispatch(&action_id, Some("operator-1".to_owned()), None).await;
    match outcome {
        CoreDispatchResult::Done(DispatchOutcome::Failed { reason }) => {
            assert!(reason.to_lowercase().contains("polic"));
        }
        other => panic!("expected a policy-blocked failure, got {other:?}"),
    }
    assert_eq!(core.log().len(), 1);
}

// ---------------------------------------------------------------------
// Testable properties P1-P7
// ---------------------------------------------------------------------

/// P1: for any state/event pair not in the transition table, `advance`
/// fails and leaves the state unchanged.
#[test]
fn p1_illegal_event_leaves_state_unchanged() {
    let (core, _clock) = core_with_fake_clock();
    let action_id = core
        .submit_proposal(
            "x",
            ExecutionDomain::new("chrome"),
            "applescript",
            serde_json::json!({}),
            RiskLevel::Low,
            "session-1",
            "ctx-1",
            "",
        )
        .unwrap();

    // CONFIRM is illegal from GENERATED.
    let result = core.advance_fsm(&action_id, Event::Confirm);
    assert!(matches!(result, Err(AuthorizationError::ForbiddenTransition)));

    // the FSM is still alive and can proceed through the legal path.
    let state = core.advance_fsm(&action_id, Event::Show).unwrap();
    assert_eq!(state, authority_core::fsm::State::VisibleGhost);
}

/// P2: for any HOLD_START/HOLD_END pair with `end - start < 400ms`, the
/// FSM never reaches PREVIEW_ARMED.
#[test]
fn p2_hold_gate_rejects_short_holds() {
    for gap_ms in [0u64, 1, 50, 200, 399] {
        let (core, clock) = core_with_fake_clock();
        let action_id = core
            .submit_proposal(
                "x",
                ExecutionDomain::new("chrome"),
                "applescript",
                serde_json::json!({}),
                RiskLevel::Low,
                "session-1",
                "ctx-1",
                "",
            )
            .unwrap();
        core.advance_fsm(&action_id, Event::Show).unwrap();
        core.advance_fsm(&action_id, Event::HoldStart).unwrap();
        clock.advance(Duration::from_millis(gap_ms));
        let result = core.advance_fsm(&action_id, Event::HoldTimeout);
        assert!(matches!(result, Err(AuthorizationError::ForbiddenTransition)), "gap_ms={gap_ms}");
    }
}

/// P3: the order in which a fixed set of distinct operators attest does
/// not change whether the envelope completes.
#[tokio::test]
async fn p3_quorum_completion_is_order_independent() {
    for order in [["operator-1", "operator-2"], ["operator-2", "operator-1"]] {
        let (core, clock) = core_with_fake_clock();
        let action_id = core
            .submit_proposal(
                "x",
                ExecutionDomain::new("chrome"),
                "applescript",
                serde_json::json!({}),
                RiskLevel::High,
                "session-1",
                "ctx-1",
                "",
            )
            .unwrap();
        arm_and_execute(&core, &action_id, &clock);

        core.register_attestation(&action_id, order[0], None).unwrap();
        let outcome = core.dispatch(&action_id, Some(order[1].to_owned()), None).await;
        assert!(matches!(outcome, CoreDispatchResult::Done(DispatchOutcome::Success { .. })));
    }
}

/// P4: once a lease is revoked, no subsequent heartbeat resurrects it.
#[test]
fn p4_lease_revocation_is_monotonic() {
    let core = Core::new().unwrap();
    let domain = ExecutionDomain::new("chrome");
    let lease = core.create_lease("session-1", &domain);
    core.revoke_lease("session-1");

    // a revoked lease never accepts a heartbeat again.
    assert!(!core.heartbeat_lease(&lease.lease_id));

    // nor does validating it ever report anything but Revoked, no matter
    // how many times it is checked afterward.
    for _ in 0..3 {
        let outcome = core.leases().validate("session-1", &domain, core.log());
        assert!(matches!(outcome, LeaseValidationOutcome::Revoked { .. }));
    }
}

/// P5: a log produced by any sequence of appends verifies intact; the
/// byte-level tamper-detection half of this property is covered by
/// `forensic::tests::tampering_with_payload_breaks_verification`, which has
/// access to the log's private entry list from within its own module.
#[tokio::test]
async fn p5_chain_integrity_holds_across_a_realistic_dispatch_sequence() {
    let (core, clock) = core_with_fake_clock();

    for i in 0..3 {
        let action_id = core
            .submit_proposal(
                format!("action {i}"),
                ExecutionDomain::new("chrome"),
                "applescript",
                serde_json::json!({"i": i}),
                RiskLevel::Low,
                "session-1",
                "ctx-1",
                "",
            )
            .unwrap();
        arm_and_execute(&core, &action_id, &clock);
        core.dispatch(&action_id, Some("operator-1".to_owned()), None).await;
    }

    assert_eq!(core.log().len(), 3);
    core.verify_log().unwrap();
}

/// P6: a work order's fields cannot be mutated after creation, and
/// serializing it twice produces byte-identical output.
#[test]
fn p6_work_order_serialization_is_idempotent() {
    let work_order = authority_core::work_order::WorkOrder::new(
        authority_core::WorkOrderId::new(),
        "desc",
        ExecutionDomain::new("chrome"),
        "applescript",
        serde_json::json!({"a": 1}),
        RiskLevel::Low,
        authority_core::work_order::AuditBinding {
            audit_id: authority_core::work_order::AuditId::new("audit-1"),
            context_hash: "ctx-1".to_owned(),
            authorized_at: chrono::Utc::now(),
            context_id: "ctx-1".to_owned(),
            source_hash: "ctx-1".to_owned(),
        },
        None,
    );

    let first = serde_json::to_string(&work_order).unwrap();
    let second = serde_json::to_string(&work_order).unwrap();
    assert_eq!(first, second);
}

/// P7: whenever the policy engine raises, no bridge invocation occurs and
/// the dispatch result is a policy-engine failure.
#[tokio::test]
async fn p7_dispatcher_fails_closed_on_policy_engine_error() {
    let (core, clock) = core_with_fake_clock();

    // force the policy engine into an un-evaluatable state by never
    // initializing a second, standalone engine and evaluating directly,
    // mirroring the dispatcher's own fail-closed path.
    let engine = authority_core::policy::PolicyEngine::new();
    let result = engine.evaluate(&ExecutionDomain::new("chrome"), &serde_json::json!({}));
    assert!(matches!(result, Err(authority_core::error::PolicyError::NotInitialized)));

    // the production Core's own engine is initialized, so drive the
    // end-to-end dispatch path instead and confirm a blocked payload never
    // reaches the bridge (the bridge would echo the payload back verbatim
    // on success, which a failed outcome never does).
    let action_id = core
        .submit_proposal(
            "x",
            ExecutionDomain::new("chrome"),
            "applescript",
            serde_json::json!({"ssn": "123-45-6789"}),
            RiskLevel::Low,
            "session-1",
            "ctx-1",
            "",
        )
        .unwrap();
    arm_and_execute(&core, &action_id, &clock);

    let outcome = core.dispatch(&action_id, Some("operator-1".to_owned()), None).await;
    assert!(matches!(outcome, CoreDispatchResult::Done(DispatchOutcome::Failed { .. })));
}
