//! The Authority FSM: the single path by which a proposed action acquires
//! the right to produce a [`crate::work_order::WorkOrder`].
//!
//! States and transitions are per `spec.md` §4.1's transition matrix:
//!
//! ```text
//! GENERATED --SHOW--> VISIBLE_GHOST
//! VISIBLE_GHOST --HOLD_START--> VISIBLE_GHOST (begins timing, idempotent)
//! VISIBLE_GHOST --HOLD_END (<400ms)--> VISIBLE_GHOST
//! VISIBLE_GHOST --HOLD_TIMEOUT (>=400ms)--> PREVIEW_ARMED
//! PREVIEW_ARMED --CONFIRM--> CONFIRM_READY
//! PREVIEW_ARMED --HOLD_END--> VISIBLE_GHOST (abort)
//! CONFIRM_READY --CONFIRM--> EXECUTED
//! any non-terminal --EXPIRE--> EXPIRED
//! any non-terminal --REJECT--> REJECTED
//! ```
//!
//! All transition methods are synchronous — the FSM never `.await`s.
//! Timing is read through an injectable [`Clock`] so hold-gate invariants
//! can be tested without real sleeps. There is no internal timer callback:
//! `HOLD_TIMEOUT`/`HOLD_END` are only realized when the owner reports them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::AuthorizationError;

/// Minimum continuous hold required to arm an action — `spec.md` §4.1's
/// structural, non-configurable 400 ms constant.
pub const HOLD_DURATION: Duration = Duration::from_millis(400);

/// A source of monotonic time, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock backed by `Instant::now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A test clock whose reading advances only when told to.
#[derive(Debug)]
pub struct FakeClock {
    now: Mutex<Instant>,
}

impl FakeClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// States of the Authority FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Generated,
    VisibleGhost,
    PreviewArmed,
    ConfirmReady,
    Executed,
    Expired,
    Rejected,
}

impl State {
    /// Terminal states accept no further events.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Executed | State::Expired | State::Rejected)
    }
}

/// Events accepted by the FSM's `advance` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Reveal a freshly generated proposal.
    Show,
    /// Begin (or idempotently continue) timing a hold gesture.
    HoldStart,
    /// The owner released the hold before the 400 ms threshold elapsed
    /// (from `VISIBLE_GHOST`), or aborts an armed preview back to
    /// `VISIBLE_GHOST` unconditionally (from `PREVIEW_ARMED`).
    HoldEnd,
    /// The owner released the hold at or after the 400 ms threshold.
    HoldTimeout,
    /// Confirm the action; the second `Confirm` from `CONFIRM_READY`
    /// executes it.
    Confirm,
    /// The bound action context was invalidated (or a generic expiry).
    Expire,
    /// The action was explicitly rejected.
    Reject,
}

/// One row of the FSM's transition history, used for forensic export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: State,
    pub to: State,
    pub event: String,
}

/// A single proposal's finite state machine.
pub struct AuthorityFsm {
    state: RwLock<State>,
    history: Mutex<Vec<TransitionRecord>>,
    context_id: String,
    hold_started_at: Mutex<Option<Instant>>,
    realized_hold_ms: Mutex<Option<u64>>,
}

impl AuthorityFsm {
    #[must_use]
    pub fn new(_clock: &dyn Clock, context_id: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(State::Generated),
            history: Mutex::new(Vec::new()),
            context_id: context_id.into(),
            hold_started_at: Mutex::new(None),
            realized_hold_ms: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        *self.state.read()
    }

    #[must_use]
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    #[must_use]
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history.lock().clone()
    }

    /// The realized hold duration in milliseconds, set the moment
    /// `HOLD_END`/`HOLD_TIMEOUT` is consumed from `VISIBLE_GHOST`. `None`
    /// until that happens.
    #[must_use]
    pub fn hold_duration_ms(&self) -> Option<u64> {
        *self.realized_hold_ms.lock()
    }

    fn record_transition(&self, from: State, to: State, event: Event) {
        let mut history = self.history.lock();
        history.push(TransitionRecord {
            from,
            to,
            event: format!("{event:?}"),
        });
    }

    /// Drive the FSM with `event`, given the current binder context id.
    ///
    /// If `current_context_id` does not match the context this FSM was
    /// created under, the FSM is forced to `EXPIRED` and
    /// [`AuthorizationError::ContextInvalidated`] is returned, regardless of
    /// which event was requested.
    pub fn advance(&self, event: Event, clock: &dyn Clock, current_context_id: &str) -> Result<State, AuthorizationError> {
        let mut state = self.state.write();

        if state.is_terminal() {
            return Err(AuthorizationError::TerminalState);
        }

        if current_context_id != self.context_id {
            let from = *state;
            *state = State::Expired;
            drop(state);
            self.record_transition(from, State::Expired, Event::Expire);
            return Err(AuthorizationError::ContextInvalidated);
        }

        let next = match (*state, event) {
            (State::Generated, Event::Show) => State::VisibleGhost,

            (State::VisibleGhost, Event::HoldStart) => {
                let mut started = self.hold_started_at.lock();
                if started.is_none() {
                    *started = Some(clock.now());
                }
                State::VisibleGhost
            }

            (State::VisibleGhost, Event::HoldEnd) => {
                let elapsed = self.elapsed_hold(clock);
                if elapsed >= HOLD_DURATION {
                    return Err(AuthorizationError::ForbiddenTransition);
                }
                *self.hold_started_at.lock() = None;
                State::VisibleGhost
            }

            (State::VisibleGhost, Event::HoldTimeout) => {
                let elapsed = self.elapsed_hold(clock);
                if elapsed < HOLD_DURATION {
                    return Err(AuthorizationError::ForbiddenTransition);
                }
                #[allow(clippy::cast_possible_truncation)]
                let elapsed_ms = elapsed.as_millis() as u64;
                *self.realized_hold_ms.lock() = Some(elapsed_ms);
                State::PreviewArmed
            }

            (State::PreviewArmed, Event::Confirm) => State::ConfirmReady,
            (State::PreviewArmed, Event::HoldEnd) => {
                *self.hold_started_at.lock() = None;
                State::VisibleGhost
            }

            (State::ConfirmReady, Event::Confirm) => State::Executed,

            (_, Event::Expire) => State::Expired,
            (_, Event::Reject) => State::Rejected,

            _ => return Err(AuthorizationError::ForbiddenTransition),
        };

        let from = *state;
        *state = next;
        drop(state);
        self.record_transition(from, next, event);
        Ok(next)
    }

    fn elapsed_hold(&self, clock: &dyn Clock) -> Duration {
        match *self.hold_started_at.lock() {
            Some(started_at) => clock.now().duration_since(started_at),
            None => Duration::ZERO,
        }
    }
}

impl std::fmt::Debug for AuthorityFsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityFsm")
            .field("state", &self.state())
            .field("context_id", &self.context_id)
            .finish_non_exhaustive()
    }
}

/// Owns the set of live FSMs keyed by work order id, and expires every FSM
/// bound to an invalidated context in one sweep.
#[derive(Default)]
pub struct FsmRegistry {
    fsms: RwLock<HashMap<String, Arc<AuthorityFsm>>>,
}

impl FsmRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, action_id: impl Into<String>, fsm: Arc<AuthorityFsm>) {
        self.fsms.write().insert(action_id.into(), fsm);
    }

    #[must_use]
    pub fn get(&self, action_id: &str) -> Option<Arc<AuthorityFsm>> {
        self.fsms.read().get(action_id).cloned()
    }

    /// Force every FSM bound to `context_id` into `EXPIRED`. Returns the
    /// number of FSMs expired.
    pub fn expire_context(&self, context_id: &str, clock: &dyn Clock) -> usize {
        let fsms = self.fsms.read();
        let mut count = 0;
        for fsm in fsms.values() {
            if fsm.context_id() == context_id && !fsm.state().is_terminal() {
                // advance() with a mismatched context id is exactly the
                // expiry path; pass a sentinel that never matches.
                let _ = fsm.advance(Event::Expire, clock, "__expired__");
                count += 1;
            }
        }
        count
    }
}

impl std::fmt::Debug for FsmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsmRegistry")
            .field("count", &self.fsms.read().len())
            .finish_non_exhaustive()
    }
}
