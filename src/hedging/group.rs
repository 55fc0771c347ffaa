//! Per-key race group.
//!
//! # States
//! - Open: accepts waiters and attempts
//! - Completed: terminal; the group's single outcome has been chosen
//!
//! # State Transitions
//! ```text
//! Open → Completed: try_complete() returns true (exactly once)
//! ```
//!
//! # Design Decisions
//! - The completion gate is an `AtomicBool` compare-exchange, so concurrent
//!   winners are arbitrated without the group lock
//! - Waiters, counters and recorded failures share one per-group mutex;
//!   `join` and `complete_all` are therefore mutually exclusive
//! - The all-failed gate closes while that mutex is held, so no attempt can be
//!   dispatched between the failure count check and completion
//! - A waiter joined after the gate closed is resolved on the spot instead of
//!   being queued behind an outcome that was already delivered

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::hedging::error::HedgeError;
use crate::hedging::key::RequestKey;
use crate::upstream::{UpstreamError, UpstreamResponse};

/// Per-group sequence number of an upstream attempt, starting at 1.
pub type AttemptNumber = u64;

/// What every waiter of a group eventually receives.
pub type Outcome = Result<UpstreamResponse, HedgeError>;

/// Single-assignment completion handle held on behalf of one caller.
#[derive(Debug)]
pub struct Waiter {
    tx: Option<oneshot::Sender<Outcome>>,
}

impl Waiter {
    /// Create a waiter and the receiver its caller awaits.
    pub fn channel() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Resolve the waiter. Returns `false` if it was already resolved.
    ///
    /// A caller that stopped listening still counts as resolved.
    pub fn resolve(&mut self, outcome: Outcome) -> bool {
        match self.tx.take() {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.is_none()
    }
}

#[derive(Debug, Default)]
struct GroupState {
    waiters: Vec<Waiter>,
    attempts_dispatched: u64,
    failures: HashMap<AttemptNumber, UpstreamError>,
    last_error: Option<UpstreamError>,
}

impl GroupState {
    fn next_attempt_number(&mut self) -> AttemptNumber {
        self.attempts_dispatched += 1;
        self.attempts_dispatched
    }
}

/// The waiters and attempt bookkeeping for one [`RequestKey`].
#[derive(Debug)]
pub struct RaceGroup {
    key: RequestKey,
    completed: AtomicBool,
    state: Mutex<GroupState>,
}

impl RaceGroup {
    pub fn new(key: RequestKey) -> Self {
        Self {
            key,
            completed: AtomicBool::new(false),
            state: Mutex::new(GroupState::default()),
        }
    }

    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    fn lock(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn hold_lock(&self) -> impl Sized + '_ {
        self.lock()
    }

    /// Join a waiter and allocate the attempt number its caller must dispatch.
    ///
    /// Returns `None` if the group has already completed; the waiter is then
    /// resolved with [`HedgeError::GroupCompleted`] and nothing is dispatched.
    pub fn join(&self, waiter: Waiter) -> Option<AttemptNumber> {
        match self.try_join(waiter) {
            Ok(attempt) => Some(attempt),
            Err(mut waiter) => {
                tracing::error!(key = %self.key, "Waiter joined a completed race group");
                waiter.resolve(Err(HedgeError::GroupCompleted));
                None
            }
        }
    }

    /// Join a waiter if the group is still open, handing it back otherwise.
    pub fn try_join(&self, waiter: Waiter) -> Result<AttemptNumber, Waiter> {
        let mut state = self.lock();
        if self.is_completed() {
            return Err(waiter);
        }
        state.waiters.push(waiter);
        Ok(state.next_attempt_number())
    }

    /// Close the completion gate. Returns `true` to exactly one caller.
    pub fn try_complete(&self) -> bool {
        self.completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Close the gate only if every dispatched attempt has failed.
    pub fn try_complete_if_all_failed(&self) -> bool {
        let state = self.lock();
        state.failures.len() as u64 >= state.attempts_dispatched && self.try_complete()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Resolve every joined waiter that is still pending with `outcome`.
    ///
    /// Returns the number of waiters resolved by this call.
    pub fn complete_all(&self, outcome: Outcome) -> usize {
        let mut state = self.lock();
        state
            .waiters
            .iter_mut()
            .filter(|waiter| !waiter.is_resolved())
            .map(|waiter| waiter.resolve(outcome.clone()))
            .filter(|resolved| *resolved)
            .count()
    }

    /// Store the error of a failed attempt.
    pub fn record_failure(&self, attempt: AttemptNumber, error: UpstreamError) {
        let mut state = self.lock();
        state.last_error = Some(error.clone());
        state.failures.insert(attempt, error);
    }

    /// True once every dispatched attempt has failed and no outcome was chosen.
    pub fn all_attempts_failed(&self) -> bool {
        let state = self.lock();
        state.failures.len() as u64 >= state.attempts_dispatched && !self.is_completed()
    }

    /// The most recently recorded attempt error.
    pub fn last_error(&self) -> Option<UpstreamError> {
        self.lock().last_error.clone()
    }

    pub fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn attempts_dispatched(&self) -> u64 {
        self.lock().attempts_dispatched
    }

    pub fn attempts_failed(&self) -> usize {
        self.lock().failures.len()
    }
}
