//! Footprint capture sessions
//!
//! A [`CaptureSession`] is the accumulation target an executor reports into
//! while tracing is armed. It holds two append-only sinks, one for observed
//! values and one for call records, plus a [`StepClock`]. Each observation is
//! stamped with the clock's current step when it is appended.
//!
//! Sessions do no deduplication; that is deferred to
//! [`combine`](crate::footprint::combine). Appending is linear in the number
//! of events.

use crate::fingerprint::{Observable, ObservedValue};
use crate::footprint::{CallKind, CallRecord, Footprint, Observation};
use crate::step_clock::StepClock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Live recording region
#[derive(Debug, Default)]
pub struct CaptureSession {
    observations: Mutex<Vec<Observation>>,
    calls: Mutex<Vec<CallRecord>>,
    clock: StepClock,
    closed: AtomicBool,
}

// Buffers are append-only, so a panic while holding a lock leaves them usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session ready to be shared with an executor
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Advance the step counter by one
    pub fn tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Current step
    pub fn step(&self) -> u64 {
        self.clock.now()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Append a value stamped with the current step
    ///
    /// Returns `false` if the session is already closed.
    pub fn observe<T: Observable>(&self, value: T) -> bool {
        self.observe_shared(Arc::new(value))
    }

    /// Append an already shared value stamped with the current step
    pub fn observe_shared(&self, value: ObservedValue) -> bool {
        if self.rejects(&value) {
            return false;
        }
        let mut observations = lock(&self.observations);
        observations.push(Observation::new(value, self.clock.now()));
        true
    }

    /// Append a value at `step`, moving the clock forward to it first
    ///
    /// A step behind the clock is stamped with the clock's current step
    /// instead, so timestamps never go backwards.
    pub fn observe_at(&self, value: ObservedValue, step: u64) -> bool {
        if self.rejects(&value) {
            return false;
        }
        let mut observations = lock(&self.observations);
        let timestamp = self.clock.advance_to(step);
        observations.push(Observation::new(value, timestamp));
        true
    }

    /// Append a call record
    pub fn record_call(&self, qualified_name: impl Into<String>, kind: CallKind) -> bool {
        if self.is_closed() {
            tracing::warn!("call record offered to a closed capture session, dropped");
            return false;
        }
        lock(&self.calls).push(CallRecord::new(qualified_name, kind));
        true
    }

    fn rejects(&self, value: &ObservedValue) -> bool {
        if self.is_closed() {
            tracing::warn!(
                "observation of {} offered to a closed capture session, dropped",
                (**value).type_name()
            );
            return true;
        }
        false
    }

    /// Number of observations recorded so far
    pub fn len(&self) -> usize {
        lock(&self.observations).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the session and build its footprint
    ///
    /// The footprint spans the final step of the clock. Closing twice yields
    /// an empty footprint the second time, since the buffers were drained.
    pub fn close(&self) -> Footprint {
        self.closed.store(true, Ordering::SeqCst);

        let observations = std::mem::take(&mut *lock(&self.observations));
        let calls = std::mem::take(&mut *lock(&self.calls));

        Footprint::from_parts(observations, calls, self.clock.now())
    }
}
