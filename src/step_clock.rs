//! Logical step counter for capture sessions
//!
//! Observations are ordered by execution steps, not wall-clock time. The
//! executor advances the clock once per traced event (a line executed, a call
//! entered) and every observation is stamped with the clock's value at the
//! moment it is appended.
//!
//! ```text
//! executor event   tick()      observe(v)
//!      │             │             │
//!      ▼             ▼             ▼
//!   step 0 ──────► step 1 ─────► (v, 1)
//! ```
//!
//! # Example
//!
//! ```
//! use huella::step_clock::StepClock;
//!
//! let clock = StepClock::new();
//! assert_eq!(clock.tick(), 1);
//! assert_eq!(clock.tick(), 2);
//! assert_eq!(clock.now(), 2);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic step counter
///
/// Lock-free: the executor may stamp observations from instrumentation hooks
/// without holding the session's buffers.
#[derive(Debug)]
pub struct StepClock {
    counter: AtomicU64,
}

impl StepClock {
    /// Create a clock at step 0
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Create a clock starting at `initial_value`
    ///
    /// Used when a segment continues the numbering of a previous one.
    pub const fn with_value(initial_value: u64) -> Self {
        Self {
            counter: AtomicU64::new(initial_value),
        }
    }

    /// Advance by one step and return the new step
    pub fn tick(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Move the clock forward to at least `step`
    ///
    /// Never moves backwards. Returns the resulting step.
    pub fn advance_to(&self, step: u64) -> u64 {
        let previous = self.counter.fetch_max(step, Ordering::SeqCst);
        previous.max(step)
    }

    /// Current step without advancing
    pub fn now(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::new()
    }
}
