//! Tracing control state
//!
//! At most one capture session records at any instant. [`TracingControl`]
//! holds the active session (if any) and refuses a second activation with
//! [`TracingError::AlreadyActive`]. Callers that nest capture regions on
//! purpose check [`TracingControl::is_active`] first and skip activation.
//!
//! The process-wide instance is [`GLOBAL_TRACING`]; everything that consumes
//! tracing control also accepts an injected instance, which is how isolated
//! workers and tests get private state.
//!
//! # Example
//!
//! ```
//! use huella::capture::CaptureSession;
//! use huella::tracing_state::TracingControl;
//!
//! let control = TracingControl::new();
//! let session = CaptureSession::shared();
//!
//! control.activate(session.clone()).unwrap();
//! assert!(control.activate(CaptureSession::shared()).is_err());
//!
//! control.observe(42);
//! control.deactivate();
//! control.deactivate(); // idempotent
//!
//! assert_eq!(session.close().len(), 1);
//! ```

use crate::capture::CaptureSession;
use crate::fingerprint::Observable;
use crate::footprint::CallKind;
use std::cell::Cell;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors raised by tracing control
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TracingError {
    #[error("a capture session is already active")]
    AlreadyActive,
}

/// Gate for value capture
#[derive(Debug, Default)]
pub struct TracingControl {
    active: Mutex<Option<Arc<CaptureSession>>>,
}

impl TracingControl {
    pub const fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<CaptureSession>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Active session, without side effects
    pub fn is_active(&self) -> Option<Arc<CaptureSession>> {
        self.slot().clone()
    }

    /// Arm capture with `session`
    pub fn activate(&self, session: Arc<CaptureSession>) -> Result<(), TracingError> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(TracingError::AlreadyActive);
        }
        *slot = Some(session);
        tracing::debug!("tracing armed");
        Ok(())
    }

    /// Disarm capture; idempotent
    pub fn deactivate(&self) {
        if self.slot().take().is_some() {
            tracing::debug!("tracing disarmed");
        }
    }

    /// Record `value` into the active session, if any
    ///
    /// Returns whether the value was recorded. Nothing is recorded once
    /// capture has been disarmed.
    pub fn observe<T: Observable>(&self, value: T) -> bool {
        match self.is_active() {
            Some(session) => session.observe(value),
            None => false,
        }
    }

    /// Record a call into the active session, if any
    pub fn record_call(&self, qualified_name: impl Into<String>, kind: CallKind) -> bool {
        match self.is_active() {
            Some(session) => session.record_call(qualified_name, kind),
            None => false,
        }
    }

    /// Advance the active session's step counter, if any
    pub fn tick(&self) -> Option<u64> {
        self.is_active().map(|session| session.tick())
    }
}

/// Process-wide tracing control
pub static GLOBAL_TRACING: TracingControl = TracingControl::new();

thread_local! {
    static CAPTURE_LIVE: Cell<bool> = const { Cell::new(false) };
}

/// Whether a check scope on this thread has capture live
pub fn capture_live() -> bool {
    CAPTURE_LIVE.with(Cell::get)
}

pub(crate) fn set_capture_live(live: bool) {
    CAPTURE_LIVE.with(|flag| flag.set(live));
}
