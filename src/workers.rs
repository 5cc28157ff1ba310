//! Isolated grading workers
//!
//! Each job gets a private [`TracingControl`] armed with its own capture
//! session, so submissions graded side by side never share trace state. A job
//! that panics produces no footprint; its slot in the output is `None`.
//!
//! # Example
//!
//! ```
//! use huella::tracing_state::TracingControl;
//! use huella::workers::{run_isolated, Job};
//!
//! let jobs: Vec<Job> = (0..3)
//!     .map(|i| -> Job {
//!         Box::new(move |control: &TracingControl| {
//!             control.tick();
//!             control.observe(i);
//!         })
//!     })
//!     .collect();
//!
//! let footprints = run_isolated(jobs, true);
//! assert_eq!(footprints.len(), 3);
//! assert!(footprints.iter().all(|f| f.as_ref().map_or(false, |f| f.len() == 1)));
//! ```

use crate::capture::CaptureSession;
use crate::footprint::Footprint;
use crate::tracing_state::TracingControl;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A unit of work run against its own tracing control
pub type Job = Box<dyn FnOnce(&TracingControl) + Send>;

/// Run one job with a fresh control and session
fn run_job(index: usize, job: Job) -> Option<Footprint> {
    let control = TracingControl::new();
    let session = CaptureSession::shared();
    if control.activate(Arc::clone(&session)).is_err() {
        return None;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&control)));
    control.deactivate();

    match outcome {
        Ok(()) => Some(session.close()),
        Err(_) => {
            tracing::warn!("worker {} panicked, no footprint produced", index);
            None
        }
    }
}

/// Run `jobs`, one footprint slot per job in job order
///
/// With `parallel` set every job runs on its own scoped thread.
pub fn run_isolated(jobs: Vec<Job>, parallel: bool) -> Vec<Option<Footprint>> {
    if !parallel {
        return jobs
            .into_iter()
            .enumerate()
            .map(|(index, job)| run_job(index, job))
            .collect();
    }

    let count = jobs.len();
    let scoped = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .into_iter()
            .enumerate()
            .map(|(index, job)| scope.spawn(move |_| run_job(index, job)))
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| {
                handle.join().unwrap_or_else(|_| {
                    tracing::warn!("worker {} thread died, no footprint produced", index);
                    None
                })
            })
            .collect::<Vec<_>>()
    });

    scoped.unwrap_or_else(|_| {
        tracing::warn!("worker scope failed, no footprints produced");
        vec![None; count]
    })
}
