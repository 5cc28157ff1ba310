//! Check orchestrator
//!
//! [`Check::run`] wraps a block of code in a capture scope:
//!
//! 1. Entry: if a session is already active the scope is a no-op and the
//!    outer scope keeps ownership of the recording. Otherwise a fresh
//!    [`CaptureSession`] is armed and the thread's live flag is set.
//! 2. Body: the block runs; instrumentation reports into the tracing control.
//! 3. Exit: capture is disarmed first on every path, panics included. Then,
//!    if the block succeeded or `report_on_error` is set, the footprint is
//!    submitted to every reference, rendered, printed and cached.
//!
//! The block's own error is always handed back and a panic is resumed after
//! teardown.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use huella::check::Check;
//! use huella::complexity::{time_complexity, ComplexityClass, TimeComplexity};
//! use huella::config::CheckConfig;
//! use huella::reference::{Reference, ReferenceImplementation};
//! use huella::tracing_state::TracingControl;
//!
//! let reference = ReferenceImplementation::new("sum")
//!     .unwrap()
//!     .with_annotation(TimeComplexity::new("sum", ComplexityClass::LINEAR).unwrap());
//! let references: Vec<Arc<dyn Reference>> = vec![Arc::new(reference)];
//!
//! let control = TracingControl::new();
//! let check = Check::new(references)
//!     .unwrap()
//!     .with_config(CheckConfig::quiet())
//!     .unwrap()
//!     .with_control(&control);
//!
//! let outcome = check.run(|| {
//!     for n in [10u64, 100, 1000] {
//!         time_complexity(&control, "sum", n, || (0..n).sum::<u64>());
//!     }
//!     Ok::<_, std::convert::Infallible>(())
//! });
//!
//! let report = outcome.report.as_ref().unwrap();
//! assert_eq!(report.footprint.len(), 3);
//! assert!(outcome.into_result().is_ok());
//! ```

use crate::cache::{CacheError, FootprintCache};
use crate::capture::CaptureSession;
use crate::config::CheckConfig;
use crate::footprint::Footprint;
use crate::reference::{Reference, ReferenceResult};
use crate::report::generate_report;
use crate::tracing_state::{set_capture_live, TracingControl, GLOBAL_TRACING};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the check orchestrator
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Invalid check configuration: {0}")]
    Configuration(String),

    #[error("Failed to cache check results: {0}")]
    Cache(#[from] CacheError),
}

/// What a reporting scope produced
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub footprint: Footprint,
    pub results: Vec<ReferenceResult>,
    pub rendered: String,
}

impl CheckReport {
    /// Whether every reference was satisfied
    pub fn satisfied(&self) -> bool {
        self.results.iter().all(|r| r.satisfied)
    }
}

/// Outcome of [`Check::run`]
///
/// `report` is `None` when the scope was nested inside another one, or when
/// the block failed and `report_on_error` is off.
pub struct CheckOutcome<T, E> {
    pub result: Result<T, E>,
    pub report: Option<CheckReport>,
    pub cache_error: Option<CacheError>,
}

impl<T, E> CheckOutcome<T, E> {
    fn passthrough(result: Result<T, E>) -> Self {
        Self {
            result,
            report: None,
            cache_error: None,
        }
    }

    /// The block's result, with a cache failure surfaced as an error
    ///
    /// A failed block keeps its own error; the cache failure was already
    /// logged in that case.
    pub fn into_result(self) -> Result<Result<T, E>, CheckError> {
        match (self.result, self.cache_error) {
            (Ok(_), Some(e)) => Err(CheckError::Cache(e)),
            (result, _) => Ok(result),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for CheckOutcome<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckOutcome")
            .field("result", &self.result)
            .field("report", &self.report)
            .field("cache_error", &self.cache_error)
            .finish()
    }
}

/// Disarms capture when dropped, on every exit path
struct ScopeGuard<'a> {
    control: &'a TracingControl,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.control.deactivate();
        set_capture_live(false);
    }
}

/// A set of references checked against the footprint of a block
pub struct Check<'a> {
    references: Vec<Arc<dyn Reference>>,
    config: CheckConfig,
    control: &'a TracingControl,
}

impl<'a> Check<'a> {
    /// Check against `references` with the default configuration and the
    /// process-wide tracing control
    pub fn new(references: Vec<Arc<dyn Reference>>) -> Result<Self, CheckError> {
        if references.is_empty() {
            return Err(CheckError::Configuration(
                "at least one reference is required".to_string(),
            ));
        }

        Ok(Self {
            references,
            config: CheckConfig::default(),
            control: &GLOBAL_TRACING,
        })
    }

    pub fn with_config(mut self, config: CheckConfig) -> Result<Self, CheckError> {
        config
            .validate()
            .map_err(|e| CheckError::Configuration(e.to_string()))?;
        self.config = config;
        Ok(self)
    }

    /// Use a private tracing control instead of the process-wide one
    pub fn with_control(mut self, control: &'a TracingControl) -> Self {
        self.control = control;
        self
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn references(&self) -> &[Arc<dyn Reference>] {
        &self.references
    }

    /// Run `body` inside a capture scope
    pub fn run<T, E>(&self, body: impl FnOnce() -> Result<T, E>) -> CheckOutcome<T, E> {
        if self.control.is_active().is_some() {
            tracing::debug!("capture already active, nested check is a no-op");
            return CheckOutcome::passthrough(body());
        }

        let session = CaptureSession::shared();
        if self.control.activate(Arc::clone(&session)).is_err() {
            tracing::debug!("capture armed concurrently, nested check is a no-op");
            return CheckOutcome::passthrough(body());
        }

        let guard = ScopeGuard {
            control: self.control,
        };
        set_capture_live(true);
        let outcome = panic::catch_unwind(AssertUnwindSafe(body));
        drop(guard);

        let succeeded = matches!(outcome, Ok(Ok(_)));
        let mut report = None;
        let mut cache_error = None;

        if succeeded || self.config.report_on_error {
            let (built, cached) = self.report(session.close());
            if let Err(e) = cached {
                tracing::warn!("{}", e);
                cache_error = Some(e);
            }
            report = Some(built);
        }

        match outcome {
            Ok(result) => CheckOutcome {
                result,
                report,
                cache_error,
            },
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn report(&self, footprint: Footprint) -> (CheckReport, Result<(), CacheError>) {
        let results = footprint.submit_all_with(
            &self.references,
            self.config.group.as_deref(),
            self.config.inference.as_ref(),
        );
        let rendered = generate_report(&results, self.config.show_only);

        if self.config.print_report && !rendered.is_empty() {
            println!("{}", rendered);
        }

        let cached = if self.config.cache {
            FootprintCache::new(&self.config.cache_dir).store_check(&footprint, &results)
        } else {
            Ok(())
        };

        (
            CheckReport {
                footprint,
                results,
                rendered,
            },
            cached,
        )
    }
}
