// Time-complexity annotations and the timing samples they consume

use crate::complexity::classes::{ComplexityCatalogue, ComplexityClass};
use crate::complexity::config::InferenceConfig;
use crate::complexity::inference::{infer_with, ComplexitySamples};
use crate::footprint::Observation;
use crate::reference::{Annotation, AnnotationDescriptor, AnnotationError, AnnotationResult};
use crate::tracing_state::TracingControl;
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// One timed run of a named operation on an input of size `n`
///
/// Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeComplexitySample {
    pub name: String,
    pub n: u64,
    pub start: f64,
    pub stop: f64,
}

impl TimeComplexitySample {
    pub fn new(name: impl Into<String>, n: u64, start: f64, stop: f64) -> Self {
        Self {
            name: name.into(),
            n,
            start,
            stop,
        }
    }

    /// Elapsed time, never negative
    pub fn duration(&self) -> f64 {
        (self.stop - self.start).max(0.0)
    }

    /// Run `f` and time it
    pub fn measure<R>(name: impl Into<String>, n: u64, f: impl FnOnce() -> R) -> (R, Self) {
        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let timer = Instant::now();
        let result = f();
        let elapsed = timer.elapsed().as_secs_f64();

        (result, Self::new(name, n, start, start + elapsed))
    }
}

/// Time `f` on an input of size `n` and record the sample into the active
/// capture session of `control`, if any
///
/// # Example
/// ```
/// use huella::capture::CaptureSession;
/// use huella::complexity::time_complexity;
/// use huella::tracing_state::TracingControl;
///
/// let control = TracingControl::new();
/// let session = CaptureSession::shared();
/// control.activate(session.clone()).unwrap();
///
/// let total = time_complexity(&control, "sum", 1000, || (0..1000u64).sum::<u64>());
/// control.deactivate();
///
/// assert_eq!(total, 499500);
/// assert_eq!(session.close().len(), 1);
/// ```
pub fn time_complexity<R>(
    control: &TracingControl,
    name: impl Into<String>,
    n: u64,
    f: impl FnOnce() -> R,
) -> R {
    let (result, sample) = TimeComplexitySample::measure(name, n, f);
    control.observe(sample);
    result
}

/// Requires the operation `name` to grow like `complexity`
///
/// Equality is by kind, name and required class; catalogue and tolerance are
/// evaluation settings.
#[derive(Debug, Clone)]
pub struct TimeComplexity {
    name: String,
    complexity: ComplexityClass,
    group: Option<String>,
    catalogue: ComplexityCatalogue,
    inference: InferenceConfig,
}

impl TimeComplexity {
    pub const KIND: &'static str = "time_complexity";

    /// Annotation checked against the standard catalogue
    pub fn new(name: impl Into<String>, complexity: ComplexityClass) -> Result<Self, AnnotationError> {
        Self::in_catalogue(name, complexity, ComplexityCatalogue::standard())
    }

    /// Annotation checked against `catalogue`, which must contain `complexity`
    pub fn in_catalogue(
        name: impl Into<String>,
        complexity: ComplexityClass,
        catalogue: ComplexityCatalogue,
    ) -> Result<Self, AnnotationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AnnotationError::MissingName);
        }
        if !catalogue.contains(&complexity) {
            return Err(AnnotationError::UnknownComplexity(complexity.name().to_string()));
        }

        Ok(Self {
            name,
            complexity,
            group: None,
            catalogue,
            inference: InferenceConfig::default(),
        })
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.inference.epsilon = epsilon;
        self
    }

    pub fn complexity(&self) -> ComplexityClass {
        self.complexity
    }

    pub fn catalogue(&self) -> &ComplexityCatalogue {
        &self.catalogue
    }
}

impl PartialEq for TimeComplexity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.complexity == other.complexity
    }
}

impl Annotation for TimeComplexity {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    fn descriptor(&self) -> AnnotationDescriptor {
        AnnotationDescriptor {
            kind: Self::KIND.to_string(),
            name: self.name.clone(),
            requirement: Some(self.complexity.name().to_string()),
        }
    }

    fn check(&self, observed: &[Observation]) -> AnnotationResult {
        self.check_with(observed, None)
    }

    fn check_with(
        &self,
        observed: &[Observation],
        inference: Option<&InferenceConfig>,
    ) -> AnnotationResult {
        let samples = ComplexitySamples::from_observations(observed, &self.name);
        let best = infer_with(&samples, &self.catalogue, inference.unwrap_or(&self.inference));

        tracing::debug!(
            "{}: {} sizes, best fit {:?}, required {}",
            self.name,
            samples.len(),
            best,
            self.complexity
        );

        AnnotationResult {
            satisfied: best == Some(self.complexity),
            annotation: self.descriptor(),
            value: best,
        }
    }
}
