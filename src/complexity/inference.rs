// Best-fit selection over the complexity catalogue

use crate::complexity::annotation::TimeComplexitySample;
use crate::complexity::classes::{ComplexityCatalogue, ComplexityClass};
use crate::complexity::config::InferenceConfig;
use crate::footprint::Observation;
use std::collections::BTreeMap;

/// Default tolerance giving simpler classes the benefit of the doubt
pub const EPS: f64 = 1e-6;

/// Input size → elapsed duration for one timed operation
///
/// Sizes are unique; inserting a size twice keeps the later duration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexitySamples {
    durations: BTreeMap<u64, f64>,
}

impl ComplexitySamples {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a duration for size `n`, replacing any earlier one
    pub fn insert(&mut self, n: u64, duration: f64) {
        self.durations.insert(n, duration);
    }

    /// Collect the timing samples named `name` from a footprint's observations
    ///
    /// Observations that are not [`TimeComplexitySample`]s, or that time a
    /// different operation, are skipped.
    pub fn from_observations(observed: &[Observation], name: &str) -> Self {
        let mut samples = Self::new();
        for observation in observed {
            if let Some(sample) = observation.downcast_ref::<TimeComplexitySample>() {
                if sample.name == name {
                    samples.insert(sample.n, sample.duration());
                }
            }
        }
        samples
    }

    /// Number of distinct sizes
    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn get(&self, n: u64) -> Option<f64> {
        self.durations.get(&n).copied()
    }

    /// `(n, duration)` pairs in increasing `n`
    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.durations.iter().map(|(&n, &t)| (n, t))
    }
}

impl FromIterator<(u64, f64)> for ComplexitySamples {
    fn from_iter<I: IntoIterator<Item = (u64, f64)>>(iter: I) -> Self {
        let mut samples = Self::new();
        for (n, t) in iter {
            samples.insert(n, t);
        }
        samples
    }
}

/// Best-fitting class with the default tolerance
///
/// # Example
/// ```
/// use huella::complexity::{infer, ComplexityCatalogue, ComplexityClass, ComplexitySamples};
///
/// let samples: ComplexitySamples =
///     [(1, 1.0), (10, 10.0), (100, 100.0), (1000, 1000.0)].into_iter().collect();
///
/// let best = infer(&samples, &ComplexityCatalogue::standard());
/// assert_eq!(best, Some(ComplexityClass::LINEAR));
/// ```
pub fn infer(samples: &ComplexitySamples, catalogue: &ComplexityCatalogue) -> Option<ComplexityClass> {
    infer_with(samples, catalogue, &InferenceConfig::default())
}

/// Best-fitting class under `config`
///
/// Classes are tried in catalogue order. A class replaces the current best
/// only if its residual is lower by more than `config.epsilon`. Returns `None`
/// when there are fewer than `config.min_samples` sizes or every class is
/// degenerate.
pub fn infer_with(
    samples: &ComplexitySamples,
    catalogue: &ComplexityCatalogue,
    config: &InferenceConfig,
) -> Option<ComplexityClass> {
    if samples.len() < config.min_samples {
        tracing::debug!(
            "{} sizes sampled, {} required for complexity inference",
            samples.len(),
            config.min_samples
        );
        return None;
    }

    let mut best_class = None;
    let mut best_residual = f64::INFINITY;

    for class in catalogue.iter() {
        let residual = class.fit(samples);
        tracing::debug!("complexity class {} residual {}", class, residual);

        if residual < best_residual - config.epsilon {
            best_class = Some(*class);
            best_residual = residual;
        }
    }

    best_class
}
