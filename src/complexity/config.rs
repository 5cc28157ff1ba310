// Configuration for complexity inference

use crate::complexity::classes::MIN_DISTINCT_SIZES;
use crate::complexity::inference::EPS;
use serde::{Deserialize, Serialize};

/// Tuning of the best-fit selection
///
/// # Example
/// ```
/// use huella::complexity::InferenceConfig;
///
/// let config = InferenceConfig::default();
/// assert_eq!(config.epsilon, 1e-6);
/// assert_eq!(config.min_samples, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Residual improvement a more complex class needs to replace a simpler one
    ///
    /// - 1e-6 (default): only exact near-ties go to the simpler class
    /// - larger values bias harder towards simple classes on noisy timings
    pub epsilon: f64,

    /// Minimum number of distinct input sizes before any class is fitted
    ///
    /// Least squares needs 2; more sizes make the choice between neighbouring
    /// classes (linear vs linearithmic) meaningful.
    pub min_samples: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            epsilon: EPS,
            min_samples: MIN_DISTINCT_SIZES,
        }
    }
}

impl InferenceConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(format!(
                "epsilon must be finite and non-negative, got {}",
                self.epsilon
            ));
        }

        if self.min_samples < MIN_DISTINCT_SIZES {
            return Err(format!(
                "min_samples must be >= {} for least squares, got {}",
                MIN_DISTINCT_SIZES, self.min_samples
            ));
        }

        Ok(())
    }
}
