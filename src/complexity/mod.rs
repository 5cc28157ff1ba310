// Asymptotic time-complexity inference from sampled timings
//
// An executor records a `TimeComplexitySample` (operation name, input size n,
// start and stop times) each time it times a call. A `TimeComplexity`
// annotation collects the samples for its operation into an n -> duration map
// and asks the inference engine which complexity class explains them best.
//
// Model selection:
// - Every class in the catalogue fits t ≈ a·f(n) + b by least squares and
//   reports the residual sum of squares (infinite when the fit is degenerate).
// - The catalogue is walked simplest first and a later class only replaces the
//   current best when it improves the residual by more than epsilon.
// - Near-ties resolve to the simpler class.

mod annotation;
mod classes;
mod config;
mod inference;

pub use annotation::{time_complexity, TimeComplexity, TimeComplexitySample};
pub use classes::{ComplexityCatalogue, ComplexityClass, FitFn, MIN_DISTINCT_SIZES};
pub use config::InferenceConfig;
pub use inference::{infer, infer_with, ComplexitySamples, EPS};
