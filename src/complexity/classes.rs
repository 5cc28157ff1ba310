// Complexity classes and the ordered catalogue they are tried in
//
// A class is a named fitting strategy: a plain function from a sample set to a
// residual. Lower residuals mean better fits; `f64::INFINITY` marks a fit that
// could not be computed (too few sizes, non-finite transforms, rank
// deficiency). Fitting never panics and never returns an error.
//
// Reductions run on trueno's SIMD vectors over f32 lanes; coefficients are
// refined and residuals summed in f64.

use crate::complexity::inference::ComplexitySamples;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use trueno::Vector;

/// Least squares needs at least two distinct input sizes
pub const MIN_DISTINCT_SIZES: usize = 2;

/// Fitting strategy of a complexity class
pub type FitFn = fn(&ComplexitySamples) -> f64;

/// A named asymptotic growth family
///
/// Classes are identified by name: two classes with the same name are the
/// same class.
#[derive(Clone, Copy)]
pub struct ComplexityClass {
    name: &'static str,
    fit: FitFn,
}

impl ComplexityClass {
    /// Define a custom class
    pub const fn new(name: &'static str, fit: FitFn) -> Self {
        Self { name, fit }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Residual of this class on `samples`, `+∞` when degenerate
    pub fn fit(&self, samples: &ComplexitySamples) -> f64 {
        let residual = (self.fit)(samples);
        if residual.is_nan() {
            f64::INFINITY
        } else {
            residual.max(0.0)
        }
    }

    pub const CONSTANT: ComplexityClass = ComplexityClass::new("constant", fit_constant);
    pub const LOGARITHMIC: ComplexityClass = ComplexityClass::new("logarithmic", fit_logarithmic);
    pub const LINEAR: ComplexityClass = ComplexityClass::new("linear", fit_linear);
    pub const LINEARITHMIC: ComplexityClass =
        ComplexityClass::new("linearithmic", fit_linearithmic);
    pub const QUADRATIC: ComplexityClass = ComplexityClass::new("quadratic", fit_quadratic);
    pub const CUBIC: ComplexityClass = ComplexityClass::new("cubic", fit_cubic);
    pub const EXPONENTIAL: ComplexityClass = ComplexityClass::new("exponential", fit_exponential);

    /// Standard classes, simplest first
    pub const STANDARD: [ComplexityClass; 7] = [
        Self::CONSTANT,
        Self::LOGARITHMIC,
        Self::LINEAR,
        Self::LINEARITHMIC,
        Self::QUADRATIC,
        Self::CUBIC,
        Self::EXPONENTIAL,
    ];

    /// Look up a standard class by name
    pub fn by_name(name: &str) -> Option<ComplexityClass> {
        Self::STANDARD.iter().copied().find(|c| c.name == name)
    }
}

impl PartialEq for ComplexityClass {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ComplexityClass {}

impl Hash for ComplexityClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for ComplexityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComplexityClass({})", self.name)
    }
}

impl fmt::Display for ComplexityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// Classes travel as their name; only standard classes can be read back.
impl Serialize for ComplexityClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

impl<'de> Deserialize<'de> for ComplexityClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        ComplexityClass::by_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown complexity class: {}", name)))
    }
}

/// Ordered list of classes, simplest first
///
/// The order is part of the contract: inference prefers earlier classes on
/// near-ties. Extensions can only append.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityCatalogue {
    classes: Vec<ComplexityClass>,
}

impl ComplexityCatalogue {
    /// Catalogue from classes already ordered simplest first
    pub fn new(classes: Vec<ComplexityClass>) -> Self {
        Self { classes }
    }

    pub fn standard() -> Self {
        Self::new(ComplexityClass::STANDARD.to_vec())
    }

    /// Append a class more complex than every class already present
    ///
    /// A class whose name is already present is ignored.
    pub fn push(&mut self, class: ComplexityClass) {
        if !self.contains(&class) {
            self.classes.push(class);
        }
    }

    pub fn contains(&self, class: &ComplexityClass) -> bool {
        self.classes.contains(class)
    }

    pub fn get(&self, name: &str) -> Option<ComplexityClass> {
        self.classes.iter().copied().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComplexityClass> {
        self.classes.iter()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ComplexityCatalogue {
    fn default() -> Self {
        Self::standard()
    }
}

fn fit_constant(samples: &ComplexitySamples) -> f64 {
    if samples.len() < MIN_DISTINCT_SIZES {
        return f64::INFINITY;
    }
    let durations: Vec<f64> = samples.iter().map(|(_, t)| t).collect();
    if durations.iter().any(|t| !t.is_finite()) {
        return f64::INFINITY;
    }

    let mut level = 0.0;
    for _ in 0..=REFINEMENT_ROUNDS {
        let offsets: Vec<f64> = durations.iter().map(|t| t - level).collect();
        match Lanes::new(&offsets).and_then(|lanes| lanes.mean()) {
            Some(shift) => level += shift,
            None => return f64::INFINITY,
        }
    }

    residual_sum(durations.iter().map(|t| t - level))
}

fn fit_logarithmic(samples: &ComplexitySamples) -> f64 {
    least_squares(samples, |n| n.log2())
}

fn fit_linear(samples: &ComplexitySamples) -> f64 {
    least_squares(samples, |n| n)
}

fn fit_linearithmic(samples: &ComplexitySamples) -> f64 {
    least_squares(samples, |n| n * n.log2())
}

fn fit_quadratic(samples: &ComplexitySamples) -> f64 {
    least_squares(samples, |n| n.powi(2))
}

fn fit_cubic(samples: &ComplexitySamples) -> f64 {
    least_squares(samples, |n| n.powi(3))
}

fn fit_exponential(samples: &ComplexitySamples) -> f64 {
    least_squares(samples, |n| n.exp2())
}

/// Extra solve passes on the f64 residual of the previous coefficients
const REFINEMENT_ROUNDS: usize = 2;

/// f64 data mapped into `[-1, 1]` single-precision lanes for trueno
///
/// Values are shifted by the first sample and divided by the widest
/// distance from it, so the first lane is exactly 0 and at least one lane
/// is exactly ±1 unless every value is equal.
struct Lanes {
    origin: f64,
    span: f64,
    lanes: Vec<f32>,
}

impl Lanes {
    fn new(values: &[f64]) -> Option<Self> {
        let origin = *values.first()?;
        let span = values
            .iter()
            .map(|v| (v - origin).abs())
            .fold(0.0, f64::max);
        if !span.is_finite() {
            return None;
        }

        let lanes = values
            .iter()
            .map(|v| {
                if span == 0.0 {
                    0.0
                } else {
                    ((v - origin) / span) as f32
                }
            })
            .collect();
        Some(Self {
            origin,
            span,
            lanes,
        })
    }

    fn vector(&self) -> Vector<f32> {
        Vector::from_slice(&self.lanes)
    }

    /// Mean in the original units
    fn mean(&self) -> Option<f64> {
        let mean = self.vector().mean().ok()?;
        Some(self.origin + self.span * f64::from(mean))
    }
}

/// Residual sum of squares of t ≈ a·f(n) + b
fn least_squares(samples: &ComplexitySamples, transform: impl Fn(f64) -> f64) -> f64 {
    if samples.len() < MIN_DISTINCT_SIZES {
        return f64::INFINITY;
    }

    let mut xs = Vec::with_capacity(samples.len());
    let mut ys = Vec::with_capacity(samples.len());
    for (n, t) in samples.iter() {
        let x = transform(n as f64);
        if !x.is_finite() || !t.is_finite() {
            return f64::INFINITY;
        }
        xs.push(x);
        ys.push(t);
    }

    match fit_line(&xs, &ys) {
        Some((slope, intercept)) => {
            residual_sum(xs.iter().zip(&ys).map(|(x, y)| y - (slope * x + intercept)))
        }
        None => f64::INFINITY,
    }
}

/// Slope and intercept of the least squares line through `(xs, ys)`
///
/// Sums and dot products run on trueno vectors in single precision. Each
/// round refits the f64 residual of the coefficients so far, which brings
/// the coefficients back to double precision.
fn fit_line(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let x = Lanes::new(xs)?;
    // All transformed sizes equal: the design matrix is rank deficient.
    if x.span == 0.0 {
        return None;
    }

    let x_mean = x.vector().mean().ok()?;
    let centered: Vec<f32> = x.lanes.iter().map(|v| v - x_mean).collect();
    let centered = Vector::from_slice(&centered);
    let sxx = centered.dot(&centered).ok()?;
    if !sxx.is_finite() || sxx <= 0.0 {
        return None;
    }

    let mut slope = 0.0;
    let mut intercept = 0.0;
    for _ in 0..=REFINEMENT_ROUNDS {
        let residuals: Vec<f64> = xs
            .iter()
            .zip(ys)
            .map(|(x, y)| y - (slope * x + intercept))
            .collect();
        let r = Lanes::new(&residuals)?;
        if r.span == 0.0 {
            intercept += r.origin;
            break;
        }

        let r_mean = r.vector().mean().ok()?;
        let r_centered: Vec<f32> = r.lanes.iter().map(|v| v - r_mean).collect();
        let sxy = centered.dot(&Vector::from_slice(&r_centered)).ok()?;

        // Line in lane coordinates, mapped back to the original units
        let lane_slope = f64::from(sxy) / f64::from(sxx);
        let lane_intercept = f64::from(r_mean) - lane_slope * f64::from(x_mean);
        let d_slope = r.span * lane_slope / x.span;
        slope += d_slope;
        intercept += r.origin + r.span * lane_intercept - d_slope * x.origin;
    }

    if slope.is_finite() && intercept.is_finite() {
        Some((slope, intercept))
    } else {
        None
    }
}

// Accumulated in f64: single-precision sums drift by more than the
// inference epsilon once residuals reach a few hundred.
fn residual_sum(residuals: impl Iterator<Item = f64>) -> f64 {
    let residual: f64 = residuals.map(|r| r * r).sum();
    if residual.is_finite() {
        residual
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(points: &[(u64, f64)]) -> ComplexitySamples {
        points.iter().copied().collect()
    }

    #[test]
    fn test_standard_order() {
        let names: Vec<&str> = ComplexityCatalogue::standard()
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "constant",
                "logarithmic",
                "linear",
                "linearithmic",
                "quadratic",
                "cubic",
                "exponential"
            ]
        );
    }

    #[test]
    fn test_linear_fit_exact() {
        let s = samples(&[(1, 3.0), (2, 5.0), (3, 7.0), (4, 9.0)]);
        assert!(ComplexityClass::LINEAR.fit(&s) < 1e-12);
        assert!(ComplexityClass::CONSTANT.fit(&s) > 1.0);
    }

    #[test]
    fn test_constant_fit_exact() {
        let s = samples(&[(1, 2.0), (50, 2.0), (900, 2.0)]);
        assert_eq!(ComplexityClass::CONSTANT.fit(&s), 0.0);
    }

    #[test]
    fn test_single_sample_is_degenerate() {
        let s = samples(&[(10, 1.0)]);
        for class in ComplexityClass::STANDARD {
            assert_eq!(class.fit(&s), f64::INFINITY, "{}", class);
        }
    }

    #[test]
    fn test_log_of_zero_is_degenerate() {
        let s = samples(&[(0, 1.0), (2, 2.0), (4, 3.0)]);
        assert_eq!(ComplexityClass::LOGARITHMIC.fit(&s), f64::INFINITY);
        assert!(ComplexityClass::LINEAR.fit(&s).is_finite());
    }

    #[test]
    fn test_exponential_overflow_is_degenerate() {
        let s = samples(&[(10, 1.0), (100, 2.0), (5000, 3.0)]);
        assert_eq!(ComplexityClass::EXPONENTIAL.fit(&s), f64::INFINITY);
    }

    // Plain double-precision regression, for comparison
    fn reference_line_residual(points: &[(f64, f64)]) -> f64 {
        let count = points.len() as f64;
        let x_mean = points.iter().map(|p| p.0).sum::<f64>() / count;
        let y_mean = points.iter().map(|p| p.1).sum::<f64>() / count;
        let sxx: f64 = points.iter().map(|p| (p.0 - x_mean).powi(2)).sum();
        let sxy: f64 = points
            .iter()
            .map(|p| (p.0 - x_mean) * (p.1 - y_mean))
            .sum();
        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;
        points
            .iter()
            .map(|p| (p.1 - (slope * p.0 + intercept)).powi(2))
            .sum()
    }

    #[test]
    fn test_large_residuals_stay_within_epsilon() {
        // Residuals near 1e6: an f32 sum would be off by about 0.06
        let points = [(3u64, 0.1), (8, 1000.3), (21, 0.7), (55, 999.9), (144, 12.5)];
        let s = samples(&points);

        let count = points.len() as f64;
        let mean = points.iter().map(|p| p.1).sum::<f64>() / count;
        let expected: f64 = points.iter().map(|p| (p.1 - mean).powi(2)).sum();
        assert!((ComplexityClass::CONSTANT.fit(&s) - expected).abs() < crate::complexity::EPS);

        let as_f64: Vec<(f64, f64)> = points.iter().map(|&(n, t)| (n as f64, t)).collect();
        let expected = reference_line_residual(&as_f64);
        assert!((ComplexityClass::LINEAR.fit(&s) - expected).abs() < crate::complexity::EPS);
    }

    #[test]
    fn test_refinement_recovers_large_intercept() {
        // Offset far above the slope: f32 alone keeps about seven digits
        let s: ComplexitySamples = [7u64, 19, 230, 1_001, 4_097]
            .iter()
            .map(|&n| (n, std::f64::consts::PI * n as f64 + 123_456.789))
            .collect();
        assert!(ComplexityClass::LINEAR.fit(&s) < 1e-12);
        assert!(ComplexityClass::LOGARITHMIC.fit(&s) > 1.0);
    }

    #[test]
    fn test_nan_residual_becomes_infinite() {
        fn nan_fit(_: &ComplexitySamples) -> f64 {
            f64::NAN
        }
        let class = ComplexityClass::new("nan", nan_fit);
        assert_eq!(class.fit(&samples(&[(1, 1.0), (2, 2.0)])), f64::INFINITY);
    }

    #[test]
    fn test_equality_by_name() {
        fn other_fit(_: &ComplexitySamples) -> f64 {
            0.0
        }
        let alias = ComplexityClass::new("linear", other_fit);
        assert_eq!(alias, ComplexityClass::LINEAR);
        assert_ne!(ComplexityClass::LINEAR, ComplexityClass::QUADRATIC);
    }

    #[test]
    fn test_by_name_and_serde() {
        assert_eq!(
            ComplexityClass::by_name("cubic"),
            Some(ComplexityClass::CUBIC)
        );
        assert_eq!(ComplexityClass::by_name("factorial"), None);

        let json = serde_json::to_string(&ComplexityClass::QUADRATIC).unwrap();
        assert_eq!(json, "\"quadratic\"");
        let back: ComplexityClass = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ComplexityClass::QUADRATIC);
        assert!(serde_json::from_str::<ComplexityClass>("\"factorial\"").is_err());
    }

    #[test]
    fn test_push_appends_once() {
        fn factorial_fit(_: &ComplexitySamples) -> f64 {
            f64::INFINITY
        }
        let mut catalogue = ComplexityCatalogue::standard();
        let factorial = ComplexityClass::new("factorial", factorial_fit);

        catalogue.push(factorial);
        catalogue.push(factorial);
        catalogue.push(ComplexityClass::CONSTANT);

        assert_eq!(catalogue.len(), 8);
        assert_eq!(catalogue.iter().last(), Some(&factorial));
        assert_eq!(catalogue.get("factorial"), Some(factorial));
    }
}
