//! Reference boundary
//!
//! A reference is a set of declared requirements (annotations) that a
//! footprint is checked against. Full subsequence and ordering matching lives
//! in an external engine that implements [`Reference`];
//! [`ReferenceImplementation`] is the in-crate reference that aggregates
//! annotation checks such as [`TimeComplexity`](crate::complexity::TimeComplexity).
//!
//! # Example
//!
//! ```
//! use huella::complexity::{ComplexityClass, TimeComplexity, TimeComplexitySample};
//! use huella::footprint::{Footprint, Observation};
//! use huella::reference::ReferenceImplementation;
//!
//! let reference = ReferenceImplementation::new("sorting")
//!     .unwrap()
//!     .with_annotation(TimeComplexity::new("sort", ComplexityClass::LINEAR).unwrap());
//!
//! let observations = (1..=4u64)
//!     .map(|i| Observation::of(TimeComplexitySample::new("sort", i * 10, 0.0, i as f64), i))
//!     .collect();
//! let footprint = Footprint::from_parts(observations, Vec::new(), 4);
//!
//! let result = footprint.submit(&reference, None);
//! assert!(result.satisfied);
//! ```

use crate::complexity::{ComplexityClass, InferenceConfig};
use crate::footprint::Observation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while authoring annotations and references
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("annotation requires a non-empty name")]
    MissingName,

    #[error("complexity class '{0}' is not in the catalogue")]
    UnknownComplexity(String),

    #[error("reference requires a non-empty name")]
    MissingReferenceName,
}

/// Serializable summary of an annotation, carried by results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationDescriptor {
    /// Annotation kind, e.g. `time_complexity`
    pub kind: String,

    pub name: String,

    /// Declared requirement, e.g. the required complexity class
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub requirement: Option<String>,
}

impl fmt::Display for AnnotationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirement {
            Some(requirement) => write!(f, "{} '{}' ({})", self.kind, self.name, requirement),
            None => write!(f, "{} '{}'", self.kind, self.name),
        }
    }
}

/// Outcome of one annotation check
///
/// `value` carries the best-fit class whether or not the check was satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResult {
    pub satisfied: bool,
    pub annotation: AnnotationDescriptor,
    pub value: Option<ComplexityClass>,
}

/// A single declared requirement
pub trait Annotation: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Group used to run a subset of a reference's annotations
    fn group(&self) -> Option<&str> {
        None
    }

    fn descriptor(&self) -> AnnotationDescriptor;

    /// Check the requirement against observed values in timestamp order
    fn check(&self, observed: &[Observation]) -> AnnotationResult;

    /// Check with inference settings imposed by the caller
    ///
    /// Annotations that do not infer anything ignore `inference`.
    fn check_with(
        &self,
        observed: &[Observation],
        inference: Option<&InferenceConfig>,
    ) -> AnnotationResult {
        let _ = inference;
        self.check(observed)
    }
}

/// Outcome of checking a footprint against one reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceResult {
    pub name: String,
    pub satisfied: bool,
    pub results: Vec<AnnotationResult>,
}

impl ReferenceResult {
    /// Results whose annotation was not satisfied
    pub fn unsatisfied(&self) -> impl Iterator<Item = &AnnotationResult> {
        self.results.iter().filter(|r| !r.satisfied)
    }
}

/// A reference a footprint can be submitted to
pub trait Reference: Send + Sync {
    fn name(&self) -> &str;

    /// Check `observed` against this reference, restricted to `group` if set
    fn run(&self, observed: &[Observation], group: Option<&str>) -> ReferenceResult;

    /// Like [`Reference::run`], with inference settings that override the
    /// annotations' own when set
    fn run_with(
        &self,
        observed: &[Observation],
        group: Option<&str>,
        inference: Option<&InferenceConfig>,
    ) -> ReferenceResult {
        let _ = inference;
        self.run(observed, group)
    }
}

/// Named list of annotations, satisfied when all of them are
#[derive(Debug, Clone)]
pub struct ReferenceImplementation {
    name: String,
    annotations: Vec<Arc<dyn Annotation>>,
}

impl ReferenceImplementation {
    /// Reference without annotations
    pub fn new(name: impl Into<String>) -> Result<Self, AnnotationError> {
        Self::from_annotations(name, Vec::new())
    }

    pub fn from_annotations(
        name: impl Into<String>,
        annotations: Vec<Arc<dyn Annotation>>,
    ) -> Result<Self, AnnotationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AnnotationError::MissingReferenceName);
        }
        Ok(Self { name, annotations })
    }

    /// Append an annotation
    pub fn with_annotation<A: Annotation + 'static>(mut self, annotation: A) -> Self {
        self.annotations.push(Arc::new(annotation));
        self
    }

    pub fn annotations(&self) -> &[Arc<dyn Annotation>] {
        &self.annotations
    }
}

impl Reference for ReferenceImplementation {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, observed: &[Observation], group: Option<&str>) -> ReferenceResult {
        self.run_with(observed, group, None)
    }

    fn run_with(
        &self,
        observed: &[Observation],
        group: Option<&str>,
        inference: Option<&InferenceConfig>,
    ) -> ReferenceResult {
        let results: Vec<AnnotationResult> = self
            .annotations
            .iter()
            .filter(|annotation| group.is_none() || annotation.group() == group)
            .map(|annotation| annotation.check_with(observed, inference))
            .collect();

        ReferenceResult {
            name: self.name.clone(),
            satisfied: results.iter().all(|r| r.satisfied),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::{TimeComplexity, TimeComplexitySample};

    fn linear_samples(name: &str) -> Vec<Observation> {
        [1u64, 10, 100, 1000]
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                Observation::of(TimeComplexitySample::new(name, n, 0.0, n as f64), i as u64)
            })
            .collect()
    }

    #[test]
    fn test_reference_requires_name() {
        assert_eq!(
            ReferenceImplementation::new(" ").unwrap_err(),
            AnnotationError::MissingReferenceName
        );
    }

    #[test]
    fn test_all_annotations_must_hold() {
        let reference = ReferenceImplementation::new("ref")
            .unwrap()
            .with_annotation(TimeComplexity::new("f", ComplexityClass::LINEAR).unwrap())
            .with_annotation(TimeComplexity::new("f", ComplexityClass::QUADRATIC).unwrap());

        let result = reference.run(&linear_samples("f"), None);

        assert!(!result.satisfied);
        assert_eq!(result.results.len(), 2);
        assert!(result.results[0].satisfied);
        assert_eq!(result.unsatisfied().count(), 1);
    }

    #[test]
    fn test_group_filter() {
        let reference = ReferenceImplementation::new("ref")
            .unwrap()
            .with_annotation(
                TimeComplexity::new("f", ComplexityClass::LINEAR)
                    .unwrap()
                    .with_group("part1"),
            )
            .with_annotation(
                TimeComplexity::new("f", ComplexityClass::CUBIC)
                    .unwrap()
                    .with_group("part2"),
            );

        let result = reference.run(&linear_samples("f"), Some("part1"));
        assert!(result.satisfied);
        assert_eq!(result.results.len(), 1);

        let all = reference.run(&linear_samples("f"), None);
        assert_eq!(all.results.len(), 2);
    }

    #[test]
    fn test_inference_override_reaches_annotations() {
        let reference = ReferenceImplementation::new("ref")
            .unwrap()
            .with_annotation(TimeComplexity::new("f", ComplexityClass::LINEAR).unwrap());
        let strict = InferenceConfig {
            min_samples: 10,
            ..InferenceConfig::default()
        };

        let result = reference.run_with(&linear_samples("f"), None, Some(&strict));
        assert!(!result.satisfied);
        assert_eq!(result.results[0].value, None);

        let result = reference.run_with(&linear_samples("f"), None, None);
        assert_eq!(result.results[0].value, Some(ComplexityClass::LINEAR));
    }

    #[test]
    fn test_empty_reference_is_satisfied() {
        let reference = ReferenceImplementation::new("empty").unwrap();
        assert!(reference.run(&[], None).satisfied);
    }

    #[test]
    fn test_descriptor_display() {
        let descriptor = TimeComplexity::new("fib", ComplexityClass::EXPONENTIAL)
            .unwrap()
            .descriptor();
        assert_eq!(descriptor.to_string(), "time_complexity 'fib' (exponential)");
    }

    #[test]
    fn test_result_serde_roundtrip() {
        let result = ReferenceResult {
            name: "ref".to_string(),
            satisfied: false,
            results: vec![AnnotationResult {
                satisfied: false,
                annotation: AnnotationDescriptor {
                    kind: "time_complexity".to_string(),
                    name: "f".to_string(),
                    requirement: Some("linear".to_string()),
                },
                value: Some(ComplexityClass::QUADRATIC),
            }],
        };

        let bytes = rmp_serde::to_vec(&result).unwrap();
        let back: ReferenceResult = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back, result);
    }
}
