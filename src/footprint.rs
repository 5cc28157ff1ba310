//! Footprints: the ordered record of values observed during execution
//!
//! A [`Footprint`] is built once, from a closed capture session or by
//! [`combine`], and is read-only afterwards.
//!
//! # Combining segments
//!
//! A submission executed in several segments produces one footprint per
//! segment. [`combine`] merges them into a single footprint:
//!
//! ```text
//! segment A (5 steps)          segment B (3 steps)
//! (x,1) (y,4)                  (z,0) (x,2)
//!        │                            │
//!        └──────────┬─────────────────┘
//!                   ▼
//! combined (8 steps): (x,1) (y,4) (z,5)      <- (x,2) dropped, seen in A
//! ```
//!
//! Timestamps of each segment are shifted by the total step count of the
//! segments before it, and a value whose fingerprint was already seen in any
//! earlier position is discarded, so the earliest occurrence wins.

use crate::complexity::InferenceConfig;
use crate::fingerprint::{fingerprint, Fingerprint, Observable, ObservedValue};
use crate::reference::{Reference, ReferenceResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A value captured at a given step
#[derive(Clone)]
pub struct Observation {
    pub value: ObservedValue,
    pub timestamp: u64,
}

impl Observation {
    pub fn new(value: ObservedValue, timestamp: u64) -> Self {
        Self { value, timestamp }
    }

    /// Wrap a plain value
    pub fn of<T: Observable>(value: T, timestamp: u64) -> Self {
        Self::new(Arc::new(value), timestamp)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.value)
    }

    /// Borrow the value as a concrete type
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        (*self.value).as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {})", self.value, self.timestamp)
    }
}

/// Observations compare by fingerprint and timestamp, never by identity
impl PartialEq for Observation {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.fingerprint() == other.fingerprint()
    }
}

/// Kind of a call event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Call,
    Return,
    Exception,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Call => write!(f, "call"),
            CallKind::Return => write!(f, "return"),
            CallKind::Exception => write!(f, "exception"),
        }
    }
}

/// An invoked operation, e.g. `("solution.py:fib", Call)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallRecord {
    pub qualified_name: String,
    pub kind: CallKind,
}

impl CallRecord {
    pub fn new(qualified_name: impl Into<String>, kind: CallKind) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            kind,
        }
    }
}

/// Ordered record of observations and calls spanning `step_count` steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Footprint {
    observations: Vec<Observation>,
    calls: Vec<CallRecord>,
    step_count: u64,
}

impl Footprint {
    /// Empty footprint spanning zero steps
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a footprint directly from its parts
    ///
    /// `step_count` is raised to the largest timestamp if it is smaller, so
    /// it always bounds every observation.
    pub fn from_parts(
        observations: Vec<Observation>,
        calls: Vec<CallRecord>,
        step_count: u64,
    ) -> Self {
        let max_timestamp = observations.iter().map(|o| o.timestamp).max().unwrap_or(0);
        Self {
            observations,
            calls,
            step_count: step_count.max(max_timestamp),
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Iterate the observed values in order
    pub fn values(&self) -> impl Iterator<Item = &ObservedValue> {
        self.observations.iter().map(|o| &o.value)
    }

    /// Check this footprint against one reference
    pub fn submit(&self, reference: &dyn Reference, group: Option<&str>) -> ReferenceResult {
        reference.run(&self.observations, group)
    }

    /// Check this footprint against every reference, in order
    pub fn submit_all(
        &self,
        references: &[Arc<dyn Reference>],
        group: Option<&str>,
    ) -> Vec<ReferenceResult> {
        self.submit_all_with(references, group, None)
    }

    /// Like [`Footprint::submit_all`], overriding every annotation's
    /// inference settings with `inference` when set
    pub fn submit_all_with(
        &self,
        references: &[Arc<dyn Reference>],
        group: Option<&str>,
        inference: Option<&InferenceConfig>,
    ) -> Vec<ReferenceResult> {
        references
            .iter()
            .map(|reference| reference.run_with(&self.observations, group, inference))
            .collect()
    }
}

/// Merge footprints produced in chronological order
///
/// Call records are concatenated unchanged. Observations are shifted by the
/// running step offset and deduplicated globally by fingerprint. The combined
/// step count is the sum of the inputs' step counts. Offsets saturate at
/// `u64::MAX` instead of wrapping, so late segments can share the last
/// timestamp but never jump before earlier ones.
pub fn combine<'a, I>(footprints: I) -> Footprint
where
    I: IntoIterator<Item = &'a Footprint>,
{
    let mut observations = Vec::new();
    let mut calls = Vec::new();
    let mut seen: HashSet<Fingerprint> = HashSet::new();
    let mut offset = 0u64;
    let mut segments = 0usize;

    for footprint in footprints {
        calls.extend(footprint.calls.iter().cloned());

        for observation in &footprint.observations {
            if seen.insert(observation.fingerprint()) {
                observations.push(Observation::new(
                    Arc::clone(&observation.value),
                    observation.timestamp.saturating_add(offset),
                ));
            }
        }

        offset = offset.saturating_add(footprint.step_count);
        segments += 1;
    }

    tracing::debug!(
        "combined {} footprints into {} observations over {} steps",
        segments,
        observations.len(),
        offset
    );

    Footprint {
        observations,
        calls,
        step_count: offset,
    }
}
