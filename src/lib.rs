//! Huella - execution footprint engine for automated grading
//!
//! This library records the values a program produces while it runs, merges
//! recordings from several execution segments into one deduplicated
//! footprint, and infers the asymptotic complexity of timed operations so a
//! footprint can be checked against reference solutions.
//!
//! The pieces, in the order data flows through them:
//!
//! - [`fingerprint`]: content identity of heterogeneous runtime values
//! - [`tracing_state`] and [`capture`]: the single active recording session
//! - [`footprint`]: the recorded footprint and the segment combiner
//! - [`complexity`]: best-fit complexity classes for timing samples
//! - [`reference`] and [`report`]: checking footprints and rendering results
//! - [`check`]: the scoped orchestrator tying the above together
//! - [`cache`] and [`workers`]: persistence and isolated parallel grading

pub mod cache;
pub mod capture;
pub mod check;
pub mod complexity;
pub mod config;
pub mod fingerprint;
pub mod footprint;
pub mod reference;
pub mod report;
pub mod step_clock;
pub mod tracing_state;
pub mod workers;
