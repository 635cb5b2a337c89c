#![doc = include_str!("../README.md")]

//! Belief traces for rule synthesis.
//!
//! A trace is read once, validated at ingestion, and is read-only
//! afterwards.

pub mod belief;
pub mod error;
pub mod reader;
pub mod trace;

pub use belief::{BeliefDistribution, BeliefKind, SIMPLEX_TOLERANCE};
pub use error::TraceError;
pub use trace::{ActionLabel, BeliefTrace, Run, StepContext, StepRef, TraceStep};
