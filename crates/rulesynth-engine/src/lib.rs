#![doc = include_str!("../README.md")]

//! Rule synthesis engine.
//!
//! A rule is fitted in two phases on a single oracle: the fewest steps
//! that must be excused are found by binary search over an at-most bound
//! on the soft indicators, then the thresholds are tightened with those
//! indicators fixed. The ranker and report consume the fitted rule.

pub mod encoding;
pub mod error;
pub mod fitter;
pub mod ledger;
pub mod pipeline;
pub mod ranker;
pub mod report;
pub mod rule;
#[cfg(test)]
mod scripted;
pub mod session;
mod timeout;
pub mod variables;

pub use error::{FitError, PipelineError, RankError};
pub use fitter::{FitOptions, FitOutcome, FittedRule, MaxSatRuleFitter};
pub use ranker::{CounterexampleRanker, RankOptions, Ranking};
pub use rule::{RuleModel, RuleSet};
