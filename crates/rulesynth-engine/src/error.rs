use std::path::PathBuf;

use thiserror::Error;

use rulesynth_trace::TraceError;

/// Errors raised while fitting one rule.
#[derive(Debug, Error)]
pub enum FitError {
    /// The rule does not fit the trace: bad label, empty trace, bad
    /// threshold reference. Raised before any oracle interaction.
    #[error("input shape error: {0}")]
    InputShape(String),
    #[error("oracle error: {0}")]
    Oracle(String),
    #[error("scope underflow: pop without a matching push")]
    ScopeUnderflow,
    #[error("scope leak: expected depth {expected}, found {found}")]
    ScopeLeak { expected: usize, found: usize },
    /// The indicator assignment found by the cardinality search became
    /// unsatisfiable once fixed. Aborts the whole run.
    #[error(
        "internal inconsistency in rule `{rule}`: fixed indicator assignment is unsatisfiable \
         (excused: [{}])",
        assignment.join(", ")
    )]
    InternalInconsistency {
        rule: String,
        assignment: Vec<String>,
    },
}

impl FitError {
    pub(crate) fn oracle(err: impl std::fmt::Display) -> Self {
        FitError::Oracle(err.to_string())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FitError::InternalInconsistency { .. })
    }
}

#[derive(Debug, Error)]
pub enum RankError {
    #[error("invalid ranking options: {0}")]
    InvalidOptions(String),
    #[error("excused step {step} of run {run} is not in the trace")]
    MissingStep { run: usize, step: usize },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Rank(#[from] RankError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error("invalid rule set: {0}")]
    RuleSet(String),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
