use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("belief has no labels")]
    EmptyBelief,
    #[error("belief has no particles")]
    NoParticles,
    #[error("belief probability {value} for label {label} is outside [0, 1]")]
    OutOfRange { label: usize, value: f64 },
    #[error("categorical belief sums to {sum}, expected 1")]
    NotOnSimplex { sum: f64 },
    #[error("run {run}: expected step {expected}, found step {found}")]
    NonContiguous {
        run: String,
        expected: usize,
        found: usize,
    },
    #[error("run {run} step {step}: belief has {found} labels, expected {expected}")]
    DimensionMismatch {
        run: String,
        step: usize,
        expected: usize,
        found: usize,
    },
    #[error("run {run} step {step}: belief kind differs from the rest of the trace")]
    KindMismatch { run: String, step: usize },
    #[error("run {run} step {step}: {source}")]
    InvalidStep {
        run: String,
        step: usize,
        #[source]
        source: Box<TraceError>,
    },
    #[error("malformed {}: {message}", file.display())]
    Malformed { file: PathBuf, message: String },
}

impl TraceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TraceError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        TraceError::Malformed {
            file: file.into(),
            message: message.into(),
        }
    }
}
