use std::fmt;

use serde::{Deserialize, Serialize};

use crate::belief::{BeliefDistribution, BeliefKind};
use crate::error::TraceError;

/// Recorded action: a symbolic name or an integer code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionLabel {
    Code(i64),
    Name(String),
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionLabel::Code(code) => write!(f, "{code}"),
            ActionLabel::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for ActionLabel {
    fn from(name: &str) -> Self {
        ActionLabel::Name(name.to_string())
    }
}

impl From<i64> for ActionLabel {
    fn from(code: i64) -> Self {
        ActionLabel::Code(code)
    }
}

/// Environment context recorded with a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(i64, i64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collected: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// 1-based index within the run.
    pub step: usize,
    pub action: ActionLabel,
    pub belief: BeliefDistribution,
    #[serde(default)]
    pub context: StepContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub steps: Vec<TraceStep>,
}

/// A step together with the run it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct StepRef<'a> {
    /// Index of the run in the trace.
    pub run: usize,
    pub run_id: &'a str,
    pub step: &'a TraceStep,
}

/// Ordered runs of steps, validated on construction.
///
/// Step indices are contiguous from 1 within each run and every belief has
/// the same number of labels and the same kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeliefTrace {
    runs: Vec<Run>,
}

impl BeliefTrace {
    pub fn new(runs: Vec<Run>) -> Result<Self, TraceError> {
        let mut shape: Option<(usize, BeliefKind)> = None;
        for run in &runs {
            for (i, step) in run.steps.iter().enumerate() {
                let expected = i + 1;
                if step.step != expected {
                    return Err(TraceError::NonContiguous {
                        run: run.id.clone(),
                        expected,
                        found: step.step,
                    });
                }
                let this = (step.belief.len(), step.belief.kind());
                match shape {
                    None => shape = Some(this),
                    Some((dim, _)) if dim != this.0 => {
                        return Err(TraceError::DimensionMismatch {
                            run: run.id.clone(),
                            step: step.step,
                            expected: dim,
                            found: this.0,
                        })
                    }
                    Some((_, kind)) if kind != this.1 => {
                        return Err(TraceError::KindMismatch {
                            run: run.id.clone(),
                            step: step.step,
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(Self { runs })
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Total number of steps over all runs.
    pub fn len(&self) -> usize {
        self.runs.iter().map(|r| r.steps.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of belief labels, if the trace has any step.
    pub fn dimension(&self) -> Option<usize> {
        self.iter_steps().next().map(|s| s.step.belief.len())
    }

    pub fn kind(&self) -> Option<BeliefKind> {
        self.iter_steps().next().map(|s| s.step.belief.kind())
    }

    /// Steps in run order, then step order.
    pub fn iter_steps(&self) -> impl Iterator<Item = StepRef<'_>> + '_ {
        self.runs.iter().enumerate().flat_map(|(run, r)| {
            r.steps.iter().map(move |step| StepRef {
                run,
                run_id: r.id.as_str(),
                step,
            })
        })
    }

    /// Step `step` (1-based) of run index `run`.
    pub fn step(&self, run: usize, step: usize) -> Option<&TraceStep> {
        self.runs
            .get(run)
            .and_then(|r| step.checked_sub(1).and_then(|i| r.steps.get(i)))
    }
}
