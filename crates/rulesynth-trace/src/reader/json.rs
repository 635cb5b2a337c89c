use std::path::Path;

use serde::Deserialize;

use crate::belief::{BeliefDistribution, BeliefKind};
use crate::error::TraceError;
use crate::trace::{ActionLabel, BeliefTrace, Run, StepContext, TraceStep};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonTrace {
    runs: Vec<JsonRun>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonRun {
    #[serde(default)]
    id: Option<String>,
    steps: Vec<JsonStep>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonStep {
    /// Defaults to the position in the run, 1-based.
    #[serde(default)]
    step: Option<usize>,
    action: ActionLabel,
    #[serde(default)]
    belief: Option<Vec<f64>>,
    #[serde(default)]
    particles: Option<Vec<u64>>,
    #[serde(default)]
    kind: BeliefKind,
    #[serde(default)]
    position: Option<(i64, i64)>,
    #[serde(default)]
    segment: Option<usize>,
    #[serde(default)]
    collected: Vec<bool>,
}

impl JsonStep {
    fn into_step(self, index: usize) -> Result<TraceStep, TraceError> {
        let belief = match (self.belief, self.particles) {
            (Some(probs), None) => BeliefDistribution::new(self.kind, probs)?,
            (None, Some(counts)) => BeliefDistribution::from_particles(&counts)?,
            (Some(_), Some(_)) => {
                return Err(TraceError::malformed(
                    "<json>",
                    "step has both `belief` and `particles`",
                ))
            }
            (None, None) => {
                return Err(TraceError::malformed(
                    "<json>",
                    "step has neither `belief` nor `particles`",
                ))
            }
        };
        Ok(TraceStep {
            step: self.step.unwrap_or(index),
            action: self.action,
            belief,
            context: StepContext {
                position: self.position,
                segment: self.segment,
                collected: self.collected,
            },
        })
    }
}

/// Parse a JSON trace document.
pub fn parse_json_trace(text: &str) -> Result<BeliefTrace, TraceError> {
    let doc: JsonTrace = serde_json::from_str(text)?;
    let mut runs = Vec::with_capacity(doc.runs.len());
    for (r, run) in doc.runs.into_iter().enumerate() {
        let id = run.id.unwrap_or_else(|| format!("run{r}"));
        let mut steps = Vec::with_capacity(run.steps.len());
        for (i, step) in run.steps.into_iter().enumerate() {
            let step = step
                .into_step(i + 1)
                .map_err(|source| TraceError::InvalidStep {
                    run: id.clone(),
                    step: i + 1,
                    source: Box::new(source),
                })?;
            steps.push(step);
        }
        runs.push(Run { id, steps });
    }
    BeliefTrace::new(runs)
}

pub fn read_json_trace_file(path: &Path) -> Result<BeliefTrace, TraceError> {
    let text = std::fs::read_to_string(path).map_err(|e| TraceError::io(path, e))?;
    parse_json_trace(&text)
}
