//! `rulesynth inspect`: trace summary.

use std::collections::BTreeMap;
use std::path::Path;

use miette::IntoDiagnostic;
use serde::Serialize;

use rulesynth_trace::reader::load_trace;
use rulesynth_trace::{BeliefKind, BeliefTrace};

use super::helpers::{emit, parse_output_format, OutputFormat};

#[derive(Debug, Serialize)]
pub(crate) struct TraceSummary {
    pub(crate) runs: usize,
    pub(crate) steps: usize,
    pub(crate) labels: Option<usize>,
    pub(crate) kind: Option<BeliefKind>,
    pub(crate) actions: BTreeMap<String, usize>,
}

pub(crate) fn summarize(trace: &BeliefTrace) -> TraceSummary {
    let mut actions = BTreeMap::new();
    for step in trace.iter_steps() {
        *actions.entry(step.step.action.to_string()).or_insert(0) += 1;
    }
    TraceSummary {
        runs: trace.runs().len(),
        steps: trace.len(),
        labels: trace.dimension(),
        kind: trace.kind(),
        actions,
    }
}

pub(crate) fn render_summary_text(summary: &TraceSummary) -> String {
    let mut lines = vec![format!("runs: {}", summary.runs), format!("steps: {}", summary.steps)];
    if let (Some(labels), Some(kind)) = (summary.labels, summary.kind) {
        let kind = match kind {
            BeliefKind::Categorical => "categorical",
            BeliefKind::Independent => "independent",
        };
        lines.push(format!("belief: {labels} labels ({kind})"));
    }
    lines.push("actions:".to_string());
    for (action, count) in &summary.actions {
        lines.push(format!("  {action}: {count}"));
    }
    lines.join("\n")
}

pub(crate) fn run_inspect_command(trace_path: &Path, format: &str) -> miette::Result<()> {
    let format = parse_output_format(format)?;
    let trace = load_trace(trace_path)
        .map_err(|e| miette::miette!("Failed to read trace {}: {e}", trace_path.display()))?;
    let summary = summarize(&trace);
    let text = match format {
        OutputFormat::Text => render_summary_text(&summary),
        OutputFormat::Json => serde_json::to_string_pretty(&summary).into_diagnostic()?,
    };
    emit(&text, None)
}
