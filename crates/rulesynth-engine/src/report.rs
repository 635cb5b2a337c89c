//! Text and JSON rendering of synthesis results.

use std::fmt::Write as _;

use serde::Serialize;

use rulesynth_trace::ActionLabel;

use crate::fitter::FittedRule;
use crate::pipeline::{RuleOutcome, RuleResult, SynthesisReport};
use crate::ranker::RankedStep;
use crate::rule::{BandBound, BandKind, Direction, ThresholdRef};

/// Threshold as reported: rounded to three decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdReport {
    #[serde(flatten)]
    pub threshold: ThresholdRef,
    pub direction: Direction,
    pub value: f64,
}

/// Serializable summary of one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleReport {
    Fitted {
        rule: String,
        actions: Vec<ActionLabel>,
        condition: String,
        thresholds: Vec<ThresholdReport>,
        excused: usize,
        total_steps: usize,
        minimal: bool,
        optimized: bool,
        missed: Vec<RankedStep>,
        unexpected: Vec<RankedStep>,
    },
    NoRule {
        rule: String,
    },
    Degraded {
        rule: String,
        unknown_checks: usize,
        reason: String,
        best_excused: Option<usize>,
    },
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// The fitted condition, e.g. `(P_0 >= 0.600 AND P_2 <= 0.100) OR P_1 >= 0.750`.
/// Bands read `P_[action] in [0.400, 0.600]` and `distance in [0.000, 3.162]`.
pub fn format_condition(fitted: &FittedRule) -> String {
    let shown = |tref: ThresholdRef| {
        fitted
            .threshold(tref)
            .map(|t| format!("{:.3}", t.value))
            .unwrap_or_else(|| "?".to_string())
    };
    let constraints = &fitted.rule.constraints;
    let parts: Vec<String> = constraints
        .iter()
        .enumerate()
        .map(|(c, constraint)| {
            let mut atoms: Vec<String> = Vec::new();
            if let Some(guard) = constraint.guard.as_ref().filter(|g| !g.is_trivial()) {
                atoms.push(guard.to_string());
            }
            for (label, dir) in constraint.atoms() {
                let value = shown(ThresholdRef::new(c, label));
                atoms.push(format!("P_{label} {} {value}", dir.symbol()));
            }
            for band in constraint.bands() {
                let quantity = match band {
                    BandKind::ActionBelief => "P_[action]",
                    BandKind::Distance => "distance",
                };
                let [lower, upper] =
                    BandBound::BOTH.map(|bound| shown(ThresholdRef::band(c, band, bound)));
                atoms.push(format!("{quantity} in [{lower}, {upper}]"));
            }
            let joined = atoms.join(" AND ");
            if constraints.len() > 1 && atoms.len() > 1 {
                format!("({joined})")
            } else {
                joined
            }
        })
        .collect();
    parts.join(" OR ")
}

/// One ranked step as a report line.
pub fn format_ranked_step(step: &RankedStep) -> String {
    let mut line = String::new();
    if step.anomaly {
        line.push_str("ANOMALY: ");
    }
    let _ = write!(
        line,
        "run {} step {}: action {} with belief",
        step.run_id, step.step, step.action
    );
    for (label, p) in step.belief.iter().enumerate() {
        let _ = write!(line, " P_{label} = {p:.3}");
    }
    match step.distance {
        Some(d) => {
            let _ = write!(line, " --- Hellinger = {d:.3}");
        }
        None => line.push_str(" --- Hellinger = n/a"),
    }
    line
}

fn join_actions(actions: &[ActionLabel]) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RuleReport {
    pub fn from_result(result: &RuleResult) -> Self {
        let rule = result.name.clone();
        match &result.outcome {
            RuleOutcome::Fitted { fitted, ranking } => RuleReport::Fitted {
                rule,
                actions: fitted.rule.actions.clone(),
                condition: format_condition(fitted),
                thresholds: fitted
                    .thresholds
                    .iter()
                    .map(|t| ThresholdReport {
                        threshold: t.tref,
                        direction: t.direction,
                        value: round3(t.value),
                    })
                    .collect(),
                excused: fitted.excused_count(),
                total_steps: fitted.total_steps(),
                minimal: fitted.minimal,
                optimized: fitted.optimized,
                missed: ranking.missed.clone(),
                unexpected: ranking.unexpected.clone(),
            },
            RuleOutcome::NoRule => RuleReport::NoRule { rule },
            RuleOutcome::Degraded {
                unknown_checks,
                reason,
                best_excused,
            } => RuleReport::Degraded {
                rule,
                unknown_checks: *unknown_checks,
                reason: reason.clone(),
                best_excused: *best_excused,
            },
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        match self {
            RuleReport::Fitted {
                rule,
                actions,
                condition,
                excused,
                total_steps,
                minimal,
                optimized,
                missed,
                unexpected,
                ..
            } => {
                let _ = writeln!(out, "rule {rule} (actions: {})", join_actions(actions));
                let _ = writeln!(out, "  condition: {condition}");
                let _ = write!(out, "  excused {excused} of {total_steps} steps");
                if !minimal {
                    out.push_str(" (not proven minimal)");
                }
                if !optimized {
                    out.push_str(" (thresholds not tightened)");
                }
                out.push('\n');
                for (title, steps) in [("missed actions", missed), ("unexpected actions", unexpected)] {
                    if steps.is_empty() {
                        continue;
                    }
                    let _ = writeln!(out, "  {title}:");
                    for step in steps {
                        let _ = writeln!(out, "    {}", format_ranked_step(step));
                    }
                }
            }
            RuleReport::NoRule { rule } => {
                let _ = writeln!(out, "rule {rule}: no rule could explain these observations");
            }
            RuleReport::Degraded {
                rule,
                unknown_checks,
                reason,
                best_excused,
            } => {
                let _ = write!(
                    out,
                    "rule {rule}: degraded after {unknown_checks} unknown check(s): {reason}"
                );
                if let Some(best) = best_excused {
                    let _ = write!(out, " (best bound found: {best} excused)");
                }
                out.push('\n');
            }
        }
        out
    }
}

/// Serializable view of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDocument {
    pub rules: Vec<RuleReport>,
}

impl SynthesisReport {
    pub fn rule_reports(&self) -> Vec<RuleReport> {
        self.results.iter().map(RuleReport::from_result).collect()
    }

    pub fn render_text(&self) -> String {
        self.rule_reports()
            .iter()
            .map(RuleReport::render_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ReportDocument {
            rules: self.rule_reports(),
        })
    }
}
