//! Fit and rank every rule of a rule set on one oracle.

use serde::Serialize;

use rulesynth_smt::solver::ConstraintOracle;
use rulesynth_trace::BeliefTrace;

use crate::encoding::encode;
use crate::error::PipelineError;
use crate::fitter::{FitOptions, FitOutcome, FittedRule, MaxSatRuleFitter};
use crate::ranker::{CounterexampleRanker, RankOptions, Ranking};
use crate::rule::RuleSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisOptions {
    pub fit: FitOptions,
    pub rank: RankOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleOutcome {
    Fitted {
        fitted: FittedRule,
        ranking: Ranking,
    },
    NoRule,
    Degraded {
        unknown_checks: usize,
        reason: String,
        best_excused: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    pub name: String,
    pub outcome: RuleOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SynthesisReport {
    pub results: Vec<RuleResult>,
}

impl SynthesisReport {
    pub fn fitted(&self) -> impl Iterator<Item = (&FittedRule, &Ranking)> + '_ {
        self.results.iter().filter_map(|r| match &r.outcome {
            RuleOutcome::Fitted { fitted, ranking } => Some((fitted, ranking)),
            _ => None,
        })
    }

    pub fn anomalies(&self) -> usize {
        self.fitted().map(|(_, ranking)| ranking.anomalies()).sum()
    }
}

/// Fit every rule of `rules` against `trace`, in order, then rank the steps
/// each fitted rule excuses.
///
/// Every rule is checked against the trace's shape before the oracle sees
/// anything, so a bad label or threshold reference in any rule fails the
/// whole run with
/// [`FitError::InputShape`](crate::error::FitError::InputShape). Any error while fitting aborts
/// the run as well.
pub fn synthesize<O: ConstraintOracle>(
    trace: &BeliefTrace,
    rules: &RuleSet,
    oracle: O,
    options: &SynthesisOptions,
) -> Result<SynthesisReport, PipelineError> {
    let mut rank_options = options.rank.clone();
    if let Some(threshold) = rules.anomaly_threshold {
        rank_options.anomaly_threshold = threshold;
    }
    let mut ranker = CounterexampleRanker::from_options(rank_options)?;
    let mut fitter = MaxSatRuleFitter::new(oracle, options.fit.clone());

    for (index, rule) in rules.rules.iter().enumerate() {
        encode(index, rule, trace).inspect_err(|err| {
            tracing::error!(rule = %rule.name, error = %err, "rule does not fit the trace");
        })?;
    }

    tracing::info!(
        rules = rules.rules.len(),
        runs = trace.runs().len(),
        steps = trace.len(),
        "synthesizing rules"
    );

    let mut results = Vec::with_capacity(rules.rules.len());
    for (index, rule) in rules.rules.iter().enumerate() {
        let outcome = match fitter.fit_rule(index, rule, trace)? {
            FitOutcome::Fitted(fitted) => {
                let ranking = ranker.rank(&fitted, trace)?;
                RuleOutcome::Fitted { fitted, ranking }
            }
            FitOutcome::NoRule => RuleOutcome::NoRule,
            FitOutcome::Degraded {
                unknown_checks,
                reason,
                best_excused,
            } => RuleOutcome::Degraded {
                unknown_checks,
                reason,
                best_excused,
            },
        };
        results.push(RuleResult {
            name: rule.name.clone(),
            outcome,
        });
    }
    Ok(SynthesisReport { results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulesynth_smt::backends::z3_backend::Z3Solver;
    use rulesynth_trace::{ActionLabel, BeliefDistribution, Run, StepContext, TraceStep};

    use crate::error::FitError;
    use crate::rule::{RuleConstraint, RuleModel};
    use crate::scripted::{Reply, ScriptedOracle};

    fn trace() -> BeliefTrace {
        let steps = [(0.9, "A"), (0.8, "A"), (0.1, "B")]
            .iter()
            .enumerate()
            .map(|(i, &(p, action))| TraceStep {
                step: i + 1,
                action: ActionLabel::from(action),
                belief: BeliefDistribution::categorical(vec![p, 1.0 - p]).expect("belief"),
                context: StepContext::default(),
            })
            .collect();
        BeliefTrace::new(vec![Run {
            id: "r0".into(),
            steps,
        }])
        .expect("trace")
    }

    fn seeded() -> SynthesisOptions {
        SynthesisOptions {
            rank: RankOptions {
                seed: Some(1),
                ..RankOptions::default()
            },
            ..SynthesisOptions::default()
        }
    }

    #[test]
    fn shape_error_in_any_rule_aborts_before_the_oracle() {
        let rules = RuleSet::new(vec![
            RuleModel::new(
                "good",
                vec![ActionLabel::from("A")],
                vec![RuleConstraint::new(vec![0], vec![])],
            ),
            RuleModel::new(
                "bad",
                vec![ActionLabel::from("A")],
                vec![RuleConstraint::new(vec![5], vec![])],
            ),
        ]);
        let mut oracle = ScriptedOracle::new([]);
        let err = synthesize(&trace(), &rules, &mut oracle, &seeded()).unwrap_err();
        assert!(
            matches!(err, PipelineError::Fit(FitError::InputShape(_))),
            "{err:?}"
        );
        assert_eq!(oracle.checks, 0);
        assert!(oracle.bounds.is_empty());
    }

    #[test]
    fn valid_rules_are_fitted_and_ranked() {
        let rules = RuleSet::new(vec![RuleModel::new(
            "good",
            vec![ActionLabel::from("A")],
            vec![RuleConstraint::new(vec![0], vec![])],
        )]);
        let report = synthesize(&trace(), &rules, Z3Solver::new(), &seeded()).expect("report");
        let (fitted, ranking) = report.fitted().next().expect("rule fitted");
        assert_eq!(fitted.rule.name, "good");
        assert_eq!(fitted.excused_count(), 0);
        assert!(ranking.is_empty());
        assert_eq!(report.anomalies(), 0);
    }

    #[test]
    fn internal_inconsistency_aborts_the_run() {
        let rules = RuleSet::new(vec![
            RuleModel::new(
                "first",
                vec![ActionLabel::from("A")],
                vec![RuleConstraint::new(vec![0], vec![])],
            ),
            RuleModel::new(
                "second",
                vec![ActionLabel::from("B")],
                vec![RuleConstraint::new(vec![1], vec![])],
            ),
        ]);
        // Initial check sat with nothing excused, then unsat tightening.
        let mut oracle = ScriptedOracle::new([Reply::Sat(0), Reply::Unsat]);
        let err = synthesize(&trace(), &rules, &mut oracle, &seeded()).unwrap_err();
        assert!(
            matches!(
                &err,
                PipelineError::Fit(FitError::InternalInconsistency { rule, .. }) if rule == "first"
            ),
            "{err:?}"
        );
        // The second rule was never fitted.
        assert_eq!(oracle.checks, 2);
        assert_eq!(oracle.bounds, vec![3]);
    }

    #[test]
    fn rule_set_threshold_overrides_rank_options() {
        let mut rules = RuleSet::new(Vec::new());
        rules.anomaly_threshold = Some(2.0);
        let err = synthesize(&trace(), &rules, Z3Solver::new(), &SynthesisOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Rank(_)));
    }
}
