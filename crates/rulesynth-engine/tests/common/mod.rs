#![allow(dead_code)]

use rulesynth_engine::rule::{RuleConstraint, RuleModel};
use rulesynth_trace::{ActionLabel, BeliefDistribution, BeliefTrace, Run, StepContext, TraceStep};

/// One run of two-label categorical beliefs `[p, 1 - p]`.
pub fn binary_trace(steps: &[(f64, &str)]) -> BeliefTrace {
    let steps = steps
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

/// Rule "take A when P_0 >= t".
pub fn p0_rule() -> RuleModel {
    RuleModel::new(
        "p0",
        vec![ActionLabel::from("A")],
        vec![RuleConstraint::new(vec![0], vec![])],
    )
}

/// Fewest excused steps for `p0_rule` by enumerating every subset.
pub fn brute_force_min_excused(steps: &[(f64, &str)]) -> usize {
    let n = steps.len();
    (0u32..(1 << n))
        .filter(|mask| {
            let kept = steps
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) == 0)
                .map(|(_, s)| *s);
            // need max(non-target) < t <= min(target, 1) with t > 0
            let mut upper: f64 = 1.0;
            let mut lower = f64::NEG_INFINITY;
            for (p, action) in kept {
                if action == "A" {
                    upper = upper.min(p);
                } else {
                    lower = lower.max(p);
                }
            }
            lower < upper && upper > 0.0
        })
        .map(|mask| mask.count_ones() as usize)
        .min()
        .unwrap_or(n)
}
