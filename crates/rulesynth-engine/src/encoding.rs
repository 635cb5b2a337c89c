//! Translation of a rule and a trace into oracle terms.

use num::rational::BigRational;
use num::traits::Zero;

use rulesynth_smt::rational;
use rulesynth_smt::solver::ObjectiveSense;
use rulesynth_smt::sorts::SmtSort;
use rulesynth_smt::terms::SmtTerm;
use rulesynth_trace::{ActionLabel, BeliefKind, BeliefTrace, StepContext};

use crate::error::FitError;
use crate::ledger::SoftLedger;
use crate::rule::{
    BandBound, BandKind, Direction, HardAssertion, Objective, RuleModel, ThresholdRef,
};
use crate::variables::threshold_var;

/// One threshold unknown of the encoded rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdVar {
    pub tref: ThresholdRef,
    pub name: String,
    pub direction: Direction,
}

/// Everything the fitter asserts for one rule.
#[derive(Debug, Clone)]
pub struct RuleEncoding {
    pub rule: usize,
    pub thresholds: Vec<ThresholdVar>,
    /// `0 < t <= 1` per label threshold, `sum(t) = 1` for constraints that
    /// cover every label of a categorical trace, `0 <= lower < upper <= 1`
    /// per belief band and `0 <= near <= far` per distance band.
    pub axioms: Vec<SmtTerm>,
    pub hard: Vec<SmtTerm>,
    /// One `indicator OR (NOT) condition` clause per ledger entry.
    pub soft: Vec<SmtTerm>,
    pub ledger: SoftLedger,
}

impl RuleEncoding {
    pub fn declarations(&self) -> Vec<(String, SmtSort)> {
        self.thresholds
            .iter()
            .map(|t| (t.name.clone(), SmtSort::Real))
            .chain(
                self.ledger
                    .iter()
                    .map(|e| (e.literal.clone(), SmtSort::Bool)),
            )
            .collect()
    }

    pub fn threshold_name(&self, tref: ThresholdRef) -> Option<&str> {
        self.thresholds
            .iter()
            .find(|t| t.tref == tref)
            .map(|t| t.name.as_str())
    }
}

/// Exact value of a recorded belief entry or distance, taken from its
/// shortest decimal form so that `0.3` becomes `3/10`.
pub fn belief_rational(p: f64) -> BigRational {
    rational::parse_decimal(&p.to_string())
        .or_else(|| rational::from_f64(p))
        .unwrap_or_else(BigRational::zero)
}

/// Encode rule number `rule_index` against `trace`.
///
/// Fails with [`FitError::InputShape`] when the trace is empty or the rule
/// does not fit its belief dimension.
pub fn encode(
    rule_index: usize,
    rule: &RuleModel,
    trace: &BeliefTrace,
) -> Result<RuleEncoding, FitError> {
    let dimension = trace
        .dimension()
        .ok_or_else(|| FitError::InputShape("trace has no steps".into()))?;
    rule.validate(dimension)?;
    let categorical = trace.kind() == Some(BeliefKind::Categorical);

    let thresholds: Vec<ThresholdVar> = rule
        .thresholds()
        .into_iter()
        .map(|(tref, direction)| ThresholdVar {
            tref,
            name: threshold_var(rule_index, tref),
            direction,
        })
        .collect();
    let var = |tref: ThresholdRef| SmtTerm::var(threshold_var(rule_index, tref));

    let mut axioms = Vec::new();
    for t in &thresholds {
        let v = SmtTerm::var(&t.name);
        match t.tref {
            ThresholdRef::Label { .. } => {
                axioms.push(v.clone().gt(SmtTerm::real_int(0)));
                axioms.push(v.le(SmtTerm::real_int(1)));
            }
            ThresholdRef::Band {
                bound: BandBound::Lower,
                ..
            } => axioms.push(v.ge(SmtTerm::real_int(0))),
            ThresholdRef::Band {
                band: BandKind::ActionBelief,
                bound: BandBound::Upper,
                ..
            } => axioms.push(v.le(SmtTerm::real_int(1))),
            ThresholdRef::Band { .. } => {}
        }
    }
    for (c, constraint) in rule.constraints.iter().enumerate() {
        for band in constraint.bands() {
            let lower = var(ThresholdRef::band(c, band, BandBound::Lower));
            let upper = var(ThresholdRef::band(c, band, BandBound::Upper));
            axioms.push(match band {
                BandKind::ActionBelief => lower.lt(upper),
                BandKind::Distance => lower.le(upper),
            });
        }
    }
    if categorical {
        for (c, constraint) in rule.constraints.iter().enumerate() {
            let labels: Vec<usize> = constraint.atoms().map(|(l, _)| l).collect();
            if labels.len() == dimension {
                let sum = labels
                    .into_iter()
                    .map(|l| var(ThresholdRef::new(c, l)))
                    .collect();
                axioms.push(SmtTerm::sum(sum).eq(SmtTerm::real_int(1)));
            }
        }
    }

    let hard = rule
        .hard
        .iter()
        .map(|assertion| match assertion {
            HardAssertion::Bound {
                threshold,
                op,
                value,
            } => op.apply(var(*threshold), SmtTerm::real(belief_rational(*value))),
            HardAssertion::Order { lhs, op, rhs } => op.apply(var(*lhs), var(*rhs)),
        })
        .collect();

    let mut ledger = SoftLedger::new(rule_index);
    let mut soft = Vec::with_capacity(trace.len());
    for step_ref in trace.iter_steps() {
        let step = step_ref.step;
        let target = rule.is_target(&step.action);
        if target {
            rule.validate_target_action(&step.action, dimension)?;
        }
        let literal = SmtTerm::var(&ledger.push(step_ref.run, step.step, target).literal);
        let condition = condition_term(
            rule_index,
            rule,
            &step.context,
            &step.action,
            step.belief.probs(),
        );
        let satisfied = if target { condition } else { condition.not() };
        soft.push(SmtTerm::or(vec![literal, satisfied]));
    }

    tracing::debug!(
        rule = %rule.name,
        thresholds = thresholds.len(),
        steps = ledger.len(),
        "encoded rule"
    );

    Ok(RuleEncoding {
        rule: rule_index,
        thresholds,
        axioms,
        hard,
        soft,
        ledger,
    })
}

/// The rule condition for one step. Guards, action items and distances are
/// decided here, so a constraint that cannot hold at the step contributes
/// nothing.
pub fn condition_term(
    rule_index: usize,
    rule: &RuleModel,
    context: &StepContext,
    action: &ActionLabel,
    belief: &[f64],
) -> SmtTerm {
    let mut disjuncts = Vec::new();
    for (c, constraint) in rule.constraints.iter().enumerate() {
        let Some(step_atoms) = constraint.step_atoms(c, context, action, belief) else {
            continue;
        };
        let atoms: Vec<SmtTerm> = step_atoms
            .into_iter()
            .map(|(tref, dir, value)| {
                let p = SmtTerm::real(belief_rational(value));
                let t = SmtTerm::var(threshold_var(rule_index, tref));
                match dir {
                    Direction::GreaterEqual => p.ge(t),
                    Direction::LowerEqual => p.le(t),
                }
            })
            .collect();
        disjuncts.push(if atoms.len() == 1 {
            atoms.into_iter().next().unwrap_or(SmtTerm::bool(true))
        } else {
            SmtTerm::and(atoms)
        });
    }
    match disjuncts.len() {
        0 => SmtTerm::bool(false),
        1 => disjuncts.into_iter().next().unwrap_or(SmtTerm::bool(false)),
        _ => SmtTerm::or(disjuncts),
    }
}

/// Tightening objective of the rule.
pub fn objective_term(
    rule_index: usize,
    rule: &RuleModel,
    objective: Objective,
) -> (ObjectiveSense, SmtTerm) {
    let var = |tref: ThresholdRef| SmtTerm::var(threshold_var(rule_index, tref));
    match objective {
        Objective::SignedSum => {
            let terms = rule
                .thresholds()
                .into_iter()
                .map(|(tref, dir)| match (tref, dir) {
                    // Bands are narrowed: `upper - lower` is minimized.
                    (ThresholdRef::Band { .. }, Direction::GreaterEqual) => var(tref).neg(),
                    (ThresholdRef::Band { .. }, Direction::LowerEqual) => var(tref),
                    (ThresholdRef::Label { .. }, Direction::GreaterEqual) => var(tref),
                    (ThresholdRef::Label { .. }, Direction::LowerEqual) => var(tref).neg(),
                })
                .collect();
            (ObjectiveSense::Minimize, SmtTerm::sum(terms))
        }
        Objective::Maximize { threshold } => (ObjectiveSense::Maximize, var(threshold)),
        Objective::Minimize { threshold } => (ObjectiveSense::Minimize, var(threshold)),
        Objective::MaximizeMargin { upper, lower } => {
            (ObjectiveSense::Maximize, var(upper).sub(var(lower)))
        }
    }
}
