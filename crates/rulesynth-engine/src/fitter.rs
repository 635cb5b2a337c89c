//! MAX-SAT rule fitting.
//!
//! Fitting one rule runs in a single oracle scope:
//!
//! 1. threshold axioms and caller hard assertions,
//! 2. one soft clause per step, `b OR condition` for target actions and
//!    `b OR NOT condition` otherwise,
//! 3. a binary search for the smallest `k` such that at most `k`
//!    indicators can be true ([`minimize_excused`]),
//! 4. threshold tightening with the indicators fixed
//!    ([`tighten_thresholds`]).
//!
//! Every check of phase 3 and the check of phase 4 open their own scope,
//! which is popped before the next one.

use std::time::Instant;

use num::rational::BigRational;
use serde::Serialize;

use rulesynth_smt::rational;
use rulesynth_smt::solver::{ConstraintOracle, Model, SatResult};
use rulesynth_smt::sorts::SmtSort;
use rulesynth_smt::terms::SmtTerm;
use rulesynth_trace::{ActionLabel, BeliefTrace, StepContext};

use crate::encoding::{belief_rational, encode, objective_term, RuleEncoding};
use crate::error::FitError;
use crate::ledger::{SoftIndicator, SoftLedger};
use crate::rule::{Direction, Objective, RuleModel, ThresholdRef};
use crate::session::OracleSession;
use crate::timeout::{
    check_timeout_ms, deadline_exceeded, deadline_from_timeout_secs, timeout_unknown_reason,
};

/// Fitter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Timeout of each oracle check in milliseconds; zero disables it.
    pub check_timeout_ms: u64,
    /// Budget for fitting one rule in seconds; zero disables it.
    pub overall_timeout_secs: u64,
    /// Unknown checks tolerated before a rule is reported as degraded.
    pub max_unknown_checks: usize,
    /// Tightening objective for rules that do not name one.
    pub objective: Objective,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            check_timeout_ms: 10_000,
            overall_timeout_secs: 0,
            max_unknown_checks: 3,
            objective: Objective::SignedSum,
        }
    }
}

/// Value of one threshold in a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedThreshold {
    pub tref: ThresholdRef,
    pub direction: Direction,
    pub value: f64,
    #[serde(skip)]
    pub exact: BigRational,
}

/// Result of one cardinality check.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundCheck {
    /// Indicator values (aligned with the ledger) and thresholds of the
    /// model.
    Sat {
        excused: Vec<bool>,
        thresholds: Vec<FittedThreshold>,
    },
    Unsat,
    Unknown(String),
}

/// Phase 3 result: which steps are excused.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorAssignment {
    /// Aligned with the rule's ledger.
    pub excused: Vec<bool>,
    /// Thresholds of the model that produced the assignment.
    pub search_thresholds: Vec<FittedThreshold>,
    /// False when an unknown check may have hidden a smaller bound.
    pub minimal: bool,
}

impl IndicatorAssignment {
    pub fn excused_count(&self) -> usize {
        self.excused.iter().filter(|&&b| b).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaxSatOutcome {
    Found(IndicatorAssignment),
    /// The hard constraints alone are unsatisfiable.
    NoRule,
    Degraded {
        unknown_checks: usize,
        reason: String,
        best: Option<IndicatorAssignment>,
    },
}

/// Phase 4 result: concrete thresholds for a fixed indicator assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdAssignment {
    pub thresholds: Vec<FittedThreshold>,
    /// False when the tightening check was unknown and the phase 3 model
    /// was kept.
    pub optimized: bool,
}

/// A rule with thresholds and the steps it excuses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedRule {
    pub rule_index: usize,
    pub rule: RuleModel,
    pub thresholds: Vec<FittedThreshold>,
    pub ledger: SoftLedger,
    /// Aligned with `ledger`.
    pub excused: Vec<bool>,
    pub minimal: bool,
    pub optimized: bool,
}

impl FittedRule {
    pub fn threshold(&self, tref: ThresholdRef) -> Option<&FittedThreshold> {
        self.thresholds.iter().find(|t| t.tref == tref)
    }

    pub fn excused_count(&self) -> usize {
        self.excused.iter().filter(|&&b| b).count()
    }

    pub fn total_steps(&self) -> usize {
        self.ledger.len()
    }

    pub fn excused_steps(&self) -> impl Iterator<Item = &SoftIndicator> + '_ {
        self.ledger
            .iter()
            .zip(&self.excused)
            .filter(|(_, &excused)| excused)
            .map(|(entry, _)| entry)
    }

    /// Whether the fitted condition holds for `belief` at a step taking
    /// `action` in `context`.
    pub fn condition_holds(
        &self,
        context: &StepContext,
        action: &ActionLabel,
        belief: &[f64],
    ) -> bool {
        self.rule.condition_holds(context, action, belief, |tref, dir, p| {
            self.threshold(tref)
                .is_some_and(|t| dir.holds(&p, &t.value))
        })
    }

    /// Same as [`condition_holds`](Self::condition_holds), with exact
    /// rational thresholds and belief values.
    pub fn condition_holds_exact(
        &self,
        context: &StepContext,
        action: &ActionLabel,
        belief: &[f64],
    ) -> bool {
        self.rule.condition_holds(context, action, belief, |tref, dir, p| {
            self.threshold(tref)
                .is_some_and(|t| dir.holds(&belief_rational(p), &t.exact))
        })
    }
}

/// Outcome of fitting one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    Fitted(FittedRule),
    /// No assignment of thresholds satisfies the hard constraints.
    NoRule,
    Degraded {
        unknown_checks: usize,
        reason: String,
        best_excused: Option<usize>,
    },
}

/// Declare the encoding's variables and assert its axioms, hard assertions
/// and soft clauses in the current scope.
pub fn assert_encoding<O: ConstraintOracle>(
    session: &mut OracleSession<O>,
    encoding: &RuleEncoding,
) -> Result<(), FitError> {
    for (name, sort) in encoding.declarations() {
        session.declare(&name, sort)?;
    }
    for term in encoding
        .axioms
        .iter()
        .chain(&encoding.hard)
        .chain(&encoding.soft)
    {
        session.assert(term)?;
    }
    Ok(())
}

fn read_thresholds(
    encoding: &RuleEncoding,
    model: &Model,
) -> Result<Vec<FittedThreshold>, FitError> {
    encoding
        .thresholds
        .iter()
        .map(|t| {
            let exact = model.get_real(&t.name).cloned().ok_or_else(|| {
                FitError::Oracle(format!("model has no value for {}", t.name))
            })?;
            Ok(FittedThreshold {
                tref: t.tref,
                direction: t.direction,
                value: rational::to_f64(&exact),
                exact,
            })
        })
        .collect()
}

/// Check whether at most `bound` steps of the encoded rule can be excused.
///
/// The bound covers exactly the indicators of `encoding`'s ledger. The
/// check runs in its own scope.
pub fn check_at_most<O: ConstraintOracle>(
    session: &mut OracleSession<O>,
    encoding: &RuleEncoding,
    bound: usize,
) -> Result<BoundCheck, FitError> {
    let declarations = encoding.declarations();
    let vars: Vec<(&str, &SmtSort)> = declarations
        .iter()
        .map(|(name, sort)| (name.as_str(), sort))
        .collect();
    let literals = encoding.ledger.literals();
    session.scoped(|s| {
        s.assert_at_most(&literals, bound)?;
        let (result, model) = s.check(&vars)?;
        match (result, model) {
            (SatResult::Sat, Some(model)) => Ok(BoundCheck::Sat {
                excused: encoding
                    .ledger
                    .iter()
                    .map(|e| model.get_bool(&e.literal).unwrap_or(false))
                    .collect(),
                thresholds: read_thresholds(encoding, &model)?,
            }),
            (SatResult::Sat, None) => Err(FitError::Oracle(
                "satisfiable check returned no model".into(),
            )),
            (SatResult::Unsat, _) => Ok(BoundCheck::Unsat),
            (SatResult::Unknown(reason), _) => Ok(BoundCheck::Unknown(reason)),
        }
    })
}

fn apply_check_timeout<O: ConstraintOracle>(
    session: &mut OracleSession<O>,
    options: &FitOptions,
    deadline: Option<Instant>,
) -> Result<bool, FitError> {
    match check_timeout_ms(options.check_timeout_ms, deadline) {
        Some(ms) => {
            session.set_timeout_ms(ms)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Phase 3: binary search for the fewest excused steps.
///
/// The search starts from a check at the number of steps, which fails only
/// when the hard constraints are infeasible. Unknown checks are treated as
/// failures, moving the search toward larger bounds, until
/// `max_unknown_checks` of them have been seen.
pub fn minimize_excused<O: ConstraintOracle>(
    session: &mut OracleSession<O>,
    encoding: &RuleEncoding,
    options: &FitOptions,
    deadline: Option<Instant>,
) -> Result<MaxSatOutcome, FitError> {
    let total = encoding.ledger.len();
    let mut unknown_checks = 0usize;
    let degraded = |unknown_checks, reason, best| MaxSatOutcome::Degraded {
        unknown_checks,
        reason,
        best,
    };

    if !apply_check_timeout(session, options, deadline)? {
        return Ok(degraded(0, timeout_unknown_reason("cardinality search"), None));
    }
    let mut best = match check_at_most(session, encoding, total)? {
        BoundCheck::Sat {
            excused,
            thresholds,
        } => IndicatorAssignment {
            excused,
            search_thresholds: thresholds,
            minimal: true,
        },
        BoundCheck::Unsat => {
            tracing::debug!(rule = encoding.rule, "hard constraints are infeasible");
            return Ok(MaxSatOutcome::NoRule);
        }
        BoundCheck::Unknown(reason) => {
            tracing::warn!(rule = encoding.rule, bound = total, %reason, "initial check unknown");
            return Ok(degraded(1, reason, None));
        }
    };

    let mut lo = 0usize;
    let mut hi = best.excused_count();
    tracing::debug!(rule = encoding.rule, total, hi, "initial model");

    while lo < hi {
        if deadline_exceeded(deadline) || !apply_check_timeout(session, options, deadline)? {
            best.minimal = false;
            return Ok(degraded(
                unknown_checks,
                timeout_unknown_reason("cardinality search"),
                Some(best),
            ));
        }
        let mid = lo + (hi - lo) / 2;
        match check_at_most(session, encoding, mid)? {
            BoundCheck::Sat {
                excused,
                thresholds,
            } => {
                best.excused = excused;
                best.search_thresholds = thresholds;
                hi = best.excused_count().min(mid);
                tracing::debug!(rule = encoding.rule, bound = mid, excused = hi, "check sat");
            }
            BoundCheck::Unsat => {
                lo = mid + 1;
                tracing::debug!(rule = encoding.rule, bound = mid, "check unsat");
            }
            BoundCheck::Unknown(reason) => {
                unknown_checks += 1;
                best.minimal = false;
                tracing::warn!(
                    rule = encoding.rule,
                    bound = mid,
                    unknown_checks,
                    %reason,
                    "check unknown"
                );
                if unknown_checks >= options.max_unknown_checks {
                    return Ok(degraded(unknown_checks, reason, Some(best)));
                }
                lo = mid + 1;
            }
        }
    }
    Ok(MaxSatOutcome::Found(best))
}

/// Phase 4: fix every indicator to its value in `assignment` and optimize
/// the thresholds.
pub fn tighten_thresholds<O: ConstraintOracle>(
    session: &mut OracleSession<O>,
    encoding: &RuleEncoding,
    rule: &RuleModel,
    assignment: &IndicatorAssignment,
    objective: Objective,
) -> Result<ThresholdAssignment, FitError> {
    let names: Vec<&str> = encoding.thresholds.iter().map(|t| t.name.as_str()).collect();
    let real = SmtSort::Real;
    let vars: Vec<(&str, &SmtSort)> = names.iter().map(|n| (*n, &real)).collect();
    let (sense, term) = objective_term(encoding.rule, rule, objective);

    session.scoped(|s| {
        for (entry, &excused) in encoding.ledger.iter().zip(&assignment.excused) {
            let literal = SmtTerm::var(&entry.literal);
            s.assert(&if excused { literal } else { literal.not() })?;
        }
        s.optimize(sense, &term)?;
        let (result, model) = s.check(&vars)?;
        match (result, model) {
            (SatResult::Sat, Some(model)) => Ok(ThresholdAssignment {
                thresholds: read_thresholds(encoding, &model)?,
                optimized: true,
            }),
            (SatResult::Sat, None) => Err(FitError::Oracle(
                "satisfiable check returned no model".into(),
            )),
            (SatResult::Unsat, _) => Err(FitError::InternalInconsistency {
                rule: rule.name.clone(),
                assignment: encoding
                    .ledger
                    .iter()
                    .zip(&assignment.excused)
                    .filter(|(_, &b)| b)
                    .map(|(e, _)| e.literal.clone())
                    .collect(),
            }),
            (SatResult::Unknown(reason), _) => {
                tracing::warn!(
                    rule = %rule.name,
                    %reason,
                    "tightening unknown, keeping cardinality-search thresholds"
                );
                Ok(ThresholdAssignment {
                    thresholds: assignment.search_thresholds.clone(),
                    optimized: false,
                })
            }
        }
    })
}

/// Steps that are neither excused nor explained by `fitted`, decided
/// exactly.
pub fn unexplained_steps(fitted: &FittedRule, trace: &BeliefTrace) -> Vec<(usize, usize)> {
    fitted
        .ledger
        .iter()
        .zip(&fitted.excused)
        .filter(|(_, &excused)| !excused)
        .filter_map(|(entry, _)| {
            let step = trace.step(entry.run, entry.step)?;
            let holds = fitted.condition_holds_exact(&step.context, &step.action, step.belief.probs());
            (holds != entry.target).then_some((entry.run, entry.step))
        })
        .collect()
}

/// Fits rules one at a time on a single oracle.
pub struct MaxSatRuleFitter<O> {
    session: OracleSession<O>,
    options: FitOptions,
}

impl<O: ConstraintOracle> MaxSatRuleFitter<O> {
    pub fn new(oracle: O, options: FitOptions) -> Self {
        Self {
            session: OracleSession::new(oracle),
            options,
        }
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    pub fn session(&self) -> &OracleSession<O> {
        &self.session
    }

    pub fn into_oracle(self) -> O {
        self.session.into_inner()
    }

    /// Fit rule number `rule_index` to `trace`.
    pub fn fit_rule(
        &mut self,
        rule_index: usize,
        rule: &RuleModel,
        trace: &BeliefTrace,
    ) -> Result<FitOutcome, FitError> {
        let encoding = encode(rule_index, rule, trace)?;
        let objective = rule.objective.unwrap_or(self.options.objective);
        let deadline = deadline_from_timeout_secs(self.options.overall_timeout_secs);
        let options = &self.options;
        let outer = self.session.depth();

        let outcome = self.session.scoped(|s| {
            assert_encoding(s, &encoding)?;
            let assignment = match minimize_excused(s, &encoding, options, deadline)? {
                MaxSatOutcome::Found(assignment) => assignment,
                MaxSatOutcome::NoRule => return Ok(FitOutcome::NoRule),
                MaxSatOutcome::Degraded {
                    unknown_checks,
                    reason,
                    best,
                } => {
                    return Ok(FitOutcome::Degraded {
                        unknown_checks,
                        reason,
                        best_excused: best.as_ref().map(IndicatorAssignment::excused_count),
                    })
                }
            };
            let tightened = tighten_thresholds(s, &encoding, rule, &assignment, objective)?;
            Ok(FitOutcome::Fitted(FittedRule {
                rule_index,
                rule: rule.clone(),
                thresholds: tightened.thresholds,
                ledger: encoding.ledger.clone(),
                excused: assignment.excused,
                minimal: assignment.minimal,
                optimized: tightened.optimized,
            }))
        })?;
        self.session.expect_depth(outer)?;

        match &outcome {
            FitOutcome::Fitted(fitted) => {
                let unexplained = unexplained_steps(fitted, trace);
                if !unexplained.is_empty() {
                    tracing::warn!(
                        rule = %rule.name,
                        steps = ?unexplained,
                        "fitted thresholds do not explain every non-excused step exactly"
                    );
                }
                tracing::info!(
                    rule = %rule.name,
                    excused = fitted.excused_count(),
                    total = fitted.total_steps(),
                    minimal = fitted.minimal,
                    "rule fitted"
                );
            }
            FitOutcome::NoRule => {
                tracing::info!(rule = %rule.name, "no rule could explain these observations");
            }
            FitOutcome::Degraded {
                unknown_checks,
                reason,
                ..
            } => {
                tracing::warn!(rule = %rule.name, unknown_checks, %reason, "rule fit degraded");
            }
        }
        Ok(outcome)
    }
}
