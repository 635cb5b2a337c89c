//! Rule models: target actions plus an OR of threshold constraints.
//!
//! A constraint is a conjunction of `belief[l] >= t` atoms (its
//! `greater_equal` labels) and `belief[l] <= t` atoms (its `lower_equal`
//! labels), optionally gated by a [`ContextGuard`]. Every (constraint,
//! label) pair owns one threshold unknown, addressed by a [`ThresholdRef`].
//!
//! An [`ActionIndexed`] constraint additionally reads an item index off the
//! step's action (`check 2` is about item 2) and bounds the belief in that
//! item, or the distance from the agent to that item, by a band of two
//! thresholds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use rulesynth_smt::terms::SmtTerm;
use rulesynth_trace::{ActionLabel, StepContext};

use crate::error::{FitError, PipelineError};

/// Comparison used by hard assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "=")]
    Eq,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "=",
        }
    }

    pub fn apply(self, lhs: SmtTerm, rhs: SmtTerm) -> SmtTerm {
        match self {
            CmpOp::Lt => lhs.lt(rhs),
            CmpOp::Le => lhs.le(rhs),
            CmpOp::Gt => lhs.gt(rhs),
            CmpOp::Ge => lhs.ge(rhs),
            CmpOp::Eq => lhs.eq(rhs),
        }
    }
}

/// Side of a threshold atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `belief[l] >= t`
    GreaterEqual,
    /// `belief[l] <= t`
    LowerEqual,
}

impl Direction {
    pub fn symbol(self) -> &'static str {
        match self {
            Direction::GreaterEqual => ">=",
            Direction::LowerEqual => "<=",
        }
    }

    /// Whether `value` satisfies the atom against `threshold`.
    pub fn holds<T: PartialOrd>(self, value: &T, threshold: &T) -> bool {
        match self {
            Direction::GreaterEqual => value >= threshold,
            Direction::LowerEqual => value <= threshold,
        }
    }
}

/// Quantity bounded by a band of an action-indexed constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandKind {
    /// Belief in the item the action is about.
    ActionBelief,
    /// Euclidean distance from the step position to that item.
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandBound {
    Lower,
    Upper,
}

impl BandBound {
    pub const BOTH: [BandBound; 2] = [BandBound::Lower, BandBound::Upper];

    pub fn direction(self) -> Direction {
        match self {
            BandBound::Lower => Direction::GreaterEqual,
            BandBound::Upper => Direction::LowerEqual,
        }
    }

    fn name(self) -> &'static str {
        match self {
            BandBound::Lower => "lower",
            BandBound::Upper => "upper",
        }
    }
}

/// A threshold unknown of a rule.
///
/// In rule files a label threshold is `{"constraint": 0, "label": 2}` and a
/// band bound is `{"constraint": 0, "band": "distance", "bound": "upper"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdRef {
    /// Threshold of `label` in constraint number `constraint`.
    Label { constraint: usize, label: usize },
    /// One end of a band of an action-indexed constraint.
    Band {
        constraint: usize,
        band: BandKind,
        bound: BandBound,
    },
}

impl ThresholdRef {
    pub const fn new(constraint: usize, label: usize) -> Self {
        ThresholdRef::Label { constraint, label }
    }

    pub const fn band(constraint: usize, band: BandKind, bound: BandBound) -> Self {
        ThresholdRef::Band {
            constraint,
            band,
            bound,
        }
    }

    pub fn constraint(self) -> usize {
        match self {
            ThresholdRef::Label { constraint, .. } | ThresholdRef::Band { constraint, .. } => {
                constraint
            }
        }
    }
}

impl fmt::Display for ThresholdRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ThresholdRef::Label { constraint, label } => write!(f, "c{constraint}.P_{label}"),
            ThresholdRef::Band {
                constraint,
                band: BandKind::ActionBelief,
                bound,
            } => write!(f, "c{constraint}.P_[action].{}", bound.name()),
            ThresholdRef::Band {
                constraint,
                band: BandKind::Distance,
                bound,
            } => write!(f, "c{constraint}.distance.{}", bound.name()),
        }
    }
}

/// Caller-supplied constraint on the thresholds, asserted with the
/// probability axioms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HardAssertion {
    Bound {
        threshold: ThresholdRef,
        op: CmpOp,
        value: f64,
    },
    Order {
        lhs: ThresholdRef,
        op: CmpOp,
        rhs: ThresholdRef,
    },
}

impl HardAssertion {
    fn refs(&self) -> Vec<ThresholdRef> {
        match self {
            HardAssertion::Bound { threshold, .. } => vec![*threshold],
            HardAssertion::Order { lhs, rhs, .. } => vec![*lhs, *rhs],
        }
    }
}

/// What the tightening phase optimizes once the excused steps are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Objective {
    /// Minimize the sum of `+t` over greater-equal thresholds and `-t` over
    /// lower-equal thresholds.
    #[default]
    SignedSum,
    Maximize { threshold: ThresholdRef },
    Minimize { threshold: ThresholdRef },
    /// Maximize `upper - lower`.
    MaximizeMargin {
        upper: ThresholdRef,
        lower: ThresholdRef,
    },
}

impl Objective {
    fn refs(&self) -> Vec<ThresholdRef> {
        match self {
            Objective::SignedSum => Vec::new(),
            Objective::Maximize { threshold } | Objective::Minimize { threshold } => {
                vec![*threshold]
            }
            Objective::MaximizeMargin { upper, lower } => vec![*upper, *lower],
        }
    }
}

/// Condition on the step context under which a constraint applies. Unset
/// fields always hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextGuard {
    /// The step's segment is one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<usize>>,
    /// The step's position is this cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(i64, i64)>,
    /// This item has not been collected yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncollected: Option<usize>,
    /// This label has the largest belief.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant: Option<usize>,
}

impl ContextGuard {
    /// The context part of the guard. A step without the relevant context
    /// field fails `segments` and `position`; missing collection flags count
    /// as not collected.
    pub fn context_holds(&self, context: &StepContext) -> bool {
        if let Some(segments) = &self.segments {
            match context.segment {
                Some(segment) if segments.contains(&segment) => {}
                _ => return false,
            }
        }
        if let Some(cell) = self.position {
            if context.position != Some(cell) {
                return false;
            }
        }
        if let Some(item) = self.uncollected {
            if context.collected.get(item).copied().unwrap_or(false) {
                return false;
            }
        }
        true
    }

    /// The belief part of the guard.
    pub fn belief_holds(&self, belief: &[f64]) -> bool {
        let Some(label) = self.dominant else {
            return true;
        };
        let Some(&p) = belief.get(label) else {
            return false;
        };
        // First maximum wins, as in `BeliefDistribution::dominant_label`.
        belief[..label].iter().all(|&q| q < p) && belief[label..].iter().all(|&q| q <= p)
    }

    pub fn holds(&self, context: &StepContext, belief: &[f64]) -> bool {
        self.context_holds(context) && self.belief_holds(belief)
    }

    pub fn is_trivial(&self) -> bool {
        self.segments.is_none()
            && self.position.is_none()
            && self.uncollected.is_none()
            && self.dominant.is_none()
    }
}

impl fmt::Display for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(segments) = &self.segments {
            let list: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
            parts.push(format!("segment in {{{}}}", list.join(", ")));
        }
        if let Some((x, y)) = self.position {
            parts.push(format!("position = ({x}, {y})"));
        }
        if let Some(item) = self.uncollected {
            parts.push(format!("item {item} not collected"));
        }
        if let Some(label) = self.dominant {
            parts.push(format!("P_{label} dominant"));
        }
        write!(f, "{}", parts.join(" AND "))
    }
}

/// How an action names the item it is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionIndex {
    /// Integer codes are the item; names end in it, as in `check 3`.
    #[default]
    Suffix,
    /// Item of each action name. Unlisted actions name no item.
    Map(BTreeMap<String, usize>),
}

impl ActionIndex {
    pub fn resolve(&self, action: &ActionLabel) -> Option<usize> {
        match (self, action) {
            (ActionIndex::Suffix, ActionLabel::Code(code)) => usize::try_from(*code).ok(),
            (ActionIndex::Suffix, ActionLabel::Name(name)) => {
                name.split_whitespace().last()?.parse().ok()
            }
            (ActionIndex::Map(items), action) => items.get(&action.to_string()).copied(),
        }
    }
}

/// Bands over the item named by the step's action. The constraint is false
/// at steps whose action names no item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionIndexed {
    #[serde(default)]
    pub index: ActionIndex,
    /// `lower <= belief[item] <= upper`.
    #[serde(default)]
    pub belief_band: bool,
    /// Item positions; adds `near <= |position - items[item]| <= far`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_to: Option<Vec<(i64, i64)>>,
}

impl ActionIndexed {
    /// Bands in threshold order.
    pub fn bands(&self) -> Vec<BandKind> {
        let mut bands = Vec::new();
        if self.belief_band {
            bands.push(BandKind::ActionBelief);
        }
        if self.distance_to.is_some() {
            bands.push(BandKind::Distance);
        }
        bands
    }

    /// Whether `item` is addressable by every band over `dimension` labels.
    fn item_in_range(&self, item: usize, dimension: usize) -> bool {
        (!self.belief_band || item < dimension)
            && self.distance_to.as_ref().map_or(true, |items| item < items.len())
    }
}

fn euclidean(a: (i64, i64), b: (i64, i64)) -> f64 {
    let dx = a.0 as f64 - b.0 as f64;
    let dy = a.1 as f64 - b.1 as f64;
    dx.hypot(dy)
}

/// One threshold atom at a step: the unknown, its side, and the observed
/// value it is compared with.
pub type StepAtom = (ThresholdRef, Direction, f64);

/// One disjunct of a rule condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConstraint {
    #[serde(default)]
    pub greater_equal: Vec<usize>,
    #[serde(default)]
    pub lower_equal: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<ContextGuard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_indexed: Option<ActionIndexed>,
}

impl RuleConstraint {
    pub fn new(greater_equal: Vec<usize>, lower_equal: Vec<usize>) -> Self {
        Self {
            greater_equal,
            lower_equal,
            guard: None,
            action_indexed: None,
        }
    }

    pub fn with_guard(mut self, guard: ContextGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_action_indexed(mut self, indexed: ActionIndexed) -> Self {
        self.action_indexed = Some(indexed);
        self
    }

    pub fn bands(&self) -> Vec<BandKind> {
        self.action_indexed
            .as_ref()
            .map(ActionIndexed::bands)
            .unwrap_or_default()
    }

    /// Item named by `action`, for action-indexed constraints.
    pub fn action_item(&self, action: &ActionLabel) -> Option<usize> {
        self.action_indexed.as_ref()?.index.resolve(action)
    }

    /// Distance from `context`'s position to the item named by `action`.
    pub fn item_distance(&self, context: &StepContext, action: &ActionLabel) -> Option<f64> {
        let items = self.action_indexed.as_ref()?.distance_to.as_ref()?;
        let item = *items.get(self.action_item(action)?)?;
        Some(euclidean(context.position?, item))
    }

    /// The atoms constraint number `c` asserts at a step, or `None` when the
    /// constraint cannot hold there: its guard fails, the action names no
    /// item, or a compared value is missing.
    pub fn step_atoms(
        &self,
        c: usize,
        context: &StepContext,
        action: &ActionLabel,
        belief: &[f64],
    ) -> Option<Vec<StepAtom>> {
        if !self.guard_holds(context, belief) {
            return None;
        }
        let mut atoms = Vec::new();
        for (label, dir) in self.atoms() {
            atoms.push((ThresholdRef::new(c, label), dir, *belief.get(label)?));
        }
        let Some(indexed) = &self.action_indexed else {
            return Some(atoms);
        };
        let item = indexed.index.resolve(action)?;
        for band in indexed.bands() {
            let value = match band {
                BandKind::ActionBelief => *belief.get(item)?,
                BandKind::Distance => self.item_distance(context, action)?,
            };
            for bound in BandBound::BOTH {
                atoms.push((ThresholdRef::band(c, band, bound), bound.direction(), value));
            }
        }
        Some(atoms)
    }

    /// Atoms in declaration order: greater-equal labels, then lower-equal.
    pub fn atoms(&self) -> impl Iterator<Item = (usize, Direction)> + '_ {
        self.greater_equal
            .iter()
            .map(|&l| (l, Direction::GreaterEqual))
            .chain(self.lower_equal.iter().map(|&l| (l, Direction::LowerEqual)))
    }

    pub fn direction_of(&self, label: usize) -> Option<Direction> {
        self.atoms().find(|(l, _)| *l == label).map(|(_, d)| d)
    }

    pub fn context_holds(&self, context: &StepContext) -> bool {
        self.guard.as_ref().map_or(true, |g| g.context_holds(context))
    }

    pub fn guard_holds(&self, context: &StepContext, belief: &[f64]) -> bool {
        self.guard.as_ref().map_or(true, |g| g.holds(context, belief))
    }
}

/// A rule to fit: the target actions and the ordered constraints whose OR is
/// the rule condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleModel {
    pub name: String,
    pub actions: Vec<ActionLabel>,
    pub constraints: Vec<RuleConstraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hard: Vec<HardAssertion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<Objective>,
}

impl RuleModel {
    pub fn new(
        name: impl Into<String>,
        actions: Vec<ActionLabel>,
        constraints: Vec<RuleConstraint>,
    ) -> Self {
        Self {
            name: name.into(),
            actions,
            constraints,
            hard: Vec::new(),
            objective: None,
        }
    }

    pub fn with_hard(mut self, assertion: HardAssertion) -> Self {
        self.hard.push(assertion);
        self
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = Some(objective);
        self
    }

    pub fn is_target(&self, action: &ActionLabel) -> bool {
        self.actions.contains(action)
    }

    /// Every threshold of the rule with its atom direction, in constraint
    /// order: label atoms, then band bounds.
    pub fn thresholds(&self) -> Vec<(ThresholdRef, Direction)> {
        let mut thresholds = Vec::new();
        for (c, constraint) in self.constraints.iter().enumerate() {
            thresholds.extend(
                constraint
                    .atoms()
                    .map(|(label, dir)| (ThresholdRef::new(c, label), dir)),
            );
            for band in constraint.bands() {
                thresholds.extend(
                    BandBound::BOTH
                        .map(|bound| (ThresholdRef::band(c, band, bound), bound.direction())),
                );
            }
        }
        thresholds
    }

    pub fn direction_of(&self, tref: ThresholdRef) -> Option<Direction> {
        let constraint = self.constraints.get(tref.constraint())?;
        match tref {
            ThresholdRef::Label { label, .. } => constraint.direction_of(label),
            ThresholdRef::Band { band, bound, .. } => constraint
                .bands()
                .contains(&band)
                .then(|| bound.direction()),
        }
    }

    /// Labels referenced by any constraint, ascending.
    pub fn referenced_labels(&self) -> Vec<usize> {
        let labels: BTreeSet<usize> = self
            .constraints
            .iter()
            .flat_map(|c| c.atoms().map(|(l, _)| l))
            .collect();
        labels.into_iter().collect()
    }

    /// Labels the condition reads at a step taking `action`: the referenced
    /// labels plus the item of every action-indexed belief band.
    pub fn step_labels(&self, action: &ActionLabel) -> Vec<usize> {
        let mut labels: BTreeSet<usize> = self.referenced_labels().into_iter().collect();
        for constraint in &self.constraints {
            let banded = constraint
                .action_indexed
                .as_ref()
                .is_some_and(|indexed| indexed.belief_band);
            if let Some(item) = constraint.action_item(action).filter(|_| banded) {
                labels.insert(item);
            }
        }
        labels.into_iter().collect()
    }

    /// Check the rule against a trace of `dimension` labels.
    pub fn validate(&self, dimension: usize) -> Result<(), FitError> {
        let shape = |msg: String| FitError::InputShape(format!("rule `{}`: {msg}", self.name));
        if self.constraints.is_empty() {
            return Err(shape("no constraints".into()));
        }
        for (c, constraint) in self.constraints.iter().enumerate() {
            if let Some(indexed) = &constraint.action_indexed {
                if indexed.bands().is_empty() {
                    return Err(shape(format!("action-indexed constraint {c} bounds nothing")));
                }
                if indexed.distance_to.as_ref().is_some_and(Vec::is_empty) {
                    return Err(shape(format!("constraint {c} has no item positions")));
                }
                if let ActionIndex::Map(items) = &indexed.index {
                    for (action, &item) in items {
                        if !indexed.item_in_range(item, dimension) {
                            return Err(shape(format!(
                                "constraint {c} maps action `{action}` to unknown item {item}"
                            )));
                        }
                    }
                }
            } else if constraint.greater_equal.is_empty() && constraint.lower_equal.is_empty() {
                return Err(shape(format!("constraint {c} references no label")));
            }
            let mut seen = BTreeSet::new();
            for (label, _) in constraint.atoms() {
                if label >= dimension {
                    return Err(shape(format!(
                        "constraint {c} references label {label} but beliefs have {dimension} labels"
                    )));
                }
                if !seen.insert(label) {
                    return Err(shape(format!(
                        "constraint {c} references label {label} more than once"
                    )));
                }
            }
            if let Some(label) = constraint.guard.as_ref().and_then(|g| g.dominant) {
                if label >= dimension {
                    return Err(shape(format!(
                        "constraint {c} guard names dominant label {label} but beliefs have {dimension} labels"
                    )));
                }
            }
        }
        let refs = self
            .hard
            .iter()
            .flat_map(HardAssertion::refs)
            .chain(self.objective.iter().flat_map(Objective::refs));
        for tref in refs {
            if self.direction_of(tref).is_none() {
                return Err(shape(format!("no threshold {tref}")));
            }
        }
        for assertion in &self.hard {
            if let HardAssertion::Bound { value, .. } = assertion {
                if !value.is_finite() {
                    return Err(shape(format!("hard bound {value} is not finite")));
                }
            }
        }
        Ok(())
    }

    /// Check that a target step taking `action` names an item every
    /// action-indexed constraint can address.
    pub fn validate_target_action(
        &self,
        action: &ActionLabel,
        dimension: usize,
    ) -> Result<(), FitError> {
        for (c, constraint) in self.constraints.iter().enumerate() {
            let Some(indexed) = &constraint.action_indexed else {
                continue;
            };
            if let Some(item) = indexed.index.resolve(action) {
                if !indexed.item_in_range(item, dimension) {
                    return Err(FitError::InputShape(format!(
                        "rule `{}`: action `{action}` names item {item}, which constraint {c} cannot address",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Evaluate the rule condition at one step. `atom` decides each
    /// threshold atom from its reference, direction and observed value.
    pub fn condition_holds<F>(
        &self,
        context: &StepContext,
        action: &ActionLabel,
        belief: &[f64],
        mut atom: F,
    ) -> bool
    where
        F: FnMut(ThresholdRef, Direction, f64) -> bool,
    {
        self.constraints.iter().enumerate().any(|(c, constraint)| {
            constraint
                .step_atoms(c, context, action, belief)
                .is_some_and(|atoms| atoms.into_iter().all(|(t, dir, value)| atom(t, dir, value)))
        })
    }
}

/// Rules loaded from a JSON rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    /// Overrides the ranker's anomaly threshold when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_threshold: Option<f64>,
    pub rules: Vec<RuleModel>,
}

impl RuleSet {
    pub fn new(rules: Vec<RuleModel>) -> Self {
        Self {
            anomaly_threshold: None,
            rules,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, PipelineError> {
        let set: RuleSet =
            serde_json::from_str(text).map_err(|e| PipelineError::RuleSet(e.to_string()))?;
        if let Some(threshold) = set.anomaly_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(PipelineError::RuleSet(format!(
                    "anomaly_threshold {threshold} is outside [0, 1]"
                )));
            }
        }
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_rule() -> RuleModel {
        RuleModel::new(
            "fast",
            vec![ActionLabel::from("A")],
            vec![
                RuleConstraint::new(vec![0], vec![2]),
                RuleConstraint::new(vec![1], vec![]),
            ],
        )
    }

    #[test]
    fn thresholds_follow_constraint_order() {
        let rule = fast_rule();
        assert_eq!(
            rule.thresholds(),
            vec![
                (ThresholdRef::new(0, 0), Direction::GreaterEqual),
                (ThresholdRef::new(0, 2), Direction::LowerEqual),
                (ThresholdRef::new(1, 1), Direction::GreaterEqual),
            ]
        );
        assert_eq!(rule.referenced_labels(), vec![0, 1, 2]);
    }

    #[test]
    fn validate_rejects_out_of_range_labels() {
        let rule = fast_rule();
        assert!(rule.validate(3).is_ok());
        let err = rule.validate(2).unwrap_err();
        assert!(matches!(err, FitError::InputShape(msg) if msg.contains("label 2")));
    }

    #[test]
    fn validate_rejects_label_on_both_sides() {
        let rule = RuleModel::new(
            "both",
            vec![ActionLabel::from("A")],
            vec![RuleConstraint::new(vec![0], vec![0])],
        );
        assert!(matches!(rule.validate(2), Err(FitError::InputShape(_))));
    }

    #[test]
    fn validate_rejects_dangling_threshold_references() {
        let rule = fast_rule().with_hard(HardAssertion::Bound {
            threshold: ThresholdRef::new(1, 0),
            op: CmpOp::Ge,
            value: 0.5,
        });
        let err = rule.validate(3).unwrap_err();
        assert!(err.to_string().contains("c1.P_0"));

        let rule = fast_rule().with_objective(Objective::Maximize {
            threshold: ThresholdRef::new(0, 2),
        });
        assert!(rule.validate(3).is_ok());
    }

    #[test]
    fn condition_is_an_or_of_conjunctions() {
        let rule = fast_rule();
        let ctx = StepContext::default();
        let a = ActionLabel::from("A");
        let at = |t: f64| move |_: ThresholdRef, dir: Direction, p: f64| dir.holds(&p, &t);
        // 0.6 >= 0.5 and 0.1 <= 0.5
        assert!(rule.condition_holds(&ctx, &a, &[0.6, 0.3, 0.1], at(0.5)));
        // first disjunct fails on label 2, second on label 1
        assert!(!rule.condition_holds(&ctx, &a, &[0.3, 0.1, 0.6], at(0.5)));
        // second disjunct alone
        assert!(rule.condition_holds(&ctx, &a, &[0.2, 0.7, 0.1], at(0.5)));
    }

    #[test]
    fn guards_gate_their_constraint() {
        let guard = ContextGuard {
            segments: Some(vec![2, 3]),
            uncollected: Some(1),
            ..ContextGuard::default()
        };
        let inside = StepContext {
            segment: Some(3),
            collected: vec![true, false],
            ..StepContext::default()
        };
        let collected = StepContext {
            segment: Some(3),
            collected: vec![false, true],
            ..StepContext::default()
        };
        let no_segment = StepContext::default();
        assert!(guard.context_holds(&inside));
        assert!(!guard.context_holds(&collected));
        assert!(!guard.context_holds(&no_segment));
        assert_eq!(guard.to_string(), "segment in {2, 3} AND item 1 not collected");
    }

    #[test]
    fn dominant_guard_prefers_first_maximum() {
        let guard = ContextGuard {
            dominant: Some(1),
            ..ContextGuard::default()
        };
        assert!(guard.belief_holds(&[0.2, 0.5, 0.3]));
        assert!(!guard.belief_holds(&[0.5, 0.5, 0.0]));
        assert!(guard.belief_holds(&[0.25, 0.5, 0.25]));
        assert!(!guard.belief_holds(&[0.25]));
    }

    #[test]
    fn rule_sets_parse_from_json() {
        let text = r#"{
            "anomaly_threshold": 0.2,
            "rules": [{
                "name": "go",
                "actions": ["A", 3],
                "constraints": [
                    { "greater_equal": [0], "guard": { "segments": [1] } }
                ],
                "hard": [
                    { "type": "bound", "threshold": { "constraint": 0, "label": 0 }, "op": ">=", "value": 0.5 }
                ],
                "objective": { "type": "maximize", "threshold": { "constraint": 0, "label": 0 } }
            }]
        }"#;
        let set = RuleSet::from_json_str(text).expect("valid rule set");
        assert_eq!(set.anomaly_threshold, Some(0.2));
        let rule = &set.rules[0];
        assert!(rule.is_target(&ActionLabel::Code(3)));
        assert_eq!(rule.hard.len(), 1);
        assert!(matches!(rule.objective, Some(Objective::Maximize { .. })));
        assert!(rule.validate(2).is_ok());
    }

    #[test]
    fn rule_sets_reject_unknown_fields_and_bad_thresholds() {
        assert!(RuleSet::from_json_str(r#"{ "rules": [], "extra": 1 }"#).is_err());
        let err = RuleSet::from_json_str(r#"{ "anomaly_threshold": 1.5, "rules": [] }"#)
            .unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
    }

    fn check_rule() -> RuleModel {
        RuleModel::new(
            "check",
            vec![ActionLabel::from("check 0"), ActionLabel::from("check 1")],
            vec![RuleConstraint::default().with_action_indexed(ActionIndexed {
                belief_band: true,
                distance_to: Some(vec![(0, 0), (3, 1)]),
                ..ActionIndexed::default()
            })],
        )
    }

    #[test]
    fn actions_name_items() {
        let suffix = ActionIndex::Suffix;
        assert_eq!(suffix.resolve(&ActionLabel::from("check 3")), Some(3));
        assert_eq!(suffix.resolve(&ActionLabel::Code(2)), Some(2));
        assert_eq!(suffix.resolve(&ActionLabel::Code(-1)), None);
        assert_eq!(suffix.resolve(&ActionLabel::from("north")), None);
        let map = ActionIndex::Map(BTreeMap::from([("look left".to_string(), 1)]));
        assert_eq!(map.resolve(&ActionLabel::from("look left")), Some(1));
        assert_eq!(map.resolve(&ActionLabel::from("check 1")), None);
    }

    #[test]
    fn action_indexed_constraints_own_band_thresholds() {
        let rule = check_rule();
        let lower = Direction::GreaterEqual;
        let upper = Direction::LowerEqual;
        assert_eq!(
            rule.thresholds(),
            vec![
                (ThresholdRef::band(0, BandKind::ActionBelief, BandBound::Lower), lower),
                (ThresholdRef::band(0, BandKind::ActionBelief, BandBound::Upper), upper),
                (ThresholdRef::band(0, BandKind::Distance, BandBound::Lower), lower),
                (ThresholdRef::band(0, BandKind::Distance, BandBound::Upper), upper),
            ]
        );
        assert!(rule.validate(2).is_ok());
        assert_eq!(
            ThresholdRef::band(0, BandKind::Distance, BandBound::Upper).to_string(),
            "c0.distance.upper"
        );
        assert_eq!(rule.step_labels(&ActionLabel::from("check 1")), vec![1]);
        assert!(rule.step_labels(&ActionLabel::from("north")).is_empty());
    }

    #[test]
    fn band_atoms_read_the_named_item() {
        let rule = check_rule();
        let ctx = StepContext {
            position: Some((0, 0)),
            ..StepContext::default()
        };
        let atoms = rule.constraints[0]
            .step_atoms(0, &ctx, &ActionLabel::from("check 1"), &[0.9, 0.4])
            .expect("constraint applies");
        let values: Vec<f64> = atoms.iter().map(|(_, _, v)| *v).collect();
        assert_eq!(values[..2], [0.4, 0.4]);
        assert!((values[2] - 10f64.sqrt()).abs() < 1e-12);

        let north = rule.constraints[0].step_atoms(0, &ctx, &ActionLabel::from("north"), &[0.9, 0.4]);
        assert_eq!(north, None);
        let nowhere = StepContext::default();
        let check = ActionLabel::from("check 0");
        assert_eq!(rule.constraints[0].step_atoms(0, &nowhere, &check, &[0.9, 0.4]), None);
        assert!(!rule.condition_holds(&nowhere, &check, &[0.9, 0.4], |_, _, _| true));
    }

    #[test]
    fn action_indexed_rules_are_validated() {
        let rule = check_rule();
        assert!(rule.validate_target_action(&ActionLabel::from("check 1"), 2).is_ok());
        let err = rule
            .validate_target_action(&ActionLabel::from("check 2"), 3)
            .unwrap_err();
        assert!(err.to_string().contains("item 2"));
        assert!(rule.validate_target_action(&ActionLabel::from("north"), 2).is_ok());

        let empty = RuleModel::new(
            "empty",
            vec![ActionLabel::from("A")],
            vec![RuleConstraint::default().with_action_indexed(ActionIndexed::default())],
        );
        assert!(empty.validate(2).unwrap_err().to_string().contains("bounds nothing"));

        let mapped = RuleModel::new(
            "mapped",
            vec![ActionLabel::from("look")],
            vec![RuleConstraint::default().with_action_indexed(ActionIndexed {
                index: ActionIndex::Map(BTreeMap::from([("look".to_string(), 4)])),
                belief_band: true,
                distance_to: None,
            })],
        );
        assert!(mapped.validate(2).unwrap_err().to_string().contains("unknown item 4"));
        assert!(mapped.validate(5).is_ok());
    }

    #[test]
    fn band_references_parse_from_json() {
        let text = r#"{ "rules": [ {
            "name": "check",
            "actions": ["check 0"],
            "constraints": [ { "action_indexed": { "belief_band": true, "distance_to": [[0, 0]] } } ],
            "hard": [ { "type": "bound",
                        "threshold": { "constraint": 0, "band": "distance", "bound": "upper" },
                        "op": "<=", "value": 4.0 } ],
            "objective": { "type": "maximize",
                           "threshold": { "constraint": 0, "band": "action_belief", "bound": "lower" } }
        } ] }"#;
        let set = RuleSet::from_json_str(text).expect("valid rule set");
        let rule = &set.rules[0];
        assert_eq!(
            rule.hard[0],
            HardAssertion::Bound {
                threshold: ThresholdRef::band(0, BandKind::Distance, BandBound::Upper),
                op: CmpOp::Le,
                value: 4.0,
            }
        );
        assert!(rule.validate(1).is_ok());
        let label: ThresholdRef =
            serde_json::from_str(r#"{ "constraint": 1, "label": 2 }"#).expect("label ref");
        assert_eq!(label, ThresholdRef::new(1, 2));
    }
}
