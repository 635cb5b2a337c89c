//! Ranking of excused steps by their distance to the fitted rule.
//!
//! For every excused step, reference beliefs are sampled uniformly from the
//! region the step should have been in: inside the rule condition when a
//! target action was taken, outside it otherwise. The step's score is its
//! smallest Hellinger distance to those points, so a step far from any
//! belief the rule would have accepted ranks first.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use rulesynth_trace::{ActionLabel, BeliefKind, BeliefTrace, StepContext};

use crate::error::RankError;
use crate::fitter::FittedRule;

pub const DEFAULT_SAMPLE_QUOTA: usize = 1000;
pub const DEFAULT_MAX_DRAWS_FACTOR: usize = 200;
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankOptions {
    /// Reference points kept per region.
    pub sample_quota: usize,
    /// Draws per region are capped at `sample_quota * max_draws_factor`.
    pub max_draws_factor: usize,
    /// Distances strictly above this are flagged.
    pub anomaly_threshold: f64,
    /// Seed of the sampler; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            sample_quota: DEFAULT_SAMPLE_QUOTA,
            max_draws_factor: DEFAULT_MAX_DRAWS_FACTOR,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            seed: None,
        }
    }
}

impl RankOptions {
    pub fn validate(&self) -> Result<(), RankError> {
        if self.sample_quota == 0 {
            return Err(RankError::InvalidOptions("sample_quota must be positive".into()));
        }
        if self.max_draws_factor == 0 {
            return Err(RankError::InvalidOptions(
                "max_draws_factor must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.anomaly_threshold) {
            return Err(RankError::InvalidOptions(format!(
                "anomaly_threshold {} is outside [0, 1]",
                self.anomaly_threshold
            )));
        }
        Ok(())
    }
}

/// Hellinger distance between two distributions over the same labels,
/// `sqrt(sum (sqrt p - sqrt q)^2) / sqrt 2`, in `[0, 1]`.
pub fn hellinger(p: &[f64], q: &[f64]) -> f64 {
    let sum: f64 = p
        .iter()
        .zip(q)
        .map(|(a, b)| {
            let d = a.max(0.0).sqrt() - b.max(0.0).sqrt();
            d * d
        })
        .sum();
    (sum.sqrt() / std::f64::consts::SQRT_2).clamp(0.0, 1.0)
}

/// Hellinger distance between Bernoulli(p) and Bernoulli(q).
pub fn bernoulli_hellinger(p: f64, q: f64) -> f64 {
    hellinger(&[p, 1.0 - p], &[q, 1.0 - q])
}

/// Uniform point on the probability simplex of `dimension` labels.
pub fn sample_simplex<R: Rng + ?Sized>(rng: &mut R, dimension: usize) -> Vec<f64> {
    if dimension <= 1 {
        return vec![1.0; dimension];
    }
    let mut cuts: Vec<f64> = (0..dimension - 1).map(|_| rng.gen::<f64>()).collect();
    cuts.sort_by(f64::total_cmp);
    let mut point = Vec::with_capacity(dimension);
    let mut previous = 0.0;
    for cut in cuts {
        point.push(cut - previous);
        previous = cut;
    }
    point.push(1.0 - previous);
    point
}

fn sample_point<R: Rng + ?Sized>(rng: &mut R, dimension: usize, kind: BeliefKind) -> Vec<f64> {
    match kind {
        BeliefKind::Categorical => sample_simplex(rng, dimension),
        BeliefKind::Independent => (0..dimension).map(|_| rng.gen::<f64>()).collect(),
    }
}

/// Distance between a recorded belief and a reference point. Independent
/// beliefs use the largest per-item Bernoulli distance over `labels`.
pub fn belief_distance(kind: BeliefKind, belief: &[f64], reference: &[f64], labels: &[usize]) -> f64 {
    match kind {
        BeliefKind::Categorical => hellinger(belief, reference),
        BeliefKind::Independent => labels
            .iter()
            .filter_map(|&l| Some(bernoulli_hellinger(*belief.get(l)?, *reference.get(l)?)))
            .fold(0.0, f64::max),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A target action was taken but the condition is false.
    MissedAction,
    /// Another action was taken while the condition holds.
    UnexpectedAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStep {
    pub run: usize,
    pub run_id: String,
    pub step: usize,
    pub action: ActionLabel,
    pub belief: Vec<f64>,
    pub kind: ViolationKind,
    /// `None` when no reference point could be drawn.
    pub distance: Option<f64>,
    pub anomaly: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ranking {
    pub missed: Vec<RankedStep>,
    pub unexpected: Vec<RankedStep>,
}

impl Ranking {
    pub fn len(&self) -> usize {
        self.missed.len() + self.unexpected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn anomalies(&self) -> usize {
        self.missed
            .iter()
            .chain(&self.unexpected)
            .filter(|s| s.anomaly)
            .count()
    }
}

/// Descending distance, unknown distances last, then trace order.
fn rank_order(a: &RankedStep, b: &RankedStep) -> Ordering {
    let by_distance = match (a.distance, b.distance) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_distance.then_with(|| (a.run, a.step).cmp(&(b.run, b.step)))
}

/// What a step fixes about one constraint before any belief is drawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FixedPart {
    context_holds: bool,
    item: Option<usize>,
    distance_bits: Option<u64>,
}

/// Sample key: which side of the rule, and what the step fixes about each
/// constraint.
type RegionKey = (bool, Vec<FixedPart>);

fn region_key(
    fitted: &FittedRule,
    context: &StepContext,
    action: &ActionLabel,
    inside: bool,
) -> RegionKey {
    let parts = fitted
        .rule
        .constraints
        .iter()
        .map(|c| FixedPart {
            context_holds: c.context_holds(context),
            item: c.action_item(action),
            distance_bits: c.item_distance(context, action).map(f64::to_bits),
        })
        .collect();
    (inside, parts)
}

pub struct CounterexampleRanker<R> {
    rng: R,
    options: RankOptions,
}

impl CounterexampleRanker<StdRng> {
    pub fn from_options(options: RankOptions) -> Result<Self, RankError> {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(rng, options)
    }
}

impl<R: Rng> CounterexampleRanker<R> {
    pub fn new(rng: R, options: RankOptions) -> Result<Self, RankError> {
        options.validate()?;
        Ok(Self { rng, options })
    }

    pub fn options(&self) -> &RankOptions {
        &self.options
    }

    /// Rank the steps excused by `fitted`. Does not change the fit.
    pub fn rank(&mut self, fitted: &FittedRule, trace: &BeliefTrace) -> Result<Ranking, RankError> {
        let (Some(dimension), Some(kind)) = (trace.dimension(), trace.kind()) else {
            return Ok(Ranking::default());
        };
        let mut regions: HashMap<RegionKey, Vec<Vec<f64>>> = HashMap::new();
        let mut ranking = Ranking::default();

        for entry in fitted.excused_steps() {
            let step = trace.step(entry.run, entry.step).ok_or(RankError::MissingStep {
                run: entry.run,
                step: entry.step,
            })?;
            let inside = entry.target;
            let key = region_key(fitted, &step.context, &step.action, inside);
            let points = match regions.entry(key) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => slot.insert(self.sample_region(
                    fitted,
                    &step.context,
                    &step.action,
                    inside,
                    dimension,
                    kind,
                )),
            };
            let labels = fitted.rule.step_labels(&step.action);
            let belief = step.belief.probs();
            let distance = points
                .iter()
                .map(|q| belief_distance(kind, belief, q, &labels))
                .min_by(f64::total_cmp);
            let ranked = RankedStep {
                run: entry.run,
                run_id: trace
                    .runs()
                    .get(entry.run)
                    .map(|r| r.id.clone())
                    .unwrap_or_default(),
                step: entry.step,
                action: step.action.clone(),
                belief: belief.to_vec(),
                kind: if inside {
                    ViolationKind::MissedAction
                } else {
                    ViolationKind::UnexpectedAction
                },
                distance,
                anomaly: distance.is_some_and(|d| d > self.options.anomaly_threshold),
            };
            if inside {
                ranking.missed.push(ranked);
            } else {
                ranking.unexpected.push(ranked);
            }
        }

        ranking.missed.sort_by(rank_order);
        ranking.unexpected.sort_by(rank_order);
        tracing::debug!(
            rule = %fitted.rule.name,
            missed = ranking.missed.len(),
            unexpected = ranking.unexpected.len(),
            anomalies = ranking.anomalies(),
            "ranked excused steps"
        );
        Ok(ranking)
    }

    /// Up to `sample_quota` points on the given side of the rule condition,
    /// evaluated in `context` at a step taking `action`.
    pub fn sample_region(
        &mut self,
        fitted: &FittedRule,
        context: &StepContext,
        action: &ActionLabel,
        inside: bool,
        dimension: usize,
        kind: BeliefKind,
    ) -> Vec<Vec<f64>> {
        let quota = self.options.sample_quota;
        let max_draws = quota.saturating_mul(self.options.max_draws_factor);
        let mut points = Vec::with_capacity(quota);
        let mut draws = 0usize;
        while points.len() < quota && draws < max_draws {
            draws += 1;
            let point = sample_point(&mut self.rng, dimension, kind);
            if fitted.condition_holds(context, action, &point) == inside {
                points.push(point);
            }
        }
        if points.is_empty() {
            tracing::warn!(
                rule = %fitted.rule.name,
                inside,
                draws,
                "no reference point found for region"
            );
        } else {
            tracing::debug!(inside, draws, kept = points.len(), "sampled region");
        }
        points
    }
}
