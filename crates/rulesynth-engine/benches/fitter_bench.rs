use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rulesynth_engine::fitter::{FitOptions, MaxSatRuleFitter};
use rulesynth_engine::ranker::{CounterexampleRanker, RankOptions};
use rulesynth_engine::rule::{RuleConstraint, RuleModel};
use rulesynth_engine::FitOutcome;
use rulesynth_smt::backends::z3_backend::Z3Solver;
use rulesynth_trace::{ActionLabel, BeliefDistribution, BeliefTrace, Run, StepContext, TraceStep};

/// Three-label trace where action 1 mostly follows `P_0 >= 0.6`, with a
/// few flipped actions.
fn noisy_trace(steps: usize, seed: u64) -> BeliefTrace {
    let mut rng = StdRng::seed_from_u64(seed);
    let steps = (0..steps)
        .map(|i| {
            let p0: f64 = rng.gen_range(0.0..1.0);
            let p1: f64 = rng.gen_range(0.0..(1.0 - p0));
            let follows = p0 >= 0.6;
            let flipped = rng.gen_bool(0.1);
            TraceStep {
                step: i + 1,
                action: ActionLabel::Code(i64::from(follows != flipped)),
                belief: BeliefDistribution::categorical(vec![p0, p1, 1.0 - p0 - p1])
                    .unwrap(),
                context: StepContext::default(),
            }
        })
        .collect();
    BeliefTrace::new(vec![Run {
        id: "bench".into(),
        steps,
    }])
    .unwrap()
}

fn rule() -> RuleModel {
    RuleModel::new(
        "p0",
        vec![ActionLabel::Code(1)],
        vec![RuleConstraint::new(vec![0], vec![])],
    )
}

fn bench_fit_small(c: &mut Criterion) {
    let trace = noisy_trace(12, 1);
    let rule = rule();
    c.bench_function("fit_rule_12_steps", |b| {
        b.iter(|| {
            let mut fitter = MaxSatRuleFitter::new(Z3Solver::new(), FitOptions::default());
            fitter.fit_rule(0, black_box(&rule), black_box(&trace)).unwrap()
        })
    });
}

fn bench_rank(c: &mut Criterion) {
    let trace = noisy_trace(12, 1);
    let mut fitter = MaxSatRuleFitter::new(Z3Solver::new(), FitOptions::default());
    let FitOutcome::Fitted(fitted) = fitter.fit_rule(0, &rule(), &trace).unwrap() else {
        return;
    };
    let options = RankOptions {
        seed: Some(5),
        ..RankOptions::default()
    };
    c.bench_function("rank_excused_steps", |b| {
        b.iter(|| {
            let mut ranker = CounterexampleRanker::from_options(options.clone()).unwrap();
            ranker.rank(black_box(&fitted), black_box(&trace)).unwrap()
        })
    });
}

criterion_group!(benches, bench_fit_small, bench_rank);
criterion_main!(benches);
