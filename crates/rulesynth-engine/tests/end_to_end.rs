mod common;

use rulesynth_engine::fitter::{FitOptions, FitOutcome, MaxSatRuleFitter};
use rulesynth_engine::pipeline::{synthesize, RuleOutcome, SynthesisOptions};
use rulesynth_engine::ranker::{RankOptions, ViolationKind};
use rulesynth_engine::rule::{
    BandBound, BandKind, CmpOp, HardAssertion, Objective, RuleSet, ThresholdRef,
};
use rulesynth_smt::backends::z3_backend::Z3Solver;
use rulesynth_smt::backends::recording::RecordingOracle;
use rulesynth_smt::rational;
use rulesynth_trace::reader::json::parse_json_trace;

use common::{binary_trace, p0_rule};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const T0: ThresholdRef = ThresholdRef::new(0, 0);

fn seeded() -> SynthesisOptions {
    SynthesisOptions {
        rank: RankOptions {
            seed: Some(42),
            ..RankOptions::default()
        },
        ..SynthesisOptions::default()
    }
}

#[test]
fn separable_trace_fits_largest_threshold_when_maximizing() -> TestResult {
    let trace = binary_trace(&[(0.95, "A"), (0.80, "A"), (0.40, "B"), (0.60, "A")]);
    let rule = p0_rule().with_objective(Objective::Maximize { threshold: T0 });
    let mut fitter = MaxSatRuleFitter::new(Z3Solver::new(), FitOptions::default());

    let FitOutcome::Fitted(fitted) = fitter.fit_rule(0, &rule, &trace)? else {
        panic!("rule should fit");
    };
    assert_eq!(fitted.excused_count(), 0);
    let t = fitted.threshold(T0).ok_or("missing threshold")?;
    assert_eq!(t.exact, rational::ratio(3, 5));
    assert_eq!(format!("{:.3}", t.value), "0.600");
    Ok(())
}

#[test]
fn hard_floor_forces_one_excused_step_which_ranks_as_anomaly() -> TestResult {
    let trace = binary_trace(&[(0.95, "A"), (0.30, "A"), (0.20, "B")]);
    let rule = p0_rule().with_hard(HardAssertion::Bound {
        threshold: T0,
        op: CmpOp::Ge,
        value: 0.5,
    });
    let rules = RuleSet::new(vec![rule]);
    let report = synthesize(&trace, &rules, Z3Solver::new(), &seeded())?;

    let (fitted, ranking) = report.fitted().next().ok_or("rule not fitted")?;
    assert_eq!(fitted.excused_count(), 1);
    let excused: Vec<usize> = fitted.excused_steps().map(|e| e.step).collect();
    assert_eq!(excused, vec![2]);
    let t = fitted.threshold(T0).ok_or("missing threshold")?;
    assert_eq!(t.exact, rational::ratio(1, 2));

    assert_eq!(ranking.missed.len(), 1);
    assert!(ranking.unexpected.is_empty());
    let step = &ranking.missed[0];
    assert_eq!((step.run_id.as_str(), step.step), ("r0", 2));
    assert_eq!(step.kind, ViolationKind::MissedAction);
    let distance = step.distance.ok_or("no distance")?;
    assert!((0.14..0.2).contains(&distance), "distance {distance}");
    assert!(step.anomaly);

    let text = report.render_text();
    assert!(text.contains("excused 1 of 3 steps"));
    assert!(text.contains("ANOMALY: run r0 step 2: action A with belief P_0 = 0.300 P_1 = 0.700"));
    Ok(())
}

#[test]
fn without_a_floor_the_same_trace_is_separable() -> TestResult {
    let trace = binary_trace(&[(0.95, "A"), (0.30, "A"), (0.20, "B")]);
    let mut fitter = MaxSatRuleFitter::new(Z3Solver::new(), FitOptions::default());
    let FitOutcome::Fitted(fitted) = fitter.fit_rule(0, &p0_rule(), &trace)? else {
        panic!("rule should fit");
    };
    assert_eq!(fitted.excused_count(), 0);
    let t = fitted.threshold(T0).ok_or("missing threshold")?;
    assert!(t.value > 0.2 && t.value <= 0.3);
    Ok(())
}

#[test]
fn refitting_gives_the_same_rule() -> TestResult {
    let trace = binary_trace(&[(0.9, "A"), (0.35, "A"), (0.5, "B"), (0.7, "A"), (0.1, "B")]);
    let mut fitter = MaxSatRuleFitter::new(Z3Solver::new(), FitOptions::default());
    let FitOutcome::Fitted(first) = fitter.fit_rule(0, &p0_rule(), &trace)? else {
        panic!("rule should fit");
    };
    let FitOutcome::Fitted(second) = fitter.fit_rule(0, &p0_rule(), &trace)? else {
        panic!("rule should fit on the second pass");
    };
    assert_eq!(first.excused, second.excused);
    assert_eq!(first.ledger, second.ledger);
    assert!(fitter.session().depth() == 0 && second.minimal && second.optimized);
    Ok(())
}

#[test]
fn rules_on_one_oracle_do_not_share_indicators() -> TestResult {
    let trace = binary_trace(&[(0.9, "A"), (0.35, "A"), (0.5, "B")]);
    let mut second = p0_rule();
    second.name = "second".into();
    second.actions = vec!["B".into()];
    let rules = RuleSet::new(vec![p0_rule(), second]);

    let mut oracle = RecordingOracle::new(Z3Solver::new());
    let report = synthesize(&trace, &rules, &mut oracle, &seeded())?;
    assert_eq!(report.fitted().count(), 2);

    let bounds: Vec<&String> = oracle
        .script()
        .iter()
        .filter(|line| line.contains("at-most"))
        .collect();
    assert!(!bounds.is_empty());
    for line in bounds {
        let first_rule = line.contains("b_r0_");
        let second_rule = line.contains("b_r1_");
        assert!(first_rule != second_rule, "mixed ledgers in `{line}`");
    }
    Ok(())
}

#[test]
fn json_trace_with_guards_and_particles() -> TestResult {
    let trace = parse_json_trace(
        r#"{ "runs": [
            { "id": "a", "steps": [
                { "action": 1, "particles": [9, 1, 0], "segment": 0 },
                { "action": 0, "particles": [2, 8, 0], "segment": 0 },
                { "action": 0, "particles": [9, 1, 0], "segment": 1 }
            ] },
            { "id": "b", "steps": [
                { "action": 1, "belief": [0.7, 0.2, 0.1], "segment": 0 }
            ] }
        ] }"#,
    )?;
    let rules = RuleSet::from_json_str(
        r#"{ "rules": [ {
            "name": "fast_on_easy",
            "actions": [1],
            "constraints": [ { "greater_equal": [0], "guard": { "segments": [0] } } ],
            "objective": { "type": "maximize", "threshold": { "constraint": 0, "label": 0 } }
        } ] }"#,
    )?;
    let report = synthesize(&trace, &rules, Z3Solver::new(), &seeded())?;
    let RuleOutcome::Fitted { fitted, ranking } = &report.results[0].outcome else {
        panic!("rule should fit: {:?}", report.results[0].outcome);
    };
    // segment 1 never satisfies the guard, so its non-target step is explained
    assert_eq!(fitted.excused_count(), 0);
    assert!(ranking.is_empty());
    let t = fitted.threshold(T0).ok_or("missing threshold")?;
    assert_eq!(t.exact, rational::ratio(7, 10));
    Ok(())
}

#[test]
fn check_rule_fits_belief_and_distance_bands() -> TestResult {
    let trace = parse_json_trace(
        r#"{ "runs": [ { "id": "rocks", "steps": [
            { "action": "check 0", "kind": "independent", "belief": [0.4, 0.9], "position": [0, 0] },
            { "action": "check 1", "kind": "independent", "belief": [0.5, 0.6], "position": [0, 0] },
            { "action": "north",   "kind": "independent", "belief": [0.5, 0.5], "position": [1, 0] },
            { "action": "check 1", "kind": "independent", "belief": [0.9, 0.5], "position": [2, 1] },
            { "action": "sample",  "kind": "independent", "belief": [0.5, 0.5], "position": [3, 1] }
        ] } ] }"#,
    )?;
    let rules = RuleSet::from_json_str(
        r#"{ "rules": [ {
            "name": "check",
            "actions": ["check 0", "check 1"],
            "constraints": [ { "action_indexed": {
                "belief_band": true,
                "distance_to": [[0, 0], [3, 1]]
            } } ]
        } ] }"#,
    )?;
    let report = synthesize(&trace, &rules, Z3Solver::new(), &seeded())?;
    let (fitted, ranking) = report.fitted().next().ok_or("rule not fitted")?;
    assert_eq!(fitted.excused_count(), 0);
    assert!(ranking.is_empty());

    let band = |band, bound| {
        fitted
            .threshold(ThresholdRef::band(0, band, bound))
            .ok_or("missing band threshold")
    };
    assert_eq!(band(BandKind::ActionBelief, BandBound::Lower)?.exact, rational::ratio(2, 5));
    assert_eq!(band(BandKind::ActionBelief, BandBound::Upper)?.exact, rational::ratio(3, 5));
    assert_eq!(band(BandKind::Distance, BandBound::Lower)?.value, 0.0);
    let far = band(BandKind::Distance, BandBound::Upper)?.value;
    assert!((far - 10f64.sqrt()).abs() < 1e-9, "far = {far}");

    let text = report.render_text();
    assert!(
        text.contains("condition: P_[action] in [0.400, 0.600] AND distance in [0.000, 3.162]"),
        "{text}"
    );
    Ok(())
}

#[test]
fn out_of_band_check_is_excused_and_ranked() -> TestResult {
    let trace = parse_json_trace(
        r#"{ "runs": [ { "id": "rocks", "steps": [
            { "action": "check 0", "kind": "independent", "belief": [0.45, 0.9], "position": [0, 0] },
            { "action": "check 0", "kind": "independent", "belief": [0.55, 0.9], "position": [1, 0] },
            { "action": "check 1", "kind": "independent", "belief": [0.5, 0.95], "position": [0, 0] }
        ] } ] }"#,
    )?;
    let rules = RuleSet::from_json_str(
        r#"{ "rules": [ {
            "name": "check",
            "actions": ["check 0", "check 1"],
            "constraints": [ { "action_indexed": { "belief_band": true } } ],
            "hard": [ { "type": "bound",
                        "threshold": { "constraint": 0, "band": "action_belief", "bound": "upper" },
                        "op": "<=", "value": 0.6 } ]
        } ] }"#,
    )?;
    let report = synthesize(&trace, &rules, Z3Solver::new(), &seeded())?;
    let (fitted, ranking) = report.fitted().next().ok_or("rule not fitted")?;
    let excused: Vec<usize> = fitted.excused_steps().map(|e| e.step).collect();
    assert_eq!(excused, vec![3]);
    assert_eq!(ranking.missed.len(), 1);
    let distance = ranking.missed[0].distance.ok_or("no distance")?;
    assert!(distance > 0.1, "distance {distance}");
    Ok(())
}
