//! `rulesynth fit`: fit rules, rank excused steps, print the report.

use std::fs;
use std::path::{Path, PathBuf};

use miette::IntoDiagnostic;

use rulesynth_engine::encoding::encode;
use rulesynth_engine::fitter::FitOptions;
use rulesynth_engine::pipeline::{synthesize, SynthesisOptions, SynthesisReport};
use rulesynth_engine::ranker::RankOptions;
use rulesynth_engine::rule::RuleSet;
use rulesynth_smt::backends::recording::RecordingOracle;
use rulesynth_smt::backends::smtlib_printer::{sort_to_smtlib, to_smtlib};
use rulesynth_smt::backends::smtlib_process::{SmtLibProcess, DEFAULT_COMMAND};
use rulesynth_smt::backends::z3_backend::Z3Solver;
use rulesynth_smt::solver::ConstraintOracle;
use rulesynth_trace::reader::load_trace;
use rulesynth_trace::BeliefTrace;

use super::helpers::{
    emit, parse_output_format, parse_solver_choice, sanitize_file_component, solver_name,
    OutputFormat, SolverChoice,
};

/// Name of the recorded oracle session inside the `--dump-smt` directory.
pub(crate) const SESSION_FILE: &str = "session.smt2";

pub(crate) struct FitArgs {
    pub(crate) trace: PathBuf,
    pub(crate) rules: PathBuf,
    pub(crate) solver: String,
    pub(crate) solver_cmd: Option<String>,
    pub(crate) check_timeout_ms: u64,
    pub(crate) timeout: u64,
    pub(crate) max_unknown: usize,
    pub(crate) samples: usize,
    pub(crate) seed: Option<u64>,
    pub(crate) anomaly_threshold: Option<f64>,
    pub(crate) format: String,
    pub(crate) dump_smt: Option<PathBuf>,
    pub(crate) out: Option<PathBuf>,
}

pub(crate) fn run_fit_command(args: FitArgs) -> miette::Result<()> {
    let format = parse_output_format(&args.format)?;
    let solver = parse_solver_choice(&args.solver)?;

    let trace = load_trace(&args.trace)
        .map_err(|e| miette::miette!("Failed to read trace {}: {e}", args.trace.display()))?;
    let mut rules = RuleSet::load(&args.rules)
        .map_err(|e| miette::miette!("Failed to read rules {}: {e}", args.rules.display()))?;
    if let Some(threshold) = args.anomaly_threshold {
        rules.anomaly_threshold = Some(threshold);
    }

    let options = SynthesisOptions {
        fit: FitOptions {
            check_timeout_ms: args.check_timeout_ms,
            overall_timeout_secs: args.timeout,
            max_unknown_checks: args.max_unknown,
            ..FitOptions::default()
        },
        rank: RankOptions {
            sample_quota: args.samples,
            seed: args.seed,
            ..RankOptions::default()
        },
    };

    if let Some(dir) = &args.dump_smt {
        dump_encodings(dir, &trace, &rules)?;
    }

    tracing::info!(solver = solver_name(solver), rules = rules.rules.len(), "fitting rules");
    let dump = args.dump_smt.as_deref();
    let report = match solver {
        SolverChoice::Z3 => run_with(
            Z3Solver::with_timeout_ms(args.check_timeout_ms),
            &trace,
            &rules,
            &options,
            dump,
        )?,
        SolverChoice::SmtLib => {
            let command = args.solver_cmd.as_deref().unwrap_or(DEFAULT_COMMAND);
            let oracle =
                SmtLibProcess::with_command_and_timeout(command, Some(args.check_timeout_ms))
                    .map_err(|e| miette::miette!("Failed to start solver `{command}`: {e}"))?;
            run_with(oracle, &trace, &rules, &options, dump)?
        }
    };

    let text = match format {
        OutputFormat::Text => report.render_text(),
        OutputFormat::Json => report.to_json().into_diagnostic()?,
    };
    emit(&text, args.out.as_deref())
}

/// Run the pipeline, recording the oracle session when `dump` is set.
fn run_with<O: ConstraintOracle>(
    oracle: O,
    trace: &BeliefTrace,
    rules: &RuleSet,
    options: &SynthesisOptions,
    dump: Option<&Path>,
) -> miette::Result<SynthesisReport> {
    let result = match dump {
        Some(dir) => {
            let mut recorder = RecordingOracle::new(oracle);
            let result = synthesize(trace, rules, &mut recorder, options);
            let path = dir.join(SESSION_FILE);
            let mut file = fs::File::create(&path).into_diagnostic()?;
            recorder.write_script(&mut file).into_diagnostic()?;
            tracing::info!(path = %path.display(), "wrote oracle session");
            result
        }
        None => synthesize(trace, rules, oracle, options),
    };
    result.map_err(|e| miette::miette!("Rule synthesis failed: {e}"))
}

/// Write one SMT-LIB2 file per rule with its declarations, axioms, hard
/// assertions and soft clauses.
pub(crate) fn dump_encodings(dir: &Path, trace: &BeliefTrace, rules: &RuleSet) -> miette::Result<()> {
    fs::create_dir_all(dir).into_diagnostic()?;
    for (index, rule) in rules.rules.iter().enumerate() {
        let encoding = match encode(index, rule, trace) {
            Ok(encoding) => encoding,
            Err(e) => {
                tracing::warn!(rule = %rule.name, error = %e, "not dumping rule");
                continue;
            }
        };
        let mut lines = vec![format!("; rule {index}: {}", rule.name)];
        for (name, sort) in encoding.declarations() {
            lines.push(format!("(declare-const {name} {})", sort_to_smtlib(&sort)));
        }
        lines.push("; threshold axioms".to_string());
        lines.extend(encoding.axioms.iter().map(|t| format!("(assert {})", to_smtlib(t))));
        if !encoding.hard.is_empty() {
            lines.push("; hard assertions".to_string());
            lines.extend(encoding.hard.iter().map(|t| format!("(assert {})", to_smtlib(t))));
        }
        lines.push("; soft clauses".to_string());
        for (entry, term) in encoding.ledger.iter().zip(&encoding.soft) {
            lines.push(format!(
                "(assert {}) ; run {} step {}",
                to_smtlib(term),
                entry.run,
                entry.step
            ));
        }
        let file = dir.join(format!(
            "{index:02}_{}.smt2",
            sanitize_file_component(&rule.name)
        ));
        fs::write(&file, lines.join("\n") + "\n").into_diagnostic()?;
        tracing::debug!(path = %file.display(), "wrote rule encoding");
    }
    Ok(())
}
