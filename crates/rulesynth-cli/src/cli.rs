//! CLI argument definitions: top-level `Cli` struct and `Commands` enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub(crate) const CLI_LONG_ABOUT: &str =
    "Synthesize belief-threshold rules from planner traces and rank the steps they cannot explain.\n\n\
    Typical use:\n  \
    1. rulesynth inspect runs/\n  \
    2. rulesynth fit runs/ --rules rules.json --seed 1\n\n\
    Traces are JSON files or directories of run logs. Rules are JSON files.";

#[derive(Parser)]
#[command(name = "rulesynth")]
#[command(about = "Belief-rule synthesis and anomaly ranking for planner traces")]
#[command(long_about = CLI_LONG_ABOUT)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Fit every rule of a rule file and rank the excused steps
    Fit {
        /// Trace file (.json) or directory of run logs
        trace: PathBuf,

        /// Rule file (JSON)
        #[arg(long)]
        rules: PathBuf,

        /// Oracle backend: z3 (native) | smtlib (external process)
        #[arg(long, default_value = "z3")]
        solver: String,

        /// Solver command line for the smtlib backend
        #[arg(long)]
        solver_cmd: Option<String>,

        /// Timeout of each oracle check in milliseconds (0 disables)
        #[arg(long, default_value_t = 10_000)]
        check_timeout_ms: u64,

        /// Budget per rule in seconds (0 disables)
        #[arg(long, default_value_t = 0)]
        timeout: u64,

        /// Unknown checks tolerated before a rule is reported as degraded
        #[arg(long, default_value_t = 3)]
        max_unknown: usize,

        /// Reference points sampled per region
        #[arg(long, default_value_t = 1000)]
        samples: usize,

        /// Sampler seed (random when omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Flag excused steps farther than this from the rule region
        #[arg(long)]
        anomaly_threshold: Option<f64>,

        /// Output format: text | json
        #[arg(long, default_value = "text")]
        format: String,

        /// Write SMT-LIB2 encodings and the oracle session to this directory
        #[arg(long)]
        dump_smt: Option<PathBuf>,

        /// Write the report to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Summarize a trace: runs, steps, belief shape and actions
    Inspect {
        /// Trace file (.json) or directory of run logs
        trace: PathBuf,

        /// Output format: text | json
        #[arg(long, default_value = "text")]
        format: String,
    },
}
