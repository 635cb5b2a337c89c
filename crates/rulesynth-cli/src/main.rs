#![doc = include_str!("../README.md")]

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::fit::{run_fit_command, FitArgs};
use commands::inspect::run_inspect_command;

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fit {
            trace,
            rules,
            solver,
            solver_cmd,
            check_timeout_ms,
            timeout,
            max_unknown,
            samples,
            seed,
            anomaly_threshold,
            format,
            dump_smt,
            out,
        } => run_fit_command(FitArgs {
            trace,
            rules,
            solver,
            solver_cmd,
            check_timeout_ms,
            timeout,
            max_unknown,
            samples,
            seed,
            anomaly_threshold,
            format,
            dump_smt,
            out,
        }),
        Commands::Inspect { trace, format } => run_inspect_command(&trace, &format),
    }
}
