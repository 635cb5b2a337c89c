//! Parsing and output helpers shared by the subcommands.

use std::fs;
use std::path::Path;

use miette::IntoDiagnostic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SolverChoice {
    Z3,
    SmtLib,
}

pub(crate) fn parse_output_format(raw: &str) -> miette::Result<OutputFormat> {
    match raw {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => miette::bail!("Unknown output format: {other}. Use 'text' or 'json'."),
    }
}

pub(crate) fn parse_solver_choice(raw: &str) -> miette::Result<SolverChoice> {
    match raw {
        "z3" => Ok(SolverChoice::Z3),
        "smtlib" => Ok(SolverChoice::SmtLib),
        other => miette::bail!("Unknown solver: {other}. Use 'z3' or 'smtlib'."),
    }
}

pub(crate) fn solver_name(solver: SolverChoice) -> &'static str {
    match solver {
        SolverChoice::Z3 => "z3",
        SolverChoice::SmtLib => "smtlib",
    }
}

/// Lowercase, alphanumeric-and-underscore form of a rule name for file names.
pub(crate) fn sanitize_file_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "rule".to_string()
    } else {
        cleaned
    }
}

/// Write `text` to `out`, or to stdout when no path is given.
pub(crate) fn emit(text: &str, out: Option<&Path>) -> miette::Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).into_diagnostic()?;
            }
            fs::write(path, text).into_diagnostic()
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}
