use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use indexmap::IndexMap;
use num::rational::BigRational;
use num::traits::Zero;
use thiserror::Error;

use crate::backends::smtlib_printer::{
    at_most_to_smtlib, objective_to_smtlib, sort_to_smtlib, to_smtlib,
};
use crate::rational;
use crate::solver::{ConstraintOracle, Model, ModelValue, ObjectiveSense, SatResult};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Command line used when none is given: Z3 reading SMT-LIB2 from stdin.
pub const DEFAULT_COMMAND: &str = "z3 -in -smt2";

/// Bytes of solver stderr kept for error messages.
const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum SmtLibError {
    #[error("solver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("solver not found: {0}")]
    NotFound(String),
    #[error("solver error: {0}")]
    SolverError(String),
    #[error("Failed to parse solver output: {0}")]
    ParseError(String),
}

/// Oracle backed by an external SMT-LIB2 solver process that supports
/// `minimize`/`maximize` and `(_ at-most k)`, such as Z3.
///
/// Declarations made inside a scope are forgotten by the matching `pop`, as
/// SMT-LIB2 prescribes, and are sent again when the name is redeclared.
pub struct SmtLibProcess {
    child: Option<Child>,
    stdin: Box<dyn Write>,
    stdout: Box<dyn BufRead>,
    stderr_tail: Arc<Mutex<String>>,
    command: String,
    declared: IndexMap<String, SmtSort>,
    /// `declared.len()` at each open `push`.
    scope_marks: Vec<usize>,
    timeout_ms: Option<u64>,
}

impl SmtLibProcess {
    pub fn new() -> Result<Self, SmtLibError> {
        Self::with_command_and_timeout(DEFAULT_COMMAND, None)
    }

    pub fn with_command(command_line: &str) -> Result<Self, SmtLibError> {
        Self::with_command_and_timeout(command_line, None)
    }

    /// Spawn `command_line` (program followed by whitespace-separated
    /// arguments). `timeout_ms` bounds every satisfiability check.
    pub fn with_command_and_timeout(
        command_line: &str,
        timeout_ms: Option<u64>,
    ) -> Result<Self, SmtLibError> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| SmtLibError::NotFound("empty solver command".into()))?;
        let args: Vec<&str> = parts.collect();

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SmtLibError::NotFound(format!("{program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SmtLibError::SolverError("failed to capture solver stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SmtLibError::SolverError("failed to capture solver stdout".into()))?;
        let stderr_tail = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            drain_stderr(stderr, Arc::clone(&stderr_tail));
        }

        let mut solver = Self::from_parts(
            Some(child),
            Box::new(stdin),
            Box::new(BufReader::new(stdout)),
            stderr_tail,
            command_line,
            timeout_ms,
        );
        solver.configure(timeout_ms)?;
        Ok(solver)
    }

    fn from_parts(
        child: Option<Child>,
        stdin: Box<dyn Write>,
        stdout: Box<dyn BufRead>,
        stderr_tail: Arc<Mutex<String>>,
        command: &str,
        timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            child,
            stdin,
            stdout,
            stderr_tail,
            command: command.to_string(),
            declared: IndexMap::new(),
            scope_marks: Vec::new(),
            timeout_ms,
        }
    }

    /// Talk SMT-LIB2 over the given streams instead of a child process.
    #[cfg(test)]
    fn over_streams(
        stdin: impl Write + 'static,
        stdout: impl BufRead + 'static,
    ) -> Result<Self, SmtLibError> {
        let mut solver = Self::from_parts(
            None,
            Box::new(stdin),
            Box::new(stdout),
            Arc::new(Mutex::new(String::new())),
            "<streams>",
            None,
        );
        solver.configure(None)?;
        Ok(solver)
    }

    fn configure(&mut self, timeout_ms: Option<u64>) -> Result<(), SmtLibError> {
        self.expect_success("(set-option :print-success true)")?;
        self.expect_success("(set-option :produce-models true)")?;
        if let Some(ms) = timeout_ms.filter(|ms| *ms > 0) {
            self.expect_success(&format!("(set-option :timeout {ms})"))?;
        }
        Ok(())
    }

    fn stderr_text(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.trim().to_string())
            .unwrap_or_default()
    }

    /// Send one command and read one complete s-expression in response.
    fn send_command(&mut self, cmd: &str) -> Result<String, SmtLibError> {
        tracing::trace!(command = cmd, "smtlib send");
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;

        let mut response = String::new();
        let mut depth: i64 = 0;
        loop {
            let mut line = String::new();
            let read = self.stdout.read_line(&mut line)?;
            if read == 0 {
                return Err(SmtLibError::SolverError(format!(
                    "No response from `{}` for command `{cmd}`. stderr: {}",
                    self.command,
                    self.stderr_text()
                )));
            }
            depth += paren_balance(&line);
            response.push_str(&line);
            if depth <= 0 && !response.trim().is_empty() {
                break;
            }
        }
        let response = response.trim().to_string();
        if response.starts_with("(error") {
            return Err(SmtLibError::SolverError(response));
        }
        Ok(response)
    }

    fn expect_success(&mut self, cmd: &str) -> Result<(), SmtLibError> {
        let response = self.send_command(cmd)?;
        if response == "success" {
            Ok(())
        } else {
            Err(SmtLibError::SolverError(format!(
                "unexpected response to `{cmd}`: {response}"
            )))
        }
    }
}

/// Read the solver's stderr on a background thread, keeping the last
/// [`STDERR_TAIL_BYTES`], so that a chatty solver never blocks on a full
/// pipe.
fn drain_stderr(
    stderr: impl Read + Send + 'static,
    tail: Arc<Mutex<String>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stderr);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            let Ok(mut tail) = tail.lock() else { break };
            tail.push_str(&line);
            tail.push('\n');
            if tail.len() > STDERR_TAIL_BYTES {
                let mut cut = tail.len() - STDERR_TAIL_BYTES;
                while !tail.is_char_boundary(cut) {
                    cut += 1;
                }
                tail.drain(..cut);
            }
        }
    });
}

impl Drop for SmtLibProcess {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "(exit)");
        let _ = self.stdin.flush();
        if let Some(child) = self.child.as_mut() {
            let _ = child.wait();
        }
    }
}

impl ConstraintOracle for SmtLibProcess {
    type Error = SmtLibError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), SmtLibError> {
        if self.declared.get(name) == Some(sort) {
            return Ok(());
        }
        let sort_str = sort_to_smtlib(sort);
        self.expect_success(&format!("(declare-const {name} {sort_str})"))?;
        self.declared.insert(name.to_string(), *sort);
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), SmtLibError> {
        let smt_str = to_smtlib(term);
        self.expect_success(&format!("(assert {smt_str})"))
    }

    fn assert_at_most(&mut self, literals: &[String], bound: usize) -> Result<(), SmtLibError> {
        let constraint = at_most_to_smtlib(literals, bound);
        self.expect_success(&format!("(assert {constraint})"))
    }

    fn push(&mut self) -> Result<(), SmtLibError> {
        self.expect_success("(push 1)")?;
        self.scope_marks.push(self.declared.len());
        Ok(())
    }

    fn pop(&mut self) -> Result<(), SmtLibError> {
        self.expect_success("(pop 1)")?;
        if let Some(mark) = self.scope_marks.pop() {
            self.declared.truncate(mark);
        }
        Ok(())
    }

    fn optimize(&mut self, sense: ObjectiveSense, term: &SmtTerm) -> Result<(), SmtLibError> {
        // Objective commands answer with a handle in some solvers.
        let response = self.send_command(&objective_to_smtlib(sense, term))?;
        tracing::trace!(response = %response, "objective registered");
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, SmtLibError> {
        let response = self.send_command("(check-sat)")?;
        match response.as_str() {
            "sat" => Ok(SatResult::Sat),
            "unsat" => Ok(SatResult::Unsat),
            "unknown" => {
                let reason = self
                    .send_command("(get-info :reason-unknown)")
                    .unwrap_or_else(|_| "solver returned unknown".into());
                Ok(SatResult::Unknown(reason))
            }
            other => Err(SmtLibError::SolverError(other.to_string())),
        }
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), SmtLibError> {
        let result = self.check_sat()?;
        if result != SatResult::Sat {
            return Ok((result, None));
        }

        let mut values = HashMap::new();
        for &(name, sort) in var_names {
            let response = self.send_command(&format!("(get-value ({name}))"))?;
            // Response format: ((name value))
            let value = parse_value(&response, sort).ok_or_else(|| {
                SmtLibError::ParseError(format!("value of {name}: {response}"))
            })?;
            values.insert(name.to_string(), value);
        }

        Ok((SatResult::Sat, Some(Model { values })))
    }

    fn reset(&mut self) -> Result<(), SmtLibError> {
        self.expect_success("(reset)")?;
        self.declared.clear();
        self.scope_marks.clear();
        self.configure(self.timeout_ms)
    }

    fn set_timeout_ms(&mut self, timeout_ms: u64) -> Result<(), SmtLibError> {
        self.timeout_ms = Some(timeout_ms);
        // Z3 reads zero as "no timeout".
        self.expect_success(&format!("(set-option :timeout {timeout_ms})"))
    }
}

fn paren_balance(line: &str) -> i64 {
    let mut depth = 0;
    let mut in_string = false;
    let mut in_quoted_symbol = false;
    for ch in line.chars() {
        match ch {
            '"' if !in_quoted_symbol => in_string = !in_string,
            '|' if !in_string => in_quoted_symbol = !in_quoted_symbol,
            '(' if !in_string && !in_quoted_symbol => depth += 1,
            ')' if !in_string && !in_quoted_symbol => depth -= 1,
            _ => {}
        }
    }
    depth
}

#[derive(Debug, Clone, PartialEq)]
enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_quoted_symbol = false;
    for ch in text.chars() {
        match ch {
            '|' => {
                in_quoted_symbol = !in_quoted_symbol;
                buf.push(ch);
            }
            '(' | ')' if !in_quoted_symbol => {
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
                out.push(ch.to_string());
            }
            c if c.is_whitespace() && !in_quoted_symbol => {
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
            }
            other => buf.push(other),
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

fn parse_sexp(text: &str) -> Option<Sexp> {
    let tokens = tokenize(text);
    let mut stack: Vec<Vec<Sexp>> = Vec::new();
    let mut result = None;
    for token in tokens {
        match token.as_str() {
            "(" => stack.push(Vec::new()),
            ")" => {
                let done = Sexp::List(stack.pop()?);
                match stack.last_mut() {
                    Some(parent) => parent.push(done),
                    None => result = Some(done),
                }
            }
            _ => match stack.last_mut() {
                Some(parent) => parent.push(Sexp::Atom(token)),
                None => result = Some(Sexp::Atom(token)),
            },
        }
    }
    if stack.is_empty() {
        result
    } else {
        None
    }
}

fn real_value(expr: &Sexp) -> Option<BigRational> {
    match expr {
        Sexp::Atom(text) => rational::parse_decimal(text),
        Sexp::List(items) => match items.as_slice() {
            [Sexp::Atom(op), inner] if op == "-" => real_value(inner).map(|v| -v),
            [Sexp::Atom(op), numer, denom] if op == "/" => {
                let d = real_value(denom)?;
                if d.is_zero() {
                    return None;
                }
                Some(real_value(numer)? / d)
            }
            _ => None,
        },
    }
}

fn parse_value(response: &str, sort: &SmtSort) -> Option<ModelValue> {
    let Sexp::List(outer) = parse_sexp(response)? else {
        return None;
    };
    let Some(Sexp::List(pair)) = outer.first() else {
        return None;
    };
    let value = pair.get(1)?;
    match sort {
        SmtSort::Real => real_value(value).map(ModelValue::Real),
        SmtSort::Bool => match value {
            Sexp::Atom(text) if text == "true" => Some(ModelValue::Bool(true)),
            Sexp::Atom(text) if text == "false" => Some(ModelValue::Bool(false)),
            _ => None,
        },
    }
}
