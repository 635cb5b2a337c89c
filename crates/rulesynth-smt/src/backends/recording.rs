use std::io::Write;

use crate::backends::smtlib_printer::{
    at_most_to_smtlib, objective_to_smtlib, sort_to_smtlib, to_smtlib,
};
use crate::solver::{ConstraintOracle, Model, ObjectiveSense, SatResult};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Oracle wrapper that records every call as an SMT-LIB2 script while
/// forwarding it to the inner oracle.
pub struct RecordingOracle<O> {
    inner: O,
    script: Vec<String>,
}

impl<O: ConstraintOracle> RecordingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            script: Vec::new(),
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn into_inner(self) -> O {
        self.inner
    }

    /// Recorded commands, one per line.
    pub fn script(&self) -> &[String] {
        &self.script
    }

    pub fn write_script<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for line in &self.script {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn record_result(&mut self, result: &SatResult) {
        let line = match result {
            SatResult::Sat => "; sat".to_string(),
            SatResult::Unsat => "; unsat".to_string(),
            SatResult::Unknown(reason) => format!("; unknown ({reason})"),
        };
        self.script.push(line);
    }
}

impl<O: ConstraintOracle> ConstraintOracle for RecordingOracle<O> {
    type Error = O::Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error> {
        self.script
            .push(format!("(declare-const {name} {})", sort_to_smtlib(sort)));
        self.inner.declare_var(name, sort)
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error> {
        self.script.push(format!("(assert {})", to_smtlib(term)));
        self.inner.assert(term)
    }

    fn assert_at_most(&mut self, literals: &[String], bound: usize) -> Result<(), Self::Error> {
        self.script
            .push(format!("(assert {})", at_most_to_smtlib(literals, bound)));
        self.inner.assert_at_most(literals, bound)
    }

    fn push(&mut self) -> Result<(), Self::Error> {
        self.script.push("(push 1)".to_string());
        self.inner.push()
    }

    fn pop(&mut self) -> Result<(), Self::Error> {
        self.script.push("(pop 1)".to_string());
        self.inner.pop()
    }

    fn optimize(&mut self, sense: ObjectiveSense, term: &SmtTerm) -> Result<(), Self::Error> {
        self.script.push(objective_to_smtlib(sense, term));
        self.inner.optimize(sense, term)
    }

    fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
        self.script.push("(check-sat)".to_string());
        let result = self.inner.check_sat()?;
        self.record_result(&result);
        Ok(result)
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error> {
        self.script.push("(check-sat)".to_string());
        let (result, model) = self.inner.check_sat_with_model(var_names)?;
        self.record_result(&result);
        if model.is_some() && !var_names.is_empty() {
            let names: Vec<&str> = var_names.iter().map(|(n, _)| *n).collect();
            self.script.push(format!("(get-value ({}))", names.join(" ")));
        }
        Ok((result, model))
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.script.push("(reset)".to_string());
        self.inner.reset()
    }

    fn set_timeout_ms(&mut self, timeout_ms: u64) -> Result<(), Self::Error> {
        self.script
            .push(format!("(set-option :timeout {timeout_ms})"));
        self.inner.set_timeout_ms(timeout_ms)
    }
}
