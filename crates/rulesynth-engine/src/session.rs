//! Scope-tracked access to a constraint oracle.

use rulesynth_smt::solver::{ConstraintOracle, Model, ObjectiveSense, SatResult};
use rulesynth_smt::sorts::SmtSort;
use rulesynth_smt::terms::SmtTerm;

use crate::error::FitError;

/// An oracle together with the depth of its open scopes.
///
/// Every push and pop goes through the session, which refuses to pop below
/// depth zero and reports scopes left open by a bracketed operation.
pub struct OracleSession<O> {
    oracle: O,
    depth: usize,
}

impl<O: ConstraintOracle> OracleSession<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle, depth: 0 }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn into_inner(self) -> O {
        self.oracle
    }

    pub fn push(&mut self) -> Result<(), FitError> {
        self.oracle.push().map_err(FitError::oracle)?;
        self.depth += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<(), FitError> {
        if self.depth == 0 {
            return Err(FitError::ScopeUnderflow);
        }
        self.oracle.pop().map_err(FitError::oracle)?;
        self.depth -= 1;
        Ok(())
    }

    pub fn expect_depth(&self, expected: usize) -> Result<(), FitError> {
        if self.depth == expected {
            Ok(())
        } else {
            Err(FitError::ScopeLeak {
                expected,
                found: self.depth,
            })
        }
    }

    /// Run `f` inside a fresh scope that is popped whatever `f` returns.
    /// An error from `f` takes precedence over a scope error.
    pub fn scoped<T, F>(&mut self, f: F) -> Result<T, FitError>
    where
        F: FnOnce(&mut Self) -> Result<T, FitError>,
    {
        let outer = self.depth;
        self.push()?;
        let result = f(self);
        let closed = self
            .expect_depth(outer + 1)
            .and_then(|()| self.pop());
        match (result, closed) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    pub fn declare(&mut self, name: &str, sort: SmtSort) -> Result<(), FitError> {
        self.oracle.declare_var(name, &sort).map_err(FitError::oracle)
    }

    pub fn assert(&mut self, term: &SmtTerm) -> Result<(), FitError> {
        self.oracle.assert(term).map_err(FitError::oracle)
    }

    pub fn assert_at_most(&mut self, literals: &[String], bound: usize) -> Result<(), FitError> {
        self.oracle
            .assert_at_most(literals, bound)
            .map_err(FitError::oracle)
    }

    pub fn optimize(&mut self, sense: ObjectiveSense, term: &SmtTerm) -> Result<(), FitError> {
        self.oracle.optimize(sense, term).map_err(FitError::oracle)
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: u64) -> Result<(), FitError> {
        self.oracle
            .set_timeout_ms(timeout_ms)
            .map_err(FitError::oracle)
    }

    pub fn check(
        &mut self,
        vars: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), FitError> {
        self.oracle
            .check_sat_with_model(vars)
            .map_err(FitError::oracle)
    }
}
