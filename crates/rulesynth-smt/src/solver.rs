use std::collections::HashMap;

use num::rational::BigRational;

use crate::rational;
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

/// A model (variable assignments) extracted from a SAT result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelValue {
    Real(BigRational),
    Bool(bool),
}

impl Model {
    pub fn get_real(&self, name: &str) -> Option<&BigRational> {
        match self.values.get(name) {
            Some(ModelValue::Real(r)) => Some(r),
            _ => None,
        }
    }

    pub fn get_real_f64(&self, name: &str) -> Option<f64> {
        self.get_real(name).map(rational::to_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ModelValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

/// Direction of an optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    Minimize,
    Maximize,
}

/// Abstract satisfiability/optimization oracle.
///
/// Assertions, cardinality bounds and objectives added after a `push` are
/// retracted by the matching `pop`, and so are declarations. A variable must
/// be declared again after popping the scope it was declared in; declaring a
/// visible variable again is a no-op.
pub trait ConstraintOracle {
    type Error: std::error::Error;

    /// Declare a new variable.
    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    /// Assert a constraint.
    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    /// Assert that at most `bound` of the given Boolean variables are true.
    fn assert_at_most(&mut self, literals: &[String], bound: usize) -> Result<(), Self::Error>;

    /// Push a new scope.
    fn push(&mut self) -> Result<(), Self::Error>;

    /// Pop a scope.
    fn pop(&mut self) -> Result<(), Self::Error>;

    /// Register an optimization objective for subsequent checks.
    fn optimize(&mut self, sense: ObjectiveSense, term: &SmtTerm) -> Result<(), Self::Error>;

    fn minimize(&mut self, term: &SmtTerm) -> Result<(), Self::Error> {
        self.optimize(ObjectiveSense::Minimize, term)
    }

    fn maximize(&mut self, term: &SmtTerm) -> Result<(), Self::Error> {
        self.optimize(ObjectiveSense::Maximize, term)
    }

    /// Check satisfiability.
    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    /// Check satisfiability and extract a model if SAT.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;

    /// Reset the solver state.
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Bound each subsequent check to `timeout_ms` milliseconds (zero
    /// removes the bound). Backends without timeout support ignore it.
    fn set_timeout_ms(&mut self, _timeout_ms: u64) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<O: ConstraintOracle + ?Sized> ConstraintOracle for &mut O {
    type Error = O::Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error> {
        (**self).declare_var(name, sort)
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error> {
        (**self).assert(term)
    }

    fn assert_at_most(&mut self, literals: &[String], bound: usize) -> Result<(), Self::Error> {
        (**self).assert_at_most(literals, bound)
    }

    fn push(&mut self) -> Result<(), Self::Error> {
        (**self).push()
    }

    fn pop(&mut self) -> Result<(), Self::Error> {
        (**self).pop()
    }

    fn optimize(&mut self, sense: ObjectiveSense, term: &SmtTerm) -> Result<(), Self::Error> {
        (**self).optimize(sense, term)
    }

    fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
        (**self).check_sat()
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error> {
        (**self).check_sat_with_model(var_names)
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        (**self).reset()
    }

    fn set_timeout_ms(&mut self, timeout_ms: u64) -> Result<(), Self::Error> {
        (**self).set_timeout_ms(timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;

    struct MockSolver {
        sat_result: SatResult,
        check_sat_calls: usize,
        reset_calls: usize,
        objectives: Vec<ObjectiveSense>,
    }

    impl MockSolver {
        fn new(sat_result: SatResult) -> Self {
            Self {
                sat_result,
                check_sat_calls: 0,
                reset_calls: 0,
                objectives: Vec::new(),
            }
        }
    }

    impl ConstraintOracle for MockSolver {
        type Error = io::Error;

        fn declare_var(&mut self, _name: &str, _sort: &SmtSort) -> Result<(), Self::Error> {
            Ok(())
        }

        fn assert(&mut self, _term: &SmtTerm) -> Result<(), Self::Error> {
            Ok(())
        }

        fn assert_at_most(&mut self, _literals: &[String], _bound: usize) -> Result<(), Self::Error> {
            Ok(())
        }

        fn push(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn pop(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn optimize(&mut self, sense: ObjectiveSense, _term: &SmtTerm) -> Result<(), Self::Error> {
            self.objectives.push(sense);
            Ok(())
        }

        fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
            self.check_sat_calls += 1;
            Ok(self.sat_result.clone())
        }

        fn check_sat_with_model(
            &mut self,
            _var_names: &[(&str, &SmtSort)],
        ) -> Result<(SatResult, Option<Model>), Self::Error> {
            Ok((self.sat_result.clone(), None))
        }

        fn reset(&mut self) -> Result<(), Self::Error> {
            self.reset_calls += 1;
            Ok(())
        }
    }

    #[test]
    fn model_getters_return_typed_values_only() {
        let mut values = HashMap::new();
        values.insert("t".to_string(), ModelValue::Real(rational::ratio(3, 5)));
        values.insert("flag".to_string(), ModelValue::Bool(true));
        let model = Model { values };

        assert_eq!(model.get_real("t"), Some(&rational::ratio(3, 5)));
        assert_eq!(model.get_real_f64("t"), Some(0.6));
        assert_eq!(model.get_bool("flag"), Some(true));
        assert_eq!(model.get_real("flag"), None);
        assert_eq!(model.get_bool("t"), None);
        assert_eq!(model.get_real("missing"), None);
        assert_eq!(model.get_bool("missing"), None);
    }

    #[test]
    fn minimize_and_maximize_delegate_to_optimize() {
        let mut solver = MockSolver::new(SatResult::Sat);
        solver.minimize(&SmtTerm::var("t")).expect("minimize");
        solver.maximize(&SmtTerm::var("t")).expect("maximize");
        assert_eq!(
            solver.objectives,
            vec![ObjectiveSense::Minimize, ObjectiveSense::Maximize]
        );
    }

    #[test]
    fn mutable_reference_forwards_every_call() {
        let mut solver = MockSolver::new(SatResult::Unknown("timeout".to_string()));
        {
            let mut by_ref = &mut solver;
            let result = by_ref.check_sat().expect("check_sat should succeed");
            assert_eq!(result, SatResult::Unknown("timeout".to_string()));
            by_ref.reset().expect("reset should succeed");
        }
        assert_eq!(solver.check_sat_calls, 1);
        assert_eq!(solver.reset_calls, 1);
    }
}
