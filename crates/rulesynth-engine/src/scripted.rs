//! Oracle that answers checks from a fixed script, for driving the fitter
//! through unknown and unsat paths a real solver will not produce on
//! demand.

use std::collections::VecDeque;
use std::io;

use rulesynth_smt::rational;
use rulesynth_smt::solver::{ConstraintOracle, Model, ModelValue, ObjectiveSense, SatResult};
use rulesynth_smt::sorts::SmtSort;
use rulesynth_smt::terms::SmtTerm;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    /// Satisfiable; the first `n` requested Bool variables are true and
    /// every Real is 1/2.
    Sat(usize),
    Unsat,
    Unknown(&'static str),
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedOracle {
    replies: VecDeque<Reply>,
    /// Bound of every `at-most` assertion, in order.
    pub bounds: Vec<usize>,
    pub objectives: Vec<ObjectiveSense>,
    pub checks: usize,
}

impl ScriptedOracle {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }

    fn next_reply(&mut self) -> Result<Reply, io::Error> {
        self.checks += 1;
        self.replies
            .pop_front()
            .ok_or_else(|| io::Error::other("script exhausted"))
    }
}

impl ConstraintOracle for ScriptedOracle {
    type Error = io::Error;

    fn declare_var(&mut self, _name: &str, _sort: &SmtSort) -> Result<(), Self::Error> {
        Ok(())
    }

    fn assert(&mut self, _term: &SmtTerm) -> Result<(), Self::Error> {
        Ok(())
    }

    fn assert_at_most(&mut self, _literals: &[String], bound: usize) -> Result<(), Self::Error> {
        self.bounds.push(bound);
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
        Ok(match self.next_reply()? {
            Reply::Sat(_) => SatResult::Sat,
            Reply::Unsat => SatResult::Unsat,
            Reply::Unknown(reason) => SatResult::Unknown(reason.into()),
        })
    }

    fn check_sat_with_model(
        &mut self,
        vars: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error> {
        match self.next_reply()? {
            Reply::Sat(true_bools) => {
                let mut model = Model::default();
                let mut bools = 0usize;
                for (name, sort) in vars {
                    let value = match sort {
                        SmtSort::Real => ModelValue::Real(rational::ratio(1, 2)),
                        SmtSort::Bool => {
                            bools += 1;
                            ModelValue::Bool(bools <= true_bools)
                        }
                    };
                    model.values.insert(name.to_string(), value);
                }
                Ok((SatResult::Sat, Some(model)))
            }
            Reply::Unsat => Ok((SatResult::Unsat, None)),
            Reply::Unknown(reason) => Ok((SatResult::Unknown(reason.into()), None)),
        }
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.replies.clear();
        Ok(())
    }
}
