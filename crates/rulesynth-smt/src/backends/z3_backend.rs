use std::collections::HashMap;

use num::bigint::BigInt;
use num::rational::BigRational;
use num::traits::ToPrimitive;
use thiserror::Error;
use z3::SatResult as Z3SatResult;

use crate::solver::{ConstraintOracle, Model, ModelValue, ObjectiveSense, SatResult};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Sort mismatch for variable {0}")]
    SortMismatch(String),
}

/// Oracle backed by Z3's optimization context.
pub struct Z3Solver {
    optimizer: z3::Optimize,
    real_vars: HashMap<String, z3::ast::Real>,
    bool_vars: HashMap<String, z3::ast::Bool>,
    params: Option<z3::Params>,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            optimizer: z3::Optimize::new(),
            real_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            params: None,
        }
    }

    /// Per-check timeout in milliseconds; zero disables it.
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        if timeout_ms == 0 {
            return Self::new();
        }
        let optimizer = z3::Optimize::new();
        let mut params = z3::Params::new();
        params.set_u32("timeout", timeout_ms.min(u64::from(u32::MAX)) as u32);
        optimizer.set_params(&params);
        Self {
            optimizer,
            real_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            params: Some(params),
        }
    }

    fn real_literal(value: &BigRational) -> Result<z3::ast::Real, Z3Error> {
        match (value.numer().to_i64(), value.denom().to_i64()) {
            (Some(n), Some(d)) => Ok(z3::ast::Real::from_rational(n, d)),
            _ => Err(Z3Error::Internal(format!(
                "rational constant {value} exceeds 64-bit range"
            ))),
        }
    }

    fn translate_term(&self, term: &SmtTerm) -> Result<Z3Term, Z3Error> {
        match term {
            SmtTerm::Var(name) => {
                if let Some(v) = self.real_vars.get(name) {
                    Ok(Z3Term::Real(v.clone()))
                } else if let Some(v) = self.bool_vars.get(name) {
                    Ok(Z3Term::Bool(v.clone()))
                } else {
                    Err(Z3Error::UnknownVariable(name.clone()))
                }
            }
            SmtTerm::RealLit(r) => Ok(Z3Term::Real(Self::real_literal(r)?)),
            SmtTerm::BoolLit(b) => Ok(Z3Term::Bool(z3::ast::Bool::from_bool(*b))),
            SmtTerm::Add(terms) => {
                if terms.is_empty() {
                    return Ok(Z3Term::Real(z3::ast::Real::from_rational(0, 1)));
                }
                let reals = terms
                    .iter()
                    .map(|t| self.translate_term(t).and_then(Z3Term::into_real))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&z3::ast::Real> = reals.iter().collect();
                Ok(Z3Term::Real(z3::ast::Real::add(&refs)))
            }
            SmtTerm::Sub(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_real()?;
                let r = self.translate_term(rhs)?.into_real()?;
                Ok(Z3Term::Real(&l - &r))
            }
            SmtTerm::Neg(inner) => {
                let v = self.translate_term(inner)?.into_real()?;
                Ok(Z3Term::Real(v.unary_minus()))
            }
            SmtTerm::Scale(factor, inner) => {
                let c = Self::real_literal(factor)?;
                let v = self.translate_term(inner)?.into_real()?;
                Ok(Z3Term::Real(&c * &v))
            }
            SmtTerm::Eq(lhs, rhs) => {
                let l = self.translate_term(lhs)?;
                let r = self.translate_term(rhs)?;
                match (l, r) {
                    (Z3Term::Real(lr), Z3Term::Real(rr)) => Ok(Z3Term::Bool(lr.eq(&rr))),
                    (Z3Term::Bool(lb), Z3Term::Bool(rb)) => Ok(Z3Term::Bool(lb.eq(&rb))),
                    _ => Err(Z3Error::Internal("Sort mismatch in Eq".into())),
                }
            }
            SmtTerm::Lt(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_real()?;
                let r = self.translate_term(rhs)?.into_real()?;
                Ok(Z3Term::Bool(l.lt(&r)))
            }
            SmtTerm::Le(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_real()?;
                let r = self.translate_term(rhs)?.into_real()?;
                Ok(Z3Term::Bool(l.le(&r)))
            }
            SmtTerm::Gt(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_real()?;
                let r = self.translate_term(rhs)?.into_real()?;
                Ok(Z3Term::Bool(l.gt(&r)))
            }
            SmtTerm::Ge(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_real()?;
                let r = self.translate_term(rhs)?.into_real()?;
                Ok(Z3Term::Bool(l.ge(&r)))
            }
            SmtTerm::And(terms) => {
                let bools = terms
                    .iter()
                    .map(|t| self.translate_term(t).and_then(Z3Term::into_bool))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::and(&refs)))
            }
            SmtTerm::Or(terms) => {
                let bools = terms
                    .iter()
                    .map(|t| self.translate_term(t).and_then(Z3Term::into_bool))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::or(&refs)))
            }
            SmtTerm::Not(inner) => {
                let b = self.translate_term(inner)?.into_bool()?;
                Ok(Z3Term::Bool(b.not()))
            }
            SmtTerm::Implies(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_bool()?;
                let r = self.translate_term(rhs)?.into_bool()?;
                Ok(Z3Term::Bool(l.implies(&r)))
            }
        }
    }

    fn map_result(result: Z3SatResult) -> SatResult {
        match result {
            Z3SatResult::Sat => SatResult::Sat,
            Z3SatResult::Unsat => SatResult::Unsat,
            Z3SatResult::Unknown => SatResult::Unknown("Z3 returned unknown".into()),
        }
    }
}

enum Z3Term {
    Real(z3::ast::Real),
    Bool(z3::ast::Bool),
}

impl Z3Term {
    fn into_real(self) -> Result<z3::ast::Real, Z3Error> {
        match self {
            Z3Term::Real(r) => Ok(r),
            Z3Term::Bool(_) => Err(Z3Error::Internal("Expected Real, got Bool".into())),
        }
    }

    fn into_bool(self) -> Result<z3::ast::Bool, Z3Error> {
        match self {
            Z3Term::Bool(b) => Ok(b),
            Z3Term::Real(_) => Err(Z3Error::Internal("Expected Bool, got Real".into())),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintOracle for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        match sort {
            SmtSort::Real => {
                if self.bool_vars.contains_key(name) {
                    return Err(Z3Error::SortMismatch(name.to_string()));
                }
                let v = z3::ast::Real::new_const(name);
                self.real_vars.insert(name.to_string(), v);
            }
            SmtSort::Bool => {
                if self.real_vars.contains_key(name) {
                    return Err(Z3Error::SortMismatch(name.to_string()));
                }
                let v = z3::ast::Bool::new_const(name);
                self.bool_vars.insert(name.to_string(), v);
            }
        }
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let z3_term = self.translate_term(term)?.into_bool()?;
        self.optimizer.assert(&z3_term);
        Ok(())
    }

    fn assert_at_most(&mut self, literals: &[String], bound: usize) -> Result<(), Z3Error> {
        if bound >= literals.len() {
            return Ok(());
        }
        let mut lits = Vec::with_capacity(literals.len());
        for name in literals {
            let v = self
                .bool_vars
                .get(name)
                .ok_or_else(|| Z3Error::UnknownVariable(name.clone()))?;
            lits.push(v.clone());
        }
        let weighted: Vec<(&z3::ast::Bool, i32)> = lits.iter().map(|b| (b, 1)).collect();
        let k = i32::try_from(bound)
            .map_err(|_| Z3Error::Internal(format!("cardinality bound {bound} too large")))?;
        self.optimizer.assert(&z3::ast::Bool::pb_le(&weighted, k));
        Ok(())
    }

    fn push(&mut self) -> Result<(), Z3Error> {
        self.optimizer.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Z3Error> {
        self.optimizer.pop();
        Ok(())
    }

    fn optimize(&mut self, sense: ObjectiveSense, term: &SmtTerm) -> Result<(), Z3Error> {
        let objective = self.translate_term(term)?.into_real()?;
        match sense {
            ObjectiveSense::Minimize => self.optimizer.minimize(&objective),
            ObjectiveSense::Maximize => self.optimizer.maximize(&objective),
        }
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        Ok(Self::map_result(self.optimizer.check(&[])))
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        let result = Self::map_result(self.optimizer.check(&[]));
        if result != SatResult::Sat {
            return Ok((result, None));
        }
        let z3_model = self
            .optimizer
            .get_model()
            .ok_or_else(|| Z3Error::Internal("SAT but no model available".into()))?;
        let mut values = HashMap::new();
        for &(name, sort) in var_names {
            match sort {
                SmtSort::Real => {
                    if let Some(v) = self.real_vars.get(name) {
                        if let Some(val) = z3_model.eval::<z3::ast::Real>(v, true) {
                            if let Some((n, d)) = val.as_rational() {
                                let value = BigRational::new(BigInt::from(n), BigInt::from(d));
                                values.insert(name.to_string(), ModelValue::Real(value));
                            }
                        }
                    }
                }
                SmtSort::Bool => {
                    if let Some(v) = self.bool_vars.get(name) {
                        if let Some(val) = z3_model.eval::<z3::ast::Bool>(v, true) {
                            if let Some(b) = val.as_bool() {
                                values.insert(name.to_string(), ModelValue::Bool(b));
                            }
                        }
                    }
                }
            }
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }

    fn set_timeout_ms(&mut self, timeout_ms: u64) -> Result<(), Z3Error> {
        let mut params = z3::Params::new();
        params.set_u32("timeout", timeout_ms.min(u64::from(u32::MAX)) as u32);
        self.optimizer.set_params(&params);
        self.params = Some(params);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.optimizer = z3::Optimize::new();
        if let Some(params) = &self.params {
            self.optimizer.set_params(params);
        }
        self.real_vars.clear();
        self.bool_vars.clear();
        Ok(())
    }
}
