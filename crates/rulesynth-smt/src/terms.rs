use num::rational::BigRational;
use num::traits::Zero;

use crate::rational;

/// Abstract SMT term representation, solver-agnostic.
///
/// Arithmetic is restricted to linear real arithmetic: sums, negation and
/// multiplication by a rational constant.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    /// Real literal.
    RealLit(BigRational),
    /// Boolean literal.
    BoolLit(bool),

    // Arithmetic
    Add(Vec<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),
    Neg(Box<SmtTerm>),
    Scale(BigRational, Box<SmtTerm>),

    // Comparison
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn real(value: BigRational) -> Self {
        SmtTerm::RealLit(value)
    }

    /// Exact real literal for a finite `f64`; non-finite values map to zero.
    pub fn real_f64(value: f64) -> Self {
        SmtTerm::RealLit(rational::from_f64(value).unwrap_or_else(BigRational::zero))
    }

    pub fn real_int(value: i64) -> Self {
        SmtTerm::RealLit(rational::from_integer(value))
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn sum(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Add(terms)
    }

    pub fn add(self, other: SmtTerm) -> Self {
        SmtTerm::Add(vec![self, other])
    }

    pub fn sub(self, other: SmtTerm) -> Self {
        SmtTerm::Sub(Box::new(self), Box::new(other))
    }

    pub fn neg(self) -> Self {
        SmtTerm::Neg(Box::new(self))
    }

    pub fn scale(self, factor: BigRational) -> Self {
        SmtTerm::Scale(factor, Box::new(self))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        SmtTerm::Eq(Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: SmtTerm) -> Self {
        SmtTerm::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: SmtTerm) -> Self {
        SmtTerm::Le(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: SmtTerm) -> Self {
        SmtTerm::Gt(Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: SmtTerm) -> Self {
        SmtTerm::Ge(Box::new(self), Box::new(other))
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        SmtTerm::Implies(Box::new(self), Box::new(other))
    }

    /// Names of all variables referenced by this term, in first-seen order.
    pub fn free_vars(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SmtTerm::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            SmtTerm::RealLit(_) | SmtTerm::BoolLit(_) => {}
            SmtTerm::Add(terms) | SmtTerm::And(terms) | SmtTerm::Or(terms) => {
                for t in terms {
                    t.collect_vars(out);
                }
            }
            SmtTerm::Neg(inner) | SmtTerm::Not(inner) | SmtTerm::Scale(_, inner) => {
                inner.collect_vars(out)
            }
            SmtTerm::Sub(lhs, rhs)
            | SmtTerm::Eq(lhs, rhs)
            | SmtTerm::Lt(lhs, rhs)
            | SmtTerm::Le(lhs, rhs)
            | SmtTerm::Gt(lhs, rhs)
            | SmtTerm::Ge(lhs, rhs)
            | SmtTerm::Implies(lhs, rhs) => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
        }
    }
}
