#![doc = include_str!("../README.md")]

//! Constraint-oracle interface for belief-rule synthesis.
//!
//! Formulas are built from boolean literals, real-valued unknowns, linear
//! real arithmetic and comparisons. Backends answer satisfiability and
//! optimization queries under push/pop scoping: the native Z3 binding is the
//! default, and an SMT-LIB2 process driver talks to any external solver.

pub mod backends;
pub mod rational;
pub mod solver;
pub mod sorts;
pub mod terms;
