//! Flat linear model: the boundary with the numeric backend.
//!
//! A [`FlatModel`] lists variable declarations `(ident, kind, lower, upper)`
//! (with the value list for enumerated domains), constraint rows
//! `lhs <= sum(coef * var) <= rhs`, and an optional objective
//! `(direction, var)`.

mod model;

pub use model::{FlatModel, FlatObjective, FlatVar, ObjectiveSense, VarId, VarKind};
