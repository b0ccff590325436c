//! Flat linear model handed to the numeric backend.

use crate::linear::LinearConstraint;
use std::fmt;
use tracing::trace;

/// Identifier of a flat decision variable (its column index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarId(u32);

impl VarId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Domain kind of a flat variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VarKind {
    Continuous,
    Integer,
    /// Integer in `{0, 1}`.
    Binary,
}

/// A declared variable: `(ident, kind, lower, upper)`, plus the explicit
/// value list for enumerated integer domains.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlatVar {
    /// Position in the model's variable list.
    pub id: VarId,
    /// Name used in model dumps.
    pub name: String,
    /// Integrality class.
    pub kind: VarKind,
    /// Lower bound, possibly `-inf` for continuous variables.
    pub lower: f64,
    /// Upper bound, possibly `+inf` for continuous variables.
    pub upper: f64,
    /// Admissible values of an integer variable with holes in its range.
    pub values: Option<Vec<i64>>,
}

impl FlatVar {
    /// Whether the variable must take an integer value.
    pub fn is_integral(&self) -> bool {
        !matches!(self.kind, VarKind::Continuous)
    }
}

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectiveSense {
    Minimise,
    Maximise,
}

/// Objective metadata: a direction attached to one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlatObjective {
    pub sense: ObjectiveSense,
    pub var: VarId,
}

/// Variables, rows and objective produced by lowering.
///
/// Only the lowering engine appends to a flat model; backends read it.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlatModel {
    vars: Vec<FlatVar>,
    rows: Vec<LinearConstraint>,
    objective: Option<FlatObjective>,
    decision_vars: Vec<VarId>,
}

impl FlatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn new_var(
        &mut self,
        name: impl Into<String>,
        kind: VarKind,
        lower: f64,
        upper: f64,
    ) -> VarId {
        let id = VarId::new(self.vars.len());
        let (lower, upper) = match kind {
            VarKind::Binary => (lower.max(0.0), upper.min(1.0)),
            _ => (lower, upper),
        };
        self.vars.push(FlatVar {
            id,
            name: name.into(),
            kind,
            lower,
            upper,
            values: None,
        });
        id
    }

    pub(crate) fn var_mut(&mut self, id: VarId) -> &mut FlatVar {
        &mut self.vars[id.index()]
    }

    pub(crate) fn push_row(&mut self, row: LinearConstraint) {
        trace!(row = %row, "row");
        self.rows.push(row);
    }

    /// Drops every variable and row past the given counts and restores the
    /// objective.
    pub(crate) fn truncate(
        &mut self,
        vars: usize,
        rows: usize,
        objective: Option<FlatObjective>,
    ) {
        self.vars.truncate(vars);
        self.rows.truncate(rows);
        self.objective = objective;
    }

    pub(crate) fn set_objective(&mut self, objective: FlatObjective) {
        self.objective = Some(objective);
    }

    pub(crate) fn set_decision_vars(&mut self, vars: Vec<VarId>) {
        self.decision_vars = vars;
    }

    pub fn vars(&self) -> &[FlatVar] {
        &self.vars
    }

    pub fn var(&self, id: VarId) -> Option<&FlatVar> {
        self.vars.get(id.index())
    }

    pub fn rows(&self) -> &[LinearConstraint] {
        &self.rows
    }

    pub fn objective(&self) -> Option<FlatObjective> {
        self.objective
    }

    /// Variables the search should branch on first. Empty means all.
    pub fn decision_vars(&self) -> &[VarId] {
        &self.decision_vars
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Indices of the rows violated by `values` (one value per variable).
    pub fn violated_rows(&self, values: &[f64], tolerance: f64) -> Vec<usize> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.rows
                .par_iter()
                .enumerate()
                .filter(|(_, row)| !row.is_satisfied(values, tolerance))
                .map(|(i, _)| i)
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.rows
                .iter()
                .enumerate()
                .filter(|(_, row)| !row.is_satisfied(values, tolerance))
                .map(|(i, _)| i)
                .collect()
        }
    }

    /// Whether `values` lies in every variable domain and satisfies every row.
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        if values.len() != self.vars.len() {
            return false;
        }
        let in_domain = self.vars.iter().zip(values).all(|(var, &v)| {
            v >= var.lower - tolerance
                && v <= var.upper + tolerance
                && (!var.is_integral() || (v - v.round()).abs() <= tolerance)
        });
        in_domain && self.violated_rows(values, tolerance).is_empty()
    }

    /// Value of the objective variable under `values`.
    pub fn objective_value(&self, values: &[f64]) -> Option<f64> {
        self.objective
            .and_then(|obj| values.get(obj.var.index()).copied())
    }
}

impl fmt::Display for FlatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for var in &self.vars {
            match &var.values {
                Some(values) => writeln!(
                    f,
                    "{} {}: {:?} in {:?}",
                    var.id, var.name, var.kind, values
                )?,
                None => writeln!(
                    f,
                    "{} {}: {:?} in [{}, {}]",
                    var.id, var.name, var.kind, var.lower, var.upper
                )?,
            }
        }
        for row in &self.rows {
            writeln!(f, "{row}")?;
        }
        if let Some(obj) = self.objective {
            writeln!(f, "{:?} {}", obj.sense, obj.var)?;
        }
        Ok(())
    }
}
