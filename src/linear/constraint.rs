//! Linear constraint rows and view folding.

use crate::error::{ModelError, Result};
use crate::expr::{Encoding, Node, NodeId, NodeKind};
use crate::flat::{FlatVar, VarId};
use std::fmt;

/// A flat row `lhs <= sum(coef_i * var_i) <= rhs`.
///
/// Terms are kept merged: a variable appears at most once and never with
/// a zero coefficient.
///
/// # Examples
///
/// ```
/// use u_mipmodel::linear::LinearConstraint;
///
/// let row = LinearConstraint::new(f64::NEG_INFINITY, 4.0);
/// assert!(!row.is_equality());
/// assert!(row.terms().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearConstraint {
    terms: Vec<(VarId, f64)>,
    lhs: f64,
    rhs: f64,
}

impl LinearConstraint {
    /// Creates an empty row with the given bounds.
    pub fn new(lhs: f64, rhs: f64) -> Self {
        Self {
            terms: Vec::new(),
            lhs,
            rhs,
        }
    }

    /// Merged terms in insertion order.
    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    /// Lower bound of the row.
    pub fn lhs(&self) -> f64 {
        self.lhs
    }

    /// Upper bound of the row.
    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    pub(crate) fn set_bounds(&mut self, lhs: f64, rhs: f64) {
        self.lhs = lhs;
        self.rhs = rhs;
    }

    /// Whether both bounds coincide.
    pub fn is_equality(&self) -> bool {
        self.lhs == self.rhs
    }

    /// Coefficient of `var` in this row (0 when absent).
    pub fn coef_of(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .find(|(v, _)| *v == var)
            .map_or(0.0, |(_, c)| *c)
    }

    /// Adds `coef * var`, merging with an existing term on `var`.
    pub fn add_var(&mut self, var: VarId, coef: f64) {
        if coef == 0.0 {
            return;
        }
        match self.terms.iter().position(|(v, _)| *v == var) {
            Some(i) => {
                self.terms[i].1 += coef;
                if self.terms[i].1 == 0.0 {
                    self.terms.remove(i);
                }
            }
            None => self.terms.push((var, coef)),
        }
    }

    /// Adds a constant to the summed side by moving it into both bounds.
    pub fn add_constant(&mut self, k: f64) {
        self.lhs -= k;
        self.rhs -= k;
    }

    /// Adds `coef * node`, expanding views and sums into their operands.
    ///
    /// A view `k*x + c` pushes `coef*k` onto `x` and folds `coef*c` into the
    /// bounds, recursively. An affine sum distributes `coef` over its
    /// weighted children. A node posted as a top-level constraint reads as
    /// the constant 1. Anything else must already own a variable.
    pub fn add_coef(&mut self, nodes: &[Node], id: NodeId, coef: f64) -> Result<()> {
        let node = nodes.get(id.index()).ok_or(ModelError::UnknownNode(id))?;
        if coef == 0.0 {
            return Ok(());
        }

        match (&node.kind, node.encoding) {
            (
                NodeKind::View {
                    base,
                    scale,
                    offset,
                    ..
                },
                _,
            ) => {
                self.add_constant(coef * offset);
                self.add_coef(nodes, *base, coef * scale)
            }
            (_, Some(Encoding::Var(var))) => {
                self.add_var(var, coef);
                Ok(())
            }
            (
                NodeKind::Sum {
                    vars,
                    weights,
                    offset,
                },
                Some(Encoding::Affine),
            ) => {
                self.add_constant(coef * offset);
                for (child, weight) in vars.iter().zip(weights.iter()) {
                    self.add_coef(nodes, *child, coef * *weight as f64)?;
                }
                Ok(())
            }
            (_, Some(Encoding::Posted)) => {
                self.add_constant(coef);
                Ok(())
            }
            _ => Err(ModelError::NotEncoded(id)),
        }
    }

    /// `sum(coef_i * values[var_i])`.
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * values.get(v.index()).copied().unwrap_or(0.0))
            .sum()
    }

    /// Smallest and largest activity allowed by the variables' bounds.
    ///
    /// A term on a variable missing from `vars` leaves the activity unbounded.
    pub fn activity_bounds(&self, vars: &[FlatVar]) -> (f64, f64) {
        self.terms
            .iter()
            .fold((0.0, 0.0), |(lo, hi), (v, c)| match vars.get(v.index()) {
                Some(var) => {
                    let (a, b) = (c * var.lower, c * var.upper);
                    (lo + a.min(b), hi + a.max(b))
                }
                None => (f64::NEG_INFINITY, f64::INFINITY),
            })
    }

    /// Whether every term is an integral coefficient on an integral variable
    /// present in `vars`.
    pub fn is_integral(&self, vars: &[FlatVar]) -> bool {
        self.terms.iter().all(|(v, c)| {
            c.fract() == 0.0 && vars.get(v.index()).is_some_and(FlatVar::is_integral)
        })
    }

    /// Whether the activity under `values` lies within the bounds.
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let activity = self.activity(values);
        activity >= self.lhs - tolerance && activity <= self.rhs + tolerance
    }
}

impl fmt::Display for LinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sum = String::new();
        for (i, (var, coef)) in self.terms.iter().enumerate() {
            if i == 0 {
                sum.push_str(&format!("{coef}*{var}"));
            } else if *coef < 0.0 {
                sum.push_str(&format!(" - {}*{var}", -coef));
            } else {
                sum.push_str(&format!(" + {coef}*{var}"));
            }
        }
        if sum.is_empty() {
            sum.push('0');
        }
        if self.is_equality() {
            write!(f, "{sum} == {}", self.rhs)
        } else {
            write!(f, "{} <= {sum} <= {}", self.lhs, self.rhs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ViewKind;
    use crate::flat::{FlatModel, VarKind};
    use proptest::prelude::*;

    fn int_node(var: VarId, lower: f64, upper: f64) -> Node {
        let mut node = Node::new(
            NodeKind::IntVar {
                lower: lower as i64,
                upper: upper as i64,
                values: None,
            },
            lower,
            upper,
            false,
        );
        node.encoding = Some(Encoding::Var(var));
        node
    }

    fn view(base: usize, scale: f64, offset: f64) -> Node {
        let mut node = Node::new(
            NodeKind::View {
                kind: ViewKind::Linear,
                base: NodeId::new(base),
                scale,
                offset,
            },
            0.0,
            0.0,
            false,
        );
        node.encoding = Some(Encoding::Affine);
        node
    }

    #[test]
    fn test_merge_terms() {
        let mut row = LinearConstraint::new(0.0, 0.0);
        let (x, y) = (VarId::new(0), VarId::new(1));
        row.add_var(x, 2.0);
        row.add_var(y, 1.0);
        row.add_var(x, -2.0);
        assert_eq!(row.terms(), &[(y, 1.0)]);
        assert_eq!(row.coef_of(x), 0.0);
    }

    #[test]
    fn test_nested_view_folding() {
        // y = 3 * (2x + 1) - 4
        let x = VarId::new(0);
        let nodes = vec![int_node(x, 0.0, 10.0), view(0, 2.0, 1.0), view(1, 3.0, -4.0)];

        let mut row = LinearConstraint::new(0.0, 0.0);
        row.add_coef(&nodes, NodeId::new(2), 1.0).unwrap();
        assert_eq!(row.terms(), &[(x, 6.0)]);
        // 6x - 1 == 0
        assert_eq!(row.rhs(), 1.0);
        assert_eq!(row.lhs(), 1.0);
    }

    #[test]
    fn test_sum_distributes() {
        let (x, y) = (VarId::new(0), VarId::new(1));
        let mut sum = Node::new(
            NodeKind::Sum {
                vars: vec![NodeId::new(0), NodeId::new(1)].into(),
                weights: vec![2, -1].into(),
                offset: 5.0,
            },
            0.0,
            0.0,
            false,
        );
        sum.encoding = Some(Encoding::Affine);
        let nodes = vec![int_node(x, 0.0, 3.0), int_node(y, 0.0, 3.0), sum];

        let mut row = LinearConstraint::new(f64::NEG_INFINITY, 10.0);
        row.add_coef(&nodes, NodeId::new(2), 3.0).unwrap();
        assert_eq!(row.terms(), &[(x, 6.0), (y, -3.0)]);
        assert_eq!(row.rhs(), -5.0);
    }

    #[test]
    fn test_unencoded_rejected() {
        let nodes = vec![Node::new(
            NodeKind::FloatVar {
                lower: 0.0,
                upper: 1.0,
            },
            0.0,
            1.0,
            true,
        )];
        let mut row = LinearConstraint::new(0.0, 1.0);
        assert_eq!(
            row.add_coef(&nodes, NodeId::new(0), 1.0),
            Err(ModelError::NotEncoded(NodeId::new(0)))
        );
        assert_eq!(
            row.add_coef(&nodes, NodeId::new(3), 1.0),
            Err(ModelError::UnknownNode(NodeId::new(3)))
        );
    }

    #[test]
    fn test_activity_bounds() {
        let mut model = FlatModel::new();
        let x = model.new_var("x", VarKind::Integer, -2.0, 3.0);
        let y = model.new_var("y", VarKind::Continuous, 0.0, 1.5);
        let mut row = LinearConstraint::new(0.0, 0.0);
        row.add_var(x, -2.0);
        row.add_var(y, 1.0);
        assert_eq!(row.activity_bounds(model.vars()), (-6.0, 5.5));
        assert!(!row.is_integral(model.vars()));
        assert_eq!(row.to_string(), "-2*v0 + 1*v1 == 0");
    }

    #[test]
    fn test_bounds_with_missing_variable() {
        let mut model = FlatModel::new();
        let x = model.new_var("x", VarKind::Integer, 0.0, 3.0);
        let mut row = LinearConstraint::new(0.0, 0.0);
        row.add_var(x, 2.0);
        row.add_var(VarId::new(5), 1.0);
        assert_eq!(
            row.activity_bounds(model.vars()),
            (f64::NEG_INFINITY, f64::INFINITY)
        );
        assert!(!row.is_integral(model.vars()));
        assert_eq!(row.activity_bounds(&[]), (f64::NEG_INFINITY, f64::INFINITY));

        let mut known = LinearConstraint::new(0.0, 0.0);
        known.add_var(x, 2.0);
        assert_eq!(known.activity_bounds(model.vars()), (0.0, 6.0));
        assert!(known.is_integral(model.vars()));
    }

    proptest! {
        #[test]
        fn prop_view_chain_folds_to_one_term(
            chain in proptest::collection::vec((-5i64..=5, -20i64..=20), 1..6),
            x_val in -10i64..=10,
        ) {
            let x = VarId::new(0);
            let mut nodes = vec![int_node(x, -10.0, 10.0)];
            let mut expected = x_val as f64;
            for (i, &(scale, offset)) in chain.iter().enumerate() {
                nodes.push(view(i, scale as f64, offset as f64));
                expected = scale as f64 * expected + offset as f64;
            }

            let mut row = LinearConstraint::new(0.0, 0.0);
            row.add_coef(&nodes, NodeId::new(chain.len()), 1.0).unwrap();
            prop_assert!(row.terms().len() <= 1);
            let folded = row.activity(&[x_val as f64]) - row.rhs();
            prop_assert!((folded - expected).abs() < 1e-6);
        }
    }
}
