//! Per-kind encoding dispatch: variables, views, sums, objectives.

use super::builder::ModelBuilder;
use crate::error::{ModelError, Result};
use crate::expr::{Encoding, NodeId, NodeKind};
use crate::flat::{FlatObjective, VarId, VarKind};
use crate::linear::LinearConstraint;
use tracing::debug;

impl ModelBuilder {
    /// Lowers one node whose children are already encoded.
    pub(super) fn encode(&mut self, id: NodeId, top_level: bool) -> Result<()> {
        let kind = self.nodes[id.index()].kind.clone();
        let rows_before = self.model.row_count();
        let vars_before = self.model.var_count();

        let encoding = match &kind {
            NodeKind::FloatVar { lower, upper } => Encoding::Var(self.model.new_var(
                format!("x{}", id.index()),
                VarKind::Continuous,
                *lower,
                *upper,
            )),
            NodeKind::IntVar {
                lower,
                upper,
                values,
            } => Encoding::Var(self.encode_int_var(id, *lower, *upper, values.as_deref())),
            NodeKind::View { .. } => Encoding::Affine,
            NodeKind::Sum { .. } => self.encode_sum(id, top_level)?,
            NodeKind::Binop(op) => self.encode_binop(id, op, top_level)?,
            NodeKind::Flow {
                kind: flow,
                vars,
                values,
                card_lb,
                card_ub,
            } => {
                if !top_level {
                    return Err(ModelError::NotReifiable(id));
                }
                self.encode_flow(id, *flow, vars, values, card_lb, card_ub)?;
                Encoding::Posted
            }
            NodeKind::Objective { sense, expr } => {
                if !top_level {
                    return Err(ModelError::NotReifiable(id));
                }
                if self.model.objective().is_some() {
                    return Err(ModelError::DuplicateObjective);
                }
                let obj = self.fresh_var_like(*expr, "obj")?;
                let mut row = LinearConstraint::new(0.0, 0.0);
                row.add_var(obj, 1.0);
                row.add_coef(&self.nodes, *expr, -1.0)?;
                self.post(row);
                self.model.set_objective(FlatObjective {
                    sense: *sense,
                    var: obj,
                });
                Encoding::Var(obj)
            }
        };

        self.nodes[id.index()].encoding = Some(encoding);
        self.encoded.push(id);
        debug!(
            node = %id,
            kind = kind.name(),
            top_level,
            vars = self.model.var_count() - vars_before,
            rows = self.model.row_count() - rows_before,
            "encoded"
        );
        Ok(())
    }

    pub(super) fn post(&mut self, row: LinearConstraint) {
        self.model.push_row(row);
    }

    /// Integer variable; with holes in `values`, also a one-hot selection
    /// `sum(b_i) == 1`, `x == sum(values[i] * b_i)`.
    fn encode_int_var(
        &mut self,
        id: NodeId,
        lower: i64,
        upper: i64,
        values: Option<&[i64]>,
    ) -> VarId {
        let name = format!("x{}", id.index());
        let var = self
            .model
            .new_var(name.as_str(), VarKind::Integer, lower as f64, upper as f64);
        let Some(values) = values else {
            return var;
        };
        // sorted and deduplicated, so no gap means contiguous
        if values.windows(2).all(|w| w[1].checked_sub(w[0]) == Some(1)) {
            return var;
        }

        self.model.var_mut(var).values = Some(values.to_vec());
        let mut one_hot = LinearConstraint::new(1.0, 1.0);
        let mut link = LinearConstraint::new(0.0, 0.0);
        link.add_var(var, 1.0);
        for &v in values {
            let b = self
                .model
                .new_var(format!("{name}=={v}"), VarKind::Binary, 0.0, 1.0);
            one_hot.add_var(b, 1.0);
            link.add_var(b, -(v as f64));
        }
        self.post(one_hot);
        self.post(link);
        var
    }

    /// Top level: `lower <= sum <= upper` as one row, sum stays affine.
    /// Nested: an auxiliary variable equal to the sum.
    fn encode_sum(&mut self, id: NodeId, top_level: bool) -> Result<Encoding> {
        let node = &self.nodes[id.index()];
        let (lower, upper) = (node.lower, node.upper);
        if top_level {
            let row = self.sum_row(id, lower, upper)?;
            self.post(row);
            return Ok(Encoding::Affine);
        }

        let s = self.fresh_var_like(id, "s")?;
        let mut row = self.sum_row(id, 0.0, 0.0)?;
        row.add_var(s, -1.0);
        self.post(row);
        Ok(Encoding::Var(s))
    }

    fn sum_row(&self, id: NodeId, lhs: f64, rhs: f64) -> Result<LinearConstraint> {
        let mut row = LinearConstraint::new(lhs, rhs);
        if let NodeKind::Sum {
            vars,
            weights,
            offset,
        } = &self.nodes[id.index()].kind
        {
            row.add_constant(*offset);
            for (&child, &w) in vars.iter().zip(weights.iter()) {
                row.add_coef(&self.nodes, child, w as f64)?;
            }
        }
        Ok(row)
    }

    /// New variable with the bounds and integrality of node `like`.
    fn fresh_var_like(&mut self, like: NodeId, prefix: &str) -> Result<VarId> {
        let node = self.node(like)?;
        let kind = if node.continuous {
            VarKind::Continuous
        } else {
            VarKind::Integer
        };
        let (lower, upper) = (node.lower, node.upper);
        Ok(self
            .model
            .new_var(format!("{prefix}{}", like.index()), kind, lower, upper))
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::{EnumerationBackend, SearchConfig};
    use crate::flat::{ObjectiveSense, VarKind};
    use crate::lower::ModelBuilder;
    use std::collections::BTreeSet;

    #[test]
    fn test_bounded_int_var() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var(2, 9).unwrap();
        mb.add(x).unwrap();

        let var = mb.model().var(mb.var_of(x).unwrap()).unwrap();
        assert_eq!(var.kind, VarKind::Integer);
        assert_eq!((var.lower, var.upper), (2.0, 9.0));
        assert_eq!(mb.model().row_count(), 0);
    }

    #[test]
    fn test_contiguous_values_stay_bounded() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var_values([3, 1, 2]).unwrap();
        mb.add(x).unwrap();
        assert_eq!(mb.model().var_count(), 1);
        assert_eq!(mb.model().row_count(), 0);
    }

    #[test]
    fn test_extreme_enumerated_domain() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var_values([0, i64::MAX]).unwrap();
        mb.add(x).unwrap();
        assert_eq!(mb.model().var_count(), 3);
        assert_eq!(mb.model().row_count(), 2);

        let y = mb.int_var_values([i64::MIN, i64::MAX]).unwrap();
        mb.add(y).unwrap();
        assert_eq!(mb.model().var_count(), 6);
    }

    #[test]
    fn test_enumerated_int_var() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var_values([1, 3, 7]).unwrap();
        mb.add(x).unwrap();

        let model = mb.model();
        let xv = mb.var_of(x).unwrap();
        assert_eq!(model.var(xv).unwrap().values.as_deref(), Some(&[1, 3, 7][..]));
        assert_eq!(model.var_count(), 4);
        assert_eq!(model.row_count(), 2);

        let one_hot = &model.rows()[0];
        assert_eq!((one_hot.lhs(), one_hot.rhs()), (1.0, 1.0));
        assert_eq!(one_hot.terms().len(), 3);

        let link = &model.rows()[1];
        assert!(link.is_equality());
        assert_eq!(link.coef_of(xv), 1.0);
        let weights: Vec<f64> = link.terms()[1..].iter().map(|(_, c)| -c).collect();
        assert_eq!(weights, vec![1.0, 3.0, 7.0]);
    }

    #[test]
    fn test_enumerated_domain_has_no_holes_filled() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var_values([1, 3, 7]).unwrap();
        mb.add(x).unwrap();

        // ignore the stored value list so only the rows restrict x
        let mut model = mb.model().clone();
        let xv = mb.var_of(x).unwrap();
        model.var_mut(xv).values = None;

        let taken: BTreeSet<i64> = EnumerationBackend::new()
            .all_solutions(&model, &SearchConfig::default())
            .iter()
            .map(|values| values[xv.index()] as i64)
            .collect();
        assert_eq!(taken, BTreeSet::from([1, 3, 7]));
    }

    #[test]
    fn test_view_gets_no_variable() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var(0, 10).unwrap();
        let inner = mb.linear_view(x, 2.0, 1.0).unwrap();
        let y = mb.linear_view(inner, 3.0, -4.0).unwrap();
        let eq = mb.eq(y, 0).unwrap();
        mb.add(eq).unwrap();

        assert_eq!(mb.model().var_count(), 1);
        assert_eq!(mb.var_of(y), None);
        let row = &mb.model().rows()[0];
        assert_eq!(row.terms(), &[(mb.var_of(x).unwrap(), 6.0)]);
        // 6x - 1 == 0
        assert_eq!(row.rhs(), 1.0);
    }

    #[test]
    fn test_nested_sum_variable() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var(0, 4).unwrap();
        let y = mb.int_var(0, 4).unwrap();
        let s = mb.sum([x, y], [2, -1], 3.0).unwrap();
        let le = mb.le(s, 5).unwrap();
        mb.add(le).unwrap();

        let model = mb.model();
        let sv = mb.var_of(s).unwrap();
        let var = model.var(sv).unwrap();
        assert_eq!(var.kind, VarKind::Integer);
        assert_eq!((var.lower, var.upper), (-1.0, 11.0));

        // 2x - y - s == -3, then s <= 5
        let def = &model.rows()[0];
        assert_eq!(def.coef_of(sv), -1.0);
        assert_eq!(def.rhs(), -3.0);
        let le_row = &model.rows()[1];
        assert_eq!(le_row.terms(), &[(sv, 1.0)]);
        assert_eq!(le_row.rhs(), 5.0);
    }

    #[test]
    fn test_objective_binding() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var(0, 4).unwrap();
        let y = mb.float_var(0.0, 2.5).unwrap();
        let s = mb.sum([x, y], [1, 2], 0.0).unwrap();
        let obj = mb.minimise(s).unwrap();
        mb.add(obj).unwrap();

        let model = mb.model();
        let objective = model.objective().unwrap();
        assert_eq!(objective.sense, ObjectiveSense::Minimise);
        assert_eq!(mb.var_of(obj), Some(objective.var));
        assert_eq!(model.var(objective.var).unwrap().kind, VarKind::Continuous);

        let binding: Vec<_> = model
            .rows()
            .iter()
            .filter(|r| r.coef_of(objective.var) != 0.0)
            .collect();
        assert_eq!(binding.len(), 1);
        assert!(binding[0].is_equality());
        assert_eq!(binding[0].coef_of(mb.var_of(s).unwrap()), -1.0);

        let again = mb.maximise(x).unwrap();
        assert_eq!(
            mb.add(again),
            Err(crate::error::ModelError::DuplicateObjective)
        );
    }
}
