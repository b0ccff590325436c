//! Relations, logical connectives and scheduling disjunctions.
//!
//! A relation over two operands is first folded into one row fragment
//! `sum(c_i * v_i) rel r`. At top level it becomes a hard row. Nested, it is
//! reified into a binary indicator `z` with two implications, each a big-M
//! row whose M is derived from the activity bounds of the fragment:
//!
//! ```text
//! guards => sum <= r   :   sum + M * sum(guards) <= r + M * |guards|
//! guards => sum >= r   :   sum - M * sum(guards) >= r - M * |guards|
//! ```

use super::builder::ModelBuilder;
use crate::error::{ModelError, Result};
use crate::expr::{Binop, Encoding, Node, NodeId, NodeKind, Operand, Rel};
use crate::flat::{VarId, VarKind};
use crate::linear::LinearConstraint;

/// A binary variable read as `var` or as `1 - var`.
#[derive(Debug, Clone, Copy)]
struct Lit {
    var: VarId,
    positive: bool,
}

impl Lit {
    fn pos(var: VarId) -> Self {
        Self {
            var,
            positive: true,
        }
    }

    fn neg(var: VarId) -> Self {
        Self {
            var,
            positive: false,
        }
    }

    fn negate(self) -> Self {
        Self {
            var: self.var,
            positive: !self.positive,
        }
    }
}

/// A 0/1 quantity usable in a logic row.
#[derive(Debug, Clone, Copy)]
enum Reading {
    Node(NodeId),
    Var(VarId),
}

impl ModelBuilder {
    pub(super) fn encode_binop(
        &mut self,
        id: NodeId,
        op: &Binop,
        top_level: bool,
    ) -> Result<Encoding> {
        match op {
            Binop::Rel { rel, lhs, rhs } => {
                let expr = self.difference(*lhs, *rhs, 0.0)?;
                self.encode_rel(id, *rel, &expr, top_level)
            }
            Binop::Precedence {
                first,
                second,
                coefs,
            } => {
                let d = coefs.get_item(0).copied().unwrap_or(0) as f64;
                let expr = self.difference(*first, Operand::Node(*second), d)?;
                self.encode_rel(id, Rel::Le, &expr, top_level)
            }
            Binop::NoOverlap {
                first,
                second,
                coefs,
            } => {
                let d0 = coefs.get_item(0).copied().unwrap_or(0) as f64;
                let d1 = coefs.get_item(1).copied().unwrap_or(0) as f64;
                let before = self.difference(*first, Operand::Node(*second), d0)?;
                let after = self.difference(*second, Operand::Node(*first), d1)?;
                if top_level {
                    let order = self.indicator(id, "ord");
                    self.imply_le(id, &before, before.rhs(), &[Lit::pos(order)])?;
                    self.imply_le(id, &after, after.rhs(), &[Lit::neg(order)])?;
                    return Ok(Encoding::Posted);
                }
                let z_before = self.reify_le(id, &before, "before")?;
                let z_after = self.reify_le(id, &after, "after")?;
                let z = self.indicator(id, "");
                self.post_or(z, Reading::Var(z_before), Reading::Var(z_after))?;
                Ok(Encoding::Var(z))
            }
            Binop::Not(a) => {
                let a = self.reading(*a)?;
                if top_level {
                    let mut row = LinearConstraint::new(f64::NEG_INFINITY, 0.0);
                    self.add_reading(&mut row, a, 1.0)?;
                    self.post(row);
                    return Ok(Encoding::Posted);
                }
                let z = self.indicator(id, "");
                let mut row = LinearConstraint::new(1.0, 1.0);
                row.add_var(z, 1.0);
                self.add_reading(&mut row, a, 1.0)?;
                self.post(row);
                Ok(Encoding::Var(z))
            }
            Binop::And(a, b) => {
                let (a, b) = (self.reading(*a)?, self.reading(*b)?);
                if top_level {
                    for r in [a, b] {
                        let mut row = LinearConstraint::new(1.0, f64::INFINITY);
                        self.add_reading(&mut row, r, 1.0)?;
                        self.post(row);
                    }
                    return Ok(Encoding::Posted);
                }
                let z = self.indicator(id, "");
                self.post_and(z, a, b)?;
                Ok(Encoding::Var(z))
            }
            Binop::Or(a, b) => {
                let (a, b) = (self.reading(*a)?, self.reading(*b)?);
                if top_level {
                    let mut row = LinearConstraint::new(1.0, f64::INFINITY);
                    self.add_reading(&mut row, a, 1.0)?;
                    self.add_reading(&mut row, b, 1.0)?;
                    self.post(row);
                    return Ok(Encoding::Posted);
                }
                let z = self.indicator(id, "");
                self.post_or(z, a, b)?;
                Ok(Encoding::Var(z))
            }
        }
    }

    /// Fragment for `a - rhs + shift`, with its constant folded into the
    /// bounds: the relation `a - rhs + shift rel 0` reads `terms rel row.rhs()`.
    fn difference(&self, a: NodeId, rhs: Operand, shift: f64) -> Result<LinearConstraint> {
        let mut row = LinearConstraint::new(0.0, 0.0);
        row.add_coef(&self.nodes, a, 1.0)?;
        match rhs {
            Operand::Node(b) => row.add_coef(&self.nodes, b, -1.0)?,
            Operand::Const(k) => row.add_constant(-k),
        }
        row.add_constant(shift);
        Ok(row)
    }

    fn encode_rel(
        &mut self,
        id: NodeId,
        rel: Rel,
        expr: &LinearConstraint,
        top_level: bool,
    ) -> Result<Encoding> {
        let r = expr.rhs();
        let sep = self.separation(expr);

        if top_level {
            let bounds = match rel {
                Rel::Eq => (r, r),
                Rel::Le => (f64::NEG_INFINITY, r),
                Rel::Ge => (r, f64::INFINITY),
                Rel::Lt => (f64::NEG_INFINITY, r - sep),
                Rel::Gt => (r + sep, f64::INFINITY),
                Rel::Ne => {
                    let y = self.indicator(id, "side");
                    self.imply_le(id, expr, r - sep, &[Lit::pos(y)])?;
                    self.imply_ge(id, expr, r + sep, &[Lit::neg(y)])?;
                    return Ok(Encoding::Posted);
                }
            };
            let mut row = expr.clone();
            row.set_bounds(bounds.0, bounds.1);
            self.post(row);
            return Ok(Encoding::Posted);
        }

        let z = self.indicator(id, "");
        let on = Lit::pos(z);
        match rel {
            Rel::Le => self.reify_bound(id, expr, r, r + sep, on, true)?,
            Rel::Lt => self.reify_bound(id, expr, r - sep, r, on, true)?,
            Rel::Ge => self.reify_bound(id, expr, r, r - sep, on, false)?,
            Rel::Gt => self.reify_bound(id, expr, r + sep, r, on, false)?,
            Rel::Eq => self.reify_eq(id, expr, r, sep, on)?,
            Rel::Ne => self.reify_eq(id, expr, r, sep, on.negate())?,
        }
        Ok(Encoding::Var(z))
    }

    /// `on => sum <= holds` and `!on => sum >= fails` (or the mirror image
    /// when `upper` is false).
    fn reify_bound(
        &mut self,
        id: NodeId,
        expr: &LinearConstraint,
        holds: f64,
        fails: f64,
        on: Lit,
        upper: bool,
    ) -> Result<()> {
        if upper {
            self.imply_le(id, expr, holds, &[on])?;
            self.imply_ge(id, expr, fails, &[on.negate()])
        } else {
            self.imply_ge(id, expr, holds, &[on])?;
            self.imply_le(id, expr, fails, &[on.negate()])
        }
    }

    /// `on <=> sum == r`. The false side is a disjunction split by an extra
    /// binary `y`: `sum <= r - sep` or `sum >= r + sep`.
    fn reify_eq(
        &mut self,
        id: NodeId,
        expr: &LinearConstraint,
        r: f64,
        sep: f64,
        on: Lit,
    ) -> Result<()> {
        self.imply_le(id, expr, r, &[on])?;
        self.imply_ge(id, expr, r, &[on])?;
        let y = self.indicator(id, "side");
        self.imply_le(id, expr, r - sep, &[on.negate(), Lit::pos(y)])?;
        self.imply_ge(id, expr, r + sep, &[on.negate(), Lit::neg(y)])
    }

    fn reify_le(&mut self, id: NodeId, expr: &LinearConstraint, tag: &str) -> Result<VarId> {
        let z = self.indicator(id, tag);
        let r = expr.rhs();
        let sep = self.separation(expr);
        self.reify_bound(id, expr, r, r + sep, Lit::pos(z), true)?;
        Ok(z)
    }

    fn imply_le(
        &mut self,
        id: NodeId,
        expr: &LinearConstraint,
        bound: f64,
        guards: &[Lit],
    ) -> Result<()> {
        let (_, hi) = expr.activity_bounds(self.model.vars());
        let big_m = (hi - bound).max(0.0);
        if !big_m.is_finite() {
            return Err(ModelError::UnboundedBigM(id));
        }
        let mut row = expr.clone();
        let mut rhs = bound + big_m * guards.len() as f64;
        for lit in guards {
            if lit.positive {
                row.add_var(lit.var, big_m);
            } else {
                row.add_var(lit.var, -big_m);
                rhs -= big_m;
            }
        }
        row.set_bounds(f64::NEG_INFINITY, rhs);
        self.post(row);
        Ok(())
    }

    fn imply_ge(
        &mut self,
        id: NodeId,
        expr: &LinearConstraint,
        bound: f64,
        guards: &[Lit],
    ) -> Result<()> {
        let (lo, _) = expr.activity_bounds(self.model.vars());
        let big_m = (bound - lo).max(0.0);
        if !big_m.is_finite() {
            return Err(ModelError::UnboundedBigM(id));
        }
        let mut row = expr.clone();
        let mut lhs = bound - big_m * guards.len() as f64;
        for lit in guards {
            if lit.positive {
                row.add_var(lit.var, -big_m);
            } else {
                row.add_var(lit.var, big_m);
                lhs += big_m;
            }
        }
        row.set_bounds(lhs, f64::INFINITY);
        self.post(row);
        Ok(())
    }

    /// Smallest gap separating `sum < r` from `sum >= r`.
    fn separation(&self, expr: &LinearConstraint) -> f64 {
        if self.config.integral_separation
            && expr.rhs().fract() == 0.0
            && expr.is_integral(self.model.vars())
        {
            1.0
        } else {
            self.config.epsilon
        }
    }

    fn indicator(&mut self, id: NodeId, tag: &str) -> VarId {
        let name = if tag.is_empty() {
            format!("b{}", id.index())
        } else {
            format!("b{}.{tag}", id.index())
        };
        self.model.new_var(name, VarKind::Binary, 0.0, 1.0)
    }

    /// 0/1 reading of `id`; non-boolean nodes go through a cached `id != 0`.
    fn reading(&mut self, id: NodeId) -> Result<Reading> {
        if self.node(id)?.is_boolean() {
            return Ok(Reading::Node(id));
        }
        if let Some(&ne) = self.bool_readings.get(&id) {
            return Ok(Reading::Node(ne));
        }
        let ne = self.push_node(Node::new(
            NodeKind::Binop(Binop::Rel {
                rel: Rel::Ne,
                lhs: id,
                rhs: Operand::Const(0.0),
            }),
            0.0,
            1.0,
            false,
        ));
        self.visit(ne, false)?;
        self.bool_readings.insert(id, ne);
        Ok(Reading::Node(ne))
    }

    fn add_reading(&self, row: &mut LinearConstraint, r: Reading, coef: f64) -> Result<()> {
        match r {
            Reading::Node(id) => row.add_coef(&self.nodes, id, coef),
            Reading::Var(var) => {
                row.add_var(var, coef);
                Ok(())
            }
        }
    }

    /// `z <= a`, `z <= b`, `z >= a + b - 1`.
    fn post_and(&mut self, z: VarId, a: Reading, b: Reading) -> Result<()> {
        for r in [a, b] {
            let mut row = LinearConstraint::new(f64::NEG_INFINITY, 0.0);
            row.add_var(z, 1.0);
            self.add_reading(&mut row, r, -1.0)?;
            self.post(row);
        }
        let mut row = LinearConstraint::new(-1.0, f64::INFINITY);
        row.add_var(z, 1.0);
        self.add_reading(&mut row, a, -1.0)?;
        self.add_reading(&mut row, b, -1.0)?;
        self.post(row);
        Ok(())
    }

    /// `z >= a`, `z >= b`, `z <= a + b`.
    fn post_or(&mut self, z: VarId, a: Reading, b: Reading) -> Result<()> {
        for r in [a, b] {
            let mut row = LinearConstraint::new(0.0, f64::INFINITY);
            row.add_var(z, 1.0);
            self.add_reading(&mut row, r, -1.0)?;
            self.post(row);
        }
        let mut row = LinearConstraint::new(f64::NEG_INFINITY, 0.0);
        row.add_var(z, 1.0);
        self.add_reading(&mut row, a, -1.0)?;
        self.add_reading(&mut row, b, -1.0)?;
        self.post(row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::{EnumerationBackend, SearchConfig};
    use crate::error::ModelError;
    use crate::expr::NodeId;
    use crate::flat::FlatModel;
    use crate::lower::{LoweringConfig, ModelBuilder};
    use std::collections::BTreeSet;

    /// Distinct projections of all solutions onto `nodes`.
    fn projections(mb: &ModelBuilder, nodes: &[NodeId]) -> BTreeSet<Vec<i64>> {
        let model: &FlatModel = mb.model();
        EnumerationBackend::new()
            .all_solutions(model, &SearchConfig::default())
            .iter()
            .map(|values| {
                nodes
                    .iter()
                    .map(|&n| {
                        let var = mb.var_of(n).unwrap();
                        values[var.index()].round() as i64
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_top_level_relations() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var(0, 5).unwrap();
        let y = mb.int_var(0, 5).unwrap();
        let lt = mb.lt(x, y).unwrap();
        let ge = mb.ge(x, 1).unwrap();
        mb.add(lt).unwrap();
        mb.add(ge).unwrap();

        let rows = mb.model().rows();
        assert_eq!(rows.len(), 2);
        // x - y <= -1
        assert_eq!(rows[0].rhs(), -1.0);
        assert_eq!(rows[0].lhs(), f64::NEG_INFINITY);
        assert_eq!(rows[1].lhs(), 1.0);
        assert_eq!(rows[1].rhs(), f64::INFINITY);
    }

    #[test]
    fn test_strict_relation_on_continuous_uses_epsilon() {
        let config = LoweringConfig::default().with_epsilon(0.25);
        let mut mb = ModelBuilder::with_config(config).unwrap();
        let x = mb.float_var(0.0, 5.0).unwrap();
        let gt = mb.gt(x, 2).unwrap();
        mb.add(gt).unwrap();
        assert_eq!(mb.model().rows()[0].lhs(), 2.25);
    }

    #[test]
    fn test_ne_top_level() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var(0, 3).unwrap();
        let y = mb.int_var(0, 3).unwrap();
        let ne = mb.ne(x, y).unwrap();
        mb.add(ne).unwrap();

        assert_eq!(mb.model().var_count(), 3);
        assert_eq!(mb.model().row_count(), 2);
        let pairs = projections(&mb, &[x, y]);
        assert_eq!(pairs.len(), 12);
        assert!(pairs.iter().all(|p| p[0] != p[1]));
    }

    #[test]
    fn test_reified_relations_match_truth() {
        for rel in ["eq", "ne", "le", "ge", "lt", "gt"] {
            let mut mb = ModelBuilder::new();
            let x = mb.int_var(0, 3).unwrap();
            let y = mb.int_var(1, 2).unwrap();
            let r = match rel {
                "eq" => mb.eq(x, y),
                "ne" => mb.ne(x, y),
                "le" => mb.le(x, y),
                "ge" => mb.ge(x, y),
                "lt" => mb.lt(x, y),
                _ => mb.gt(x, y),
            }
            .unwrap();
            let b = mb.bool_var().unwrap();
            // b == r keeps r nested
            let tie = mb.eq(b, r).unwrap();
            mb.add(tie).unwrap();

            let triples = projections(&mb, &[x, y, r]);
            assert_eq!(triples.len(), 8, "{rel}");
            for t in triples {
                let holds = match rel {
                    "eq" => t[0] == t[1],
                    "ne" => t[0] != t[1],
                    "le" => t[0] <= t[1],
                    "ge" => t[0] >= t[1],
                    "lt" => t[0] < t[1],
                    _ => t[0] > t[1],
                };
                assert_eq!(t[2] == 1, holds, "{rel} {t:?}");
            }
        }
    }

    #[test]
    fn test_and_truth_table() {
        let mut mb = ModelBuilder::new();
        let a = mb.bool_var().unwrap();
        let b = mb.bool_var().unwrap();
        let and = mb.and(a, b).unwrap();
        let t = mb.bool_var().unwrap();
        let tie = mb.eq(t, and).unwrap();
        mb.add(tie).unwrap();

        let table = projections(&mb, &[a, b, and]);
        let expected: BTreeSet<Vec<i64>> = [
            vec![0, 0, 0],
            vec![0, 1, 0],
            vec![1, 0, 0],
            vec![1, 1, 1],
        ]
        .into_iter()
        .collect();
        assert_eq!(table, expected);
    }

    #[test]
    fn test_and_rows_are_tight() {
        let mut mb = ModelBuilder::new();
        let a = mb.bool_var().unwrap();
        let b = mb.bool_var().unwrap();
        let and = mb.and(a, b).unwrap();
        let t = mb.bool_var().unwrap();
        let tie = mb.eq(t, and).unwrap();
        mb.add(tie).unwrap();

        let (av, bv, zv) = (
            mb.var_of(a).unwrap().index(),
            mb.var_of(b).unwrap().index(),
            mb.var_of(and).unwrap().index(),
        );
        // the three and-rows alone pin z at every 0/1 corner
        let and_rows: Vec<_> = mb
            .model()
            .rows()
            .iter()
            .filter(|r| r.terms().iter().any(|(v, _)| v.index() == zv))
            .filter(|r| r.terms().iter().all(|(v, _)| [av, bv, zv].contains(&v.index())))
            .cloned()
            .collect();
        assert_eq!(and_rows.len(), 3);
        for (ai, bi) in [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)] {
            let expected = ai * bi;
            for z in [0.0, 0.5, 1.0] {
                let mut values = vec![0.0; mb.model().var_count()];
                values[av] = ai;
                values[bv] = bi;
                values[zv] = z;
                let ok = and_rows.iter().all(|r| r.is_satisfied(&values, 1e-9));
                assert_eq!(ok, z == expected, "a={ai} b={bi} z={z}");
            }
        }
    }

    #[test]
    fn test_or_and_not() {
        let mut mb = ModelBuilder::new();
        let a = mb.bool_var().unwrap();
        let b = mb.bool_var().unwrap();
        let or = mb.or(a, b).unwrap();
        let not = mb.not(or).unwrap();
        let t = mb.bool_var().unwrap();
        let tie = mb.eq(t, not).unwrap();
        mb.add(tie).unwrap();

        for row in projections(&mb, &[a, b, or, not]) {
            assert_eq!(row[2], (row[0] | row[1]));
            assert_eq!(row[3], 1 - row[2]);
        }
    }

    #[test]
    fn test_top_level_logic() {
        let mut mb = ModelBuilder::new();
        let a = mb.bool_var().unwrap();
        let b = mb.bool_var().unwrap();
        let or = mb.or(a, b).unwrap();
        mb.add(or).unwrap();
        let pairs = projections(&mb, &[a, b]);
        assert_eq!(pairs.len(), 3);
        assert!(!pairs.contains(&vec![0, 0]));

        let mut mb = ModelBuilder::new();
        let a = mb.bool_var().unwrap();
        let na = mb.not(a).unwrap();
        mb.add(na).unwrap();
        assert_eq!(projections(&mb, &[a]), BTreeSet::from([vec![0]]));
    }

    #[test]
    fn test_logic_coerces_integers() {
        let mut mb = ModelBuilder::new();
        let x = mb.int_var(0, 3).unwrap();
        let y = mb.int_var(0, 2).unwrap();
        let and = mb.and(x, y).unwrap();
        let or = mb.or(x, y).unwrap();
        mb.add(and).unwrap();
        mb.add(or).unwrap();

        // one cached `x != 0` and one `y != 0`
        assert_eq!(mb.node_count(), 6);
        let pairs = projections(&mb, &[x, y]);
        assert_eq!(pairs.len(), 6);
        assert!(pairs.iter().all(|p| p[0] != 0 && p[1] != 0));
    }

    #[test]
    fn test_precedence() {
        let mut mb = ModelBuilder::new();
        let a = mb.int_var(0, 5).unwrap();
        let b = mb.int_var(0, 5).unwrap();
        let p = mb.precedence(a, b, [2]).unwrap();
        mb.add(p).unwrap();

        assert_eq!(mb.model().var_count(), 2);
        let row = &mb.model().rows()[0];
        assert_eq!(row.rhs(), -2.0);
        assert!(projections(&mb, &[a, b]).iter().all(|p| p[0] + 2 <= p[1]));
    }

    #[test]
    fn test_no_overlap() {
        let mut mb = ModelBuilder::new();
        let a = mb.int_var(0, 5).unwrap();
        let b = mb.int_var(0, 5).unwrap();
        let n = mb.no_overlap(a, b, [1, 1]).unwrap();
        mb.add(n).unwrap();

        // one ordering binary, two big-M rows
        assert_eq!(mb.model().var_count(), 3);
        assert_eq!(mb.model().row_count(), 2);

        let pairs = projections(&mb, &[a, b]);
        assert_eq!(pairs.len(), 30);
        assert!(!pairs.contains(&vec![2, 2]));
        assert!(pairs.iter().all(|p| p[0] + 1 <= p[1] || p[1] + 1 <= p[0]));
    }

    #[test]
    fn test_nested_no_overlap() {
        let mut mb = ModelBuilder::new();
        let a = mb.int_var(0, 3).unwrap();
        let b = mb.int_var(0, 3).unwrap();
        let n = mb.no_overlap(a, b, [2, 1]).unwrap();
        let t = mb.bool_var().unwrap();
        let tie = mb.eq(t, n).unwrap();
        mb.add(tie).unwrap();

        let triples = projections(&mb, &[a, b, n]);
        assert_eq!(triples.len(), 16);
        for t in triples {
            let disjoint = t[0] + 2 <= t[1] || t[1] + 1 <= t[0];
            assert_eq!(t[2] == 1, disjoint, "{t:?}");
        }
    }

    #[test]
    fn test_unbounded_big_m() {
        let mut mb = ModelBuilder::new();
        let x = mb.float_var(0.0, f64::INFINITY).unwrap();
        let ne = mb.ne(x, 3).unwrap();
        assert_eq!(mb.add(ne), Err(ModelError::UnboundedBigM(ne)));
    }
}
