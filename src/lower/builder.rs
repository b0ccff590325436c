//! Model builder: node arena, depth-first add traversal, hand-off.

use super::config::LoweringConfig;
use crate::backend::{MipBackend, MipSolution, SearchConfig};
use crate::error::{ModelError, Result};
use crate::expr::{
    Binop, Encoding, ExprArray, FlowKind, IntArray, Node, NodeId, NodeKind, Operand, Rel,
    ViewKind,
};
use crate::flat::{FlatModel, FlatObjective, ObjectiveSense, VarId};
use crate::linear::LinearConstraint;
use std::collections::HashMap;
use tracing::{debug, info};

/// Handle of an array registered with [`ModelBuilder::add_int_array`] or
/// [`ModelBuilder::add_var_array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayId(u32);

impl ArrayId {
    /// Position of the array in its registry.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena and flat-model sizes to restore when an `add` fails.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    nodes: usize,
    encoded: usize,
    vars: usize,
    rows: usize,
    objective: Option<FlatObjective>,
}

/// Owns every node of a model and lowers them into a [`FlatModel`].
///
/// Nodes are created through the builder and referred to by [`NodeId`].
/// [`add`](Self::add) walks a node's tree depth-first, encoding each node
/// the first time it is reached; later visits are no-ops. After
/// [`initialise`](Self::initialise) the model is frozen and handed to a
/// [`MipBackend`].
///
/// # Examples
///
/// ```
/// use u_mipmodel::lower::ModelBuilder;
///
/// let mut mb = ModelBuilder::new();
/// let x = mb.int_var(0, 10).unwrap();
/// let y = mb.int_var(0, 10).unwrap();
/// let le = mb.le(x, y).unwrap();
/// mb.add(le).unwrap();
/// mb.add(le).unwrap(); // already added: no-op
/// mb.initialise().unwrap();
///
/// assert_eq!(mb.model().var_count(), 2);
/// assert_eq!(mb.model().row_count(), 1);
/// assert!(mb.add(x).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    pub(super) config: LoweringConfig,
    pub(super) nodes: Vec<Node>,
    pub(super) model: FlatModel,
    /// Cached `ne(x, 0)` readings of non-boolean logic operands.
    pub(super) bool_readings: HashMap<NodeId, NodeId>,
    /// Nodes encoded by the `add` in progress.
    pub(super) encoded: Vec<NodeId>,
    int_arrays: Vec<IntArray>,
    var_arrays: Vec<ExprArray>,
    initialised: bool,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    /// Creates an empty builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: LoweringConfig::default(),
            nodes: Vec::new(),
            model: FlatModel::new(),
            bool_readings: HashMap::new(),
            encoded: Vec::new(),
            int_arrays: Vec::new(),
            var_arrays: Vec::new(),
            initialised: false,
        }
    }

    /// Creates an empty builder with a validated configuration.
    pub fn with_config(config: LoweringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Lowering parameters in effect.
    pub fn config(&self) -> &LoweringConfig {
        &self.config
    }

    /// Node behind `id`.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.index()).ok_or(ModelError::UnknownNode(id))
    }

    /// Number of nodes in the arena, including internal ones.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The flat model built so far.
    pub fn model(&self) -> &FlatModel {
        &self.model
    }

    /// Whether [`initialise`](Self::initialise) has frozen the model.
    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Flat variable backing `id`, if it has been encoded as one.
    pub fn var_of(&self, id: NodeId) -> Option<VarId> {
        self.nodes.get(id.index()).and_then(Node::var)
    }

    // ---- registration ----

    /// Moves a node into the arena and returns its handle.
    ///
    /// Rejects malformed nodes: unknown children, mismatched list lengths,
    /// empty or inverted domains.
    pub fn add_expr(&mut self, kind: NodeKind) -> Result<NodeId> {
        if self.initialised {
            return Err(ModelError::Frozen);
        }
        let mut kind = kind;
        let (lower, upper, continuous) = self.derive(&mut kind)?;
        Ok(self.push_node(Node::new(kind, lower, upper, continuous)))
    }

    pub(super) fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Registers an integer array for the lifetime of the model.
    pub fn add_int_array(&mut self, arr: IntArray) -> Result<ArrayId> {
        if self.initialised {
            return Err(ModelError::Frozen);
        }
        self.int_arrays.push(arr);
        Ok(ArrayId(self.int_arrays.len() as u32 - 1))
    }

    /// Registers an expression array for the lifetime of the model.
    pub fn add_var_array(&mut self, arr: ExprArray) -> Result<ArrayId> {
        if self.initialised {
            return Err(ModelError::Frozen);
        }
        for &id in &arr {
            self.node(id)?;
        }
        self.var_arrays.push(arr);
        Ok(ArrayId(self.var_arrays.len() as u32 - 1))
    }

    /// Integer array registered under `id`.
    pub fn int_array(&self, id: ArrayId) -> Option<&IntArray> {
        self.int_arrays.get(id.index())
    }

    /// Node array registered under `id`.
    pub fn var_array(&self, id: ArrayId) -> Option<&ExprArray> {
        self.var_arrays.get(id.index())
    }

    // ---- traversal ----

    /// Adds a root constraint, objective or variable.
    ///
    /// Children are added before their parent. A node that has already
    /// been added is not encoded again; if it was first used as a
    /// sub-expression, asserting it now fixes its indicator to 1.
    ///
    /// On error the builder and flat model are left as they were before the
    /// call.
    pub fn add(&mut self, id: NodeId) -> Result<NodeId> {
        if self.initialised {
            return Err(ModelError::Frozen);
        }
        self.node(id)?;
        let mark = self.checkpoint();
        if let Err(err) = self.visit(id, true) {
            debug!(node = %id, %err, "add failed, rolling back");
            self.rollback(mark);
            return Err(err);
        }
        self.encoded.clear();
        Ok(id)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            nodes: self.nodes.len(),
            encoded: self.encoded.len(),
            vars: self.model.var_count(),
            rows: self.model.row_count(),
            objective: self.model.objective(),
        }
    }

    fn rollback(&mut self, mark: Checkpoint) {
        for id in self.encoded.drain(mark.encoded..) {
            if let Some(node) = self.nodes.get_mut(id.index()) {
                node.encoding = None;
            }
        }
        self.nodes.truncate(mark.nodes);
        self.bool_readings
            .retain(|_, reading| reading.index() < mark.nodes);
        self.model.truncate(mark.vars, mark.rows, mark.objective);
    }

    pub(super) fn visit(&mut self, id: NodeId, top_level: bool) -> Result<()> {
        let node = &self.nodes[id.index()];
        match node.encoding {
            Some(Encoding::Var(var)) => {
                if top_level && matches!(node.kind, NodeKind::Binop(_)) {
                    let var = self.model.var_mut(var);
                    var.lower = var.lower.max(1.0);
                }
                return Ok(());
            }
            Some(_) => return Ok(()),
            None => {}
        }
        for child in node.kind.children() {
            self.visit(child, false)?;
        }
        self.encode(id, top_level)
    }

    /// Freezes the model. No further `add` is accepted afterwards.
    pub fn initialise(&mut self) -> Result<()> {
        if self.initialised {
            return Err(ModelError::Frozen);
        }
        self.initialised = true;
        info!(
            nodes = self.nodes.len(),
            vars = self.model.var_count(),
            rows = self.model.row_count(),
            "model initialised"
        );
        Ok(())
    }

    /// Freezes the model and marks the variables behind `decisions` as the
    /// ones the search branches on first.
    ///
    /// Views resolve to their underlying variable; nodes without a variable
    /// of their own (affine sums, posted constraints) are skipped.
    pub fn initialise_with(&mut self, decisions: &ExprArray) -> Result<()> {
        let mut vars = Vec::new();
        for &id in decisions {
            let mut current = id;
            loop {
                let node = self.node(current)?;
                match (&node.kind, node.encoding) {
                    (_, None) => return Err(ModelError::NotEncoded(current)),
                    (NodeKind::View { base, .. }, _) => current = *base,
                    (_, Some(Encoding::Var(var))) => {
                        if !vars.contains(&var) {
                            vars.push(var);
                        }
                        break;
                    }
                    _ => break,
                }
            }
        }
        self.initialise()?;
        self.model.set_decision_vars(vars);
        Ok(())
    }

    /// Hands the frozen model to `backend`.
    pub fn solve<B: MipBackend>(
        &self,
        backend: &B,
        config: &SearchConfig,
    ) -> Result<MipSolution> {
        if !self.initialised {
            return Err(ModelError::NotInitialised);
        }
        config.validate()?;
        Ok(backend.solve(&self.model, config))
    }

    /// Value of any encoded node under `solution`, views included.
    ///
    /// Fails with [`ModelError::NoAssignment`] unless `solution` is a
    /// satisfying assignment of this model.
    pub fn value(&self, solution: &MipSolution, id: NodeId) -> Result<f64> {
        if !solution.is_sat() || solution.values.len() != self.model.var_count() {
            return Err(ModelError::NoAssignment);
        }
        let mut row = LinearConstraint::new(0.0, 0.0);
        row.add_coef(&self.nodes, id, 1.0)?;
        Ok(row.activity(&solution.values) - row.rhs())
    }

    // ---- constructors ----

    /// Integer variable over `[lower, upper]`.
    pub fn int_var(&mut self, lower: i64, upper: i64) -> Result<NodeId> {
        self.add_expr(NodeKind::IntVar {
            lower,
            upper,
            values: None,
        })
    }

    /// Integer variable restricted to exactly `values`.
    pub fn int_var_values(&mut self, values: impl Into<IntArray>) -> Result<NodeId> {
        let values: IntArray = values.into();
        self.add_expr(NodeKind::IntVar {
            lower: 0,
            upper: 0,
            values: Some(values.as_slice().to_vec()),
        })
    }

    /// Integer variable over `{0, 1}`.
    pub fn bool_var(&mut self) -> Result<NodeId> {
        self.int_var(0, 1)
    }

    /// Continuous variable over `[lower, upper]`.
    pub fn float_var(&mut self, lower: f64, upper: f64) -> Result<NodeId> {
        self.add_expr(NodeKind::FloatVar { lower, upper })
    }

    /// `x + offset`.
    pub fn sum_view(&mut self, x: NodeId, offset: f64) -> Result<NodeId> {
        self.view(ViewKind::Sum, x, 1.0, offset)
    }

    /// `scale * x`.
    pub fn product_view(&mut self, x: NodeId, scale: f64) -> Result<NodeId> {
        self.view(ViewKind::Product, x, scale, 0.0)
    }

    /// `scale * x + offset`.
    pub fn linear_view(&mut self, x: NodeId, scale: f64, offset: f64) -> Result<NodeId> {
        self.view(ViewKind::Linear, x, scale, offset)
    }

    fn view(&mut self, kind: ViewKind, base: NodeId, scale: f64, offset: f64) -> Result<NodeId> {
        self.add_expr(NodeKind::View {
            kind,
            base,
            scale,
            offset,
        })
    }

    /// `offset + sum(weights[i] * vars[i])`.
    pub fn sum(
        &mut self,
        vars: impl Into<ExprArray>,
        weights: impl Into<IntArray>,
        offset: f64,
    ) -> Result<NodeId> {
        self.add_expr(NodeKind::Sum {
            vars: vars.into(),
            weights: weights.into(),
            offset,
        })
    }

    /// `a + b` for a node or constant `b`.
    pub fn plus(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        match b.into() {
            Operand::Node(b) => self.sum([a, b], [1, 1], 0.0),
            Operand::Const(k) => self.sum([a], [1], k),
        }
    }

    /// `a - b` for a node or constant `b`.
    pub fn minus(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        match b.into() {
            Operand::Node(b) => self.sum([a, b], [1, -1], 0.0),
            Operand::Const(k) => self.sum([a], [1], -k),
        }
    }

    /// Pins a sum to `k`: at top level it posts `sum == k`.
    pub fn set_rhs(&mut self, sum: NodeId, k: f64) -> Result<()> {
        if self.initialised {
            return Err(ModelError::Frozen);
        }
        let node = self
            .nodes
            .get_mut(sum.index())
            .ok_or(ModelError::UnknownNode(sum))?;
        if !matches!(node.kind, NodeKind::Sum { .. }) {
            return Err(ModelError::WrongKind {
                node: sum,
                expected: "Sum",
            });
        }
        if node.encoding.is_some() {
            return Err(ModelError::AlreadyEncoded(sum));
        }
        node.lower = k;
        node.upper = k;
        Ok(())
    }

    /// `lhs rel rhs`.
    pub fn rel(&mut self, rel: Rel, lhs: NodeId, rhs: impl Into<Operand>) -> Result<NodeId> {
        self.add_expr(NodeKind::Binop(Binop::Rel {
            rel,
            lhs,
            rhs: rhs.into(),
        }))
    }

    /// `lhs == rhs`.
    pub fn eq(&mut self, lhs: NodeId, rhs: impl Into<Operand>) -> Result<NodeId> {
        self.rel(Rel::Eq, lhs, rhs)
    }

    /// `lhs != rhs`.
    pub fn ne(&mut self, lhs: NodeId, rhs: impl Into<Operand>) -> Result<NodeId> {
        self.rel(Rel::Ne, lhs, rhs)
    }

    /// `lhs <= rhs`.
    pub fn le(&mut self, lhs: NodeId, rhs: impl Into<Operand>) -> Result<NodeId> {
        self.rel(Rel::Le, lhs, rhs)
    }

    /// `lhs >= rhs`.
    pub fn ge(&mut self, lhs: NodeId, rhs: impl Into<Operand>) -> Result<NodeId> {
        self.rel(Rel::Ge, lhs, rhs)
    }

    /// `lhs < rhs`.
    pub fn lt(&mut self, lhs: NodeId, rhs: impl Into<Operand>) -> Result<NodeId> {
        self.rel(Rel::Lt, lhs, rhs)
    }

    /// `lhs > rhs`.
    pub fn gt(&mut self, lhs: NodeId, rhs: impl Into<Operand>) -> Result<NodeId> {
        self.rel(Rel::Gt, lhs, rhs)
    }

    /// Logical negation; a non-boolean operand reads as `a != 0`.
    pub fn not(&mut self, a: NodeId) -> Result<NodeId> {
        self.add_expr(NodeKind::Binop(Binop::Not(a)))
    }

    /// Logical conjunction.
    pub fn and(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.add_expr(NodeKind::Binop(Binop::And(a, b)))
    }

    /// Logical disjunction.
    pub fn or(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.add_expr(NodeKind::Binop(Binop::Or(a, b)))
    }

    /// `first + coefs[0] <= second`.
    pub fn precedence(
        &mut self,
        first: NodeId,
        second: NodeId,
        coefs: impl Into<IntArray>,
    ) -> Result<NodeId> {
        self.add_expr(NodeKind::Binop(Binop::Precedence {
            first,
            second,
            coefs: coefs.into(),
        }))
    }

    /// `first + coefs[0] <= second` or `second + coefs[1] <= first`.
    pub fn no_overlap(
        &mut self,
        first: NodeId,
        second: NodeId,
        coefs: impl Into<IntArray>,
    ) -> Result<NodeId> {
        self.add_expr(NodeKind::Binop(Binop::NoOverlap {
            first,
            second,
            coefs: coefs.into(),
        }))
    }

    /// Every node of `vars` takes a distinct value.
    pub fn all_different(&mut self, vars: impl Into<ExprArray>) -> Result<NodeId> {
        self.add_expr(NodeKind::Flow {
            kind: FlowKind::AllDifferent,
            vars: vars.into(),
            values: IntArray::new(),
            card_lb: IntArray::new(),
            card_ub: IntArray::new(),
        })
    }

    /// `a != b` through the AllDifferent encoding.
    pub fn all_different_pair(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.all_different([a, b])
    }

    /// Global cardinality: value `values[j]` is taken by between `lb[j]`
    /// and `ub[j]` of `vars`.
    pub fn gcc(
        &mut self,
        vars: impl Into<ExprArray>,
        values: impl Into<IntArray>,
        lb: impl Into<IntArray>,
        ub: impl Into<IntArray>,
    ) -> Result<NodeId> {
        self.add_expr(NodeKind::Flow {
            kind: FlowKind::Gcc,
            vars: vars.into(),
            values: values.into(),
            card_lb: lb.into(),
            card_ub: ub.into(),
        })
    }

    /// Objective minimising `expr`. At most one objective per model.
    pub fn minimise(&mut self, expr: NodeId) -> Result<NodeId> {
        self.add_expr(NodeKind::Objective {
            sense: ObjectiveSense::Minimise,
            expr,
        })
    }

    /// Objective maximising `expr`. At most one objective per model.
    pub fn maximise(&mut self, expr: NodeId) -> Result<NodeId> {
        self.add_expr(NodeKind::Objective {
            sense: ObjectiveSense::Maximise,
            expr,
        })
    }

    // ---- validation ----

    /// Validates `kind` against the arena and returns its value bounds and
    /// continuity. Enumerated value lists are sorted and deduplicated.
    fn derive(&self, kind: &mut NodeKind) -> Result<(f64, f64, bool)> {
        match kind {
            NodeKind::FloatVar { lower, upper } => {
                check_bounds(*lower, *upper)?;
                Ok((*lower, *upper, true))
            }
            NodeKind::IntVar {
                lower,
                upper,
                values,
            } => {
                if let Some(values) = values {
                    values.sort_unstable();
                    values.dedup();
                    let (Some(&lo), Some(&hi)) = (values.first(), values.last()) else {
                        return Err(ModelError::EmptyDomain);
                    };
                    *lower = lo;
                    *upper = hi;
                }
                check_bounds(*lower as f64, *upper as f64)?;
                Ok((*lower as f64, *upper as f64, false))
            }
            NodeKind::View {
                base,
                scale,
                offset,
                ..
            } => {
                if !scale.is_finite() || !offset.is_finite() {
                    return Err(ModelError::InvalidBounds {
                        lower: *scale,
                        upper: *offset,
                    });
                }
                let base = self.node(*base)?;
                let (lo, hi) = scaled(*scale, base.lower, base.upper);
                let continuous =
                    base.continuous || scale.fract() != 0.0 || offset.fract() != 0.0;
                Ok((lo + *offset, hi + *offset, continuous))
            }
            NodeKind::Sum {
                vars,
                weights,
                offset,
            } => {
                if vars.size() != weights.size() {
                    return Err(ModelError::LengthMismatch {
                        what: "sum weights",
                        expected: vars.size(),
                        actual: weights.size(),
                    });
                }
                let (mut lo, mut hi) = (*offset, *offset);
                let mut continuous = offset.fract() != 0.0;
                for (&id, &w) in vars.iter().zip(weights.iter()) {
                    let child = self.node(id)?;
                    let (a, b) = scaled(w as f64, child.lower, child.upper);
                    lo += a;
                    hi += b;
                    continuous |= child.continuous;
                }
                Ok((lo, hi, continuous))
            }
            NodeKind::Binop(op) => {
                self.check_binop(op)?;
                Ok((0.0, 1.0, false))
            }
            NodeKind::Flow {
                kind,
                vars,
                values,
                card_lb,
                card_ub,
            } => {
                for &id in vars.iter() {
                    self.node(id)?;
                }
                match kind {
                    FlowKind::AllDifferent => {
                        if !values.is_empty() {
                            return Err(ModelError::LengthMismatch {
                                what: "alldifferent values",
                                expected: 0,
                                actual: values.size(),
                            });
                        }
                    }
                    FlowKind::Gcc => {
                        let bounds = [
                            ("gcc lower bounds", &*card_lb),
                            ("gcc upper bounds", &*card_ub),
                        ];
                        for (what, arr) in bounds {
                            if arr.size() != values.size() {
                                return Err(ModelError::LengthMismatch {
                                    what,
                                    expected: values.size(),
                                    actual: arr.size(),
                                });
                            }
                        }
                        for (&lb, &ub) in card_lb.iter().zip(card_ub.iter()) {
                            if lb < 0 || lb > ub {
                                return Err(ModelError::InvalidBounds {
                                    lower: lb as f64,
                                    upper: ub as f64,
                                });
                            }
                        }
                    }
                }
                Ok((0.0, 1.0, false))
            }
            NodeKind::Objective { expr, .. } => {
                let expr = self.node(*expr)?;
                Ok((expr.lower, expr.upper, expr.continuous))
            }
        }
    }

    fn check_binop(&self, op: &Binop) -> Result<()> {
        match op {
            Binop::Rel { lhs, rhs, .. } => {
                self.node(*lhs)?;
                match rhs {
                    Operand::Node(rhs) => {
                        self.node(*rhs)?;
                    }
                    Operand::Const(k) if !k.is_finite() => {
                        return Err(ModelError::InvalidBounds {
                            lower: *k,
                            upper: *k,
                        });
                    }
                    Operand::Const(_) => {}
                }
            }
            Binop::Not(a) => {
                self.node(*a)?;
            }
            Binop::And(a, b) | Binop::Or(a, b) => {
                self.node(*a)?;
                self.node(*b)?;
            }
            Binop::Precedence {
                first,
                second,
                coefs,
            } => {
                self.node(*first)?;
                self.node(*second)?;
                check_len("precedence coefficients", 1, coefs)?;
            }
            Binop::NoOverlap {
                first,
                second,
                coefs,
            } => {
                self.node(*first)?;
                self.node(*second)?;
                check_len("no-overlap coefficients", 2, coefs)?;
            }
        }
        Ok(())
    }
}

fn check_bounds(lower: f64, upper: f64) -> Result<()> {
    if lower.is_nan() || upper.is_nan() || lower > upper {
        return Err(ModelError::InvalidBounds { lower, upper });
    }
    Ok(())
}

fn check_len(what: &'static str, expected: usize, arr: &IntArray) -> Result<()> {
    if arr.size() != expected {
        return Err(ModelError::LengthMismatch {
            what,
            expected,
            actual: arr.size(),
        });
    }
    Ok(())
}

/// Bounds of `k * x` for `x` in `[lower, upper]`; `0 * inf` counts as 0.
fn scaled(k: f64, lower: f64, upper: f64) -> (f64, f64) {
    if k == 0.0 {
        return (0.0, 0.0);
    }
    let (a, b) = (k * lower, k * upper);
    (a.min(b), a.max(b))
}
