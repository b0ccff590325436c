//! Expression node types.

use super::containers::{ExprArray, IntArray};
use crate::flat::{ObjectiveSense, VarId};
use std::fmt;

/// Stable handle of a node inside a [`crate::lower::ModelBuilder`].
///
/// Handles are the node identity: two handles are the same node exactly
/// when they compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the node in its builder's arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which affine shape a view was built as. Folding treats all three alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// `x + offset`
    Sum,
    /// `scale * x`
    Product,
    /// `scale * x + offset`
    Linear,
}

/// Binary relation between two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rel {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `>`
    Gt,
}

impl Rel {
    /// Operator as written in model dumps.
    pub fn symbol(self) -> &'static str {
        match self {
            Rel::Eq => "==",
            Rel::Ne => "!=",
            Rel::Le => "<=",
            Rel::Ge => ">=",
            Rel::Lt => "<",
            Rel::Gt => ">",
        }
    }
}

/// Right-hand operand of a relation: another node or a constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Node(NodeId),
    Const(f64),
}

impl From<NodeId> for Operand {
    fn from(id: NodeId) -> Self {
        Operand::Node(id)
    }
}

impl From<f64> for Operand {
    fn from(k: f64) -> Self {
        Operand::Const(k)
    }
}

impl From<i64> for Operand {
    fn from(k: i64) -> Self {
        Operand::Const(k as f64)
    }
}

impl From<i32> for Operand {
    fn from(k: i32) -> Self {
        Operand::Const(f64::from(k))
    }
}

/// Operators over exactly two operands (or one operand and a constant).
#[derive(Debug, Clone, PartialEq)]
pub enum Binop {
    /// `lhs rel rhs`.
    Rel { rel: Rel, lhs: NodeId, rhs: Operand },
    /// Logical negation of a 0/1 reading.
    Not(NodeId),
    And(NodeId, NodeId),
    Or(NodeId, NodeId),
    /// `first + coefs[0] <= second`.
    Precedence {
        first: NodeId,
        second: NodeId,
        coefs: IntArray,
    },
    /// `first + coefs[0] <= second` or `second + coefs[1] <= first`.
    NoOverlap {
        first: NodeId,
        second: NodeId,
        coefs: IntArray,
    },
}

impl Binop {
    fn operands(&self) -> Vec<NodeId> {
        match self {
            Binop::Rel { lhs, rhs, .. } => match rhs {
                Operand::Node(rhs) => vec![*lhs, *rhs],
                Operand::Const(_) => vec![*lhs],
            },
            Binop::Not(arg) => vec![*arg],
            Binop::And(a, b) | Binop::Or(a, b) => vec![*a, *b],
            Binop::Precedence { first, second, .. } | Binop::NoOverlap { first, second, .. } => {
                vec![*first, *second]
            }
        }
    }
}

/// Flow-based global constraint flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Every value taken at most once.
    AllDifferent,
    /// Per-value occurrence bounds supplied by the caller.
    Gcc,
}

/// The closed set of node shapes a model can contain.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Continuous decision variable.
    FloatVar { lower: f64, upper: f64 },
    /// Integer decision variable, optionally restricted to explicit values.
    IntVar {
        lower: i64,
        upper: i64,
        values: Option<Vec<i64>>,
    },
    /// `scale * base + offset`, never given its own variable.
    View {
        kind: ViewKind,
        base: NodeId,
        scale: f64,
        offset: f64,
    },
    /// `offset + sum(weights[i] * vars[i])`.
    Sum {
        vars: ExprArray,
        weights: IntArray,
        offset: f64,
    },
    Binop(Binop),
    /// AllDifferent (empty `values`) or global cardinality over `vars`.
    Flow {
        kind: FlowKind,
        vars: ExprArray,
        values: IntArray,
        card_lb: IntArray,
        card_ub: IntArray,
    },
    /// Optimization directive over `expr`.
    Objective { sense: ObjectiveSense, expr: NodeId },
}

impl NodeKind {
    /// Direct sub-expressions, in the order they are added.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::FloatVar { .. } | NodeKind::IntVar { .. } => Vec::new(),
            NodeKind::View { base, .. } => vec![*base],
            NodeKind::Sum { vars, .. } | NodeKind::Flow { vars, .. } => vars.as_slice().to_vec(),
            NodeKind::Binop(op) => op.operands(),
            NodeKind::Objective { expr, .. } => vec![*expr],
        }
    }

    /// Short lowercase name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::FloatVar { .. } => "FloatVar",
            NodeKind::IntVar { .. } => "IntVar",
            NodeKind::View { kind, .. } => match kind {
                ViewKind::Sum => "SumView",
                ViewKind::Product => "ProductView",
                ViewKind::Linear => "LinearView",
            },
            NodeKind::Sum { .. } => "Sum",
            NodeKind::Binop(op) => match op {
                Binop::Rel { rel, .. } => match rel {
                    Rel::Eq => "eq",
                    Rel::Ne => "ne",
                    Rel::Le => "le",
                    Rel::Ge => "ge",
                    Rel::Lt => "lt",
                    Rel::Gt => "gt",
                },
                Binop::Not(_) => "not",
                Binop::And(..) => "and",
                Binop::Or(..) => "or",
                Binop::Precedence { .. } => "Precedence",
                Binop::NoOverlap { .. } => "NoOverlap",
            },
            NodeKind::Flow { kind, .. } => match kind {
                FlowKind::AllDifferent => "AllDiff",
                FlowKind::Gcc => "Gcc",
            },
            NodeKind::Objective { sense, .. } => match sense {
                ObjectiveSense::Minimise => "Minimise",
                ObjectiveSense::Maximise => "Maximise",
            },
        }
    }
}

/// How a node was lowered. Set once, on the first visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Backed by one flat variable.
    Var(VarId),
    /// Affine in its children; folded into every row that uses it.
    Affine,
    /// Asserted as a top-level constraint; reads as the constant 1.
    Posted,
}

/// One node of the expression arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) lower: f64,
    pub(crate) upper: f64,
    pub(crate) continuous: bool,
    pub(crate) encoding: Option<Encoding>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, lower: f64, upper: f64, continuous: bool) -> Self {
        Self {
            kind,
            lower,
            upper,
            continuous,
            encoding: None,
        }
    }

    /// Shape and operands.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Derived lower bound of the node's value.
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Derived upper bound of the node's value.
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Whether the value may be fractional.
    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// How the node was lowered, `None` until it is reached by an `add`.
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Whether the node has been encoded.
    pub fn has_been_added(&self) -> bool {
        self.encoding.is_some()
    }

    /// Flat variable backing this node, if it has one.
    pub fn var(&self) -> Option<VarId> {
        match self.encoding {
            Some(Encoding::Var(v)) => Some(v),
            _ => None,
        }
    }

    /// Whether the node already reads as 0/1 without coercion.
    pub fn is_boolean(&self) -> bool {
        !self.continuous && self.lower >= 0.0 && self.upper <= 1.0
    }

    /// Whether asserting the node at top level posts a constraint.
    pub fn is_constraint(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Binop(_) | NodeKind::Flow { .. } | NodeKind::Objective { .. }
        )
    }
}
