//! Expression tree: variables, views, sums, operators, global constraints.
//!
//! Nodes live in the arena of a [`crate::lower::ModelBuilder`] and are
//! referred to by [`NodeId`]. A node is encoded at most once; the
//! [`Encoding`] it receives on its first visit is its only backend slot.

mod containers;
mod node;

pub use containers::{Array, DoubleArray, ExprArray, IntArray};
pub use node::{Binop, Encoding, FlowKind, Node, NodeId, NodeKind, Operand, Rel, ViewKind};
