//! Error types for model construction and lowering.

use crate::expr::NodeId;
use thiserror::Error;

/// Errors raised while building or lowering a model.
///
/// Solver outcomes (infeasible, limit reached) are not errors: they are
/// reported through [`crate::backend::SolveStatus`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("model is initialised: no further additions are permitted")]
    Frozen,

    #[error("model must be initialised before solving")]
    NotInitialised,

    #[error("{what}: expected {expected} entries, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("empty domain")]
    EmptyDomain,

    #[error("invalid bounds [{lower}, {upper}]")]
    InvalidBounds { lower: f64, upper: f64 },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} is referenced before it is encoded")]
    NotEncoded(NodeId),

    #[error("node {0} cannot be used as a sub-expression")]
    NotReifiable(NodeId),

    #[error("cannot derive a finite big-M for node {0}")]
    UnboundedBigM(NodeId),

    #[error("domain of node {node} has {size} values, limit is {limit}")]
    DomainTooLarge {
        node: NodeId,
        size: usize,
        limit: usize,
    },

    #[error("node {0} has a continuous domain")]
    ContinuousDomain(NodeId),

    #[error("an objective has already been added")]
    DuplicateObjective,

    #[error("node {node} is not a {expected}")]
    WrongKind {
        node: NodeId,
        expected: &'static str,
    },

    #[error("node {0} is already encoded")]
    AlreadyEncoded(NodeId),

    #[error("solution carries no assignment for this model")]
    NoAssignment,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ModelError>;
