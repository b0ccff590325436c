//! Flow relaxation of AllDifferent and global cardinality.
//!
//! Variables on one side, values on the other. Every pair `(i, v)` with `v`
//! in the domain of variable `i` gets a binary `x[i,v]`, and
//!
//! ```text
//! sum_v x[i,v] == 1                          (assignment, per variable)
//! card_lb[v] <= sum_i x[i,v] <= card_ub[v]   (capacity, per value)
//! var_i == sum_v v * x[i,v]                  (linking, per variable)
//! ```
//!
//! This is a transportation relaxation; the combinatorial reasoning is left
//! to the backend's branch-and-bound.

use super::builder::ModelBuilder;
use crate::error::{ModelError, Result};
use crate::expr::{ExprArray, FlowKind, IntArray, NodeId, NodeKind};
use crate::flat::VarKind;
use crate::linear::LinearConstraint;
use std::collections::BTreeMap;
use tracing::warn;

/// Value range spanned by the variables' domains and the occurrence bounds
/// of each value.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowBounds {
    pub min_val: i64,
    pub max_val: i64,
    capacity: BTreeMap<i64, (i64, i64)>,
    unreachable: Vec<(i64, i64)>,
}

impl FlowBounds {
    /// Capacities default to `[0, n]`; AllDifferent lowers the upper bound
    /// to 1; Gcc overrides the listed values.
    pub fn new(
        kind: FlowKind,
        domains: &[Vec<i64>],
        values: &IntArray,
        card_lb: &IntArray,
        card_ub: &IntArray,
    ) -> Self {
        let n = domains.len() as i64;
        let default_ub = match kind {
            FlowKind::AllDifferent => 1,
            FlowKind::Gcc => n,
        };
        let capacity: BTreeMap<i64, (i64, i64)> = domains
            .iter()
            .flatten()
            .map(|&v| (v, (0, default_ub)))
            .collect();
        let min_val = capacity.keys().next().copied().unwrap_or(0);
        let max_val = capacity.keys().next_back().copied().unwrap_or(-1);

        let mut bounds = Self {
            min_val,
            max_val,
            capacity,
            unreachable: Vec::new(),
        };
        for ((&v, &lb), &ub) in values.iter().zip(card_lb.iter()).zip(card_ub.iter()) {
            match bounds.capacity.get_mut(&v) {
                Some(cap) => *cap = (cap.0.max(lb), cap.1.min(ub)),
                None if lb > 0 => bounds.unreachable.push((v, lb)),
                None => {}
            }
        }
        bounds
    }

    /// Occurrence bounds of `v`; values no domain contains are `[0, 0]`.
    pub fn capacity(&self, v: i64) -> (i64, i64) {
        self.capacity.get(&v).copied().unwrap_or((0, 0))
    }

    /// Values that no variable can take but that must occur, with their
    /// required count.
    pub fn unreachable(&self) -> &[(i64, i64)] {
        &self.unreachable
    }
}

impl ModelBuilder {
    pub(super) fn encode_flow(
        &mut self,
        id: NodeId,
        kind: FlowKind,
        vars: &ExprArray,
        values: &IntArray,
        card_lb: &IntArray,
        card_ub: &IntArray,
    ) -> Result<()> {
        let domains = vars
            .iter()
            .map(|&v| self.domain_values(v))
            .collect::<Result<Vec<_>>>()?;
        let bounds = FlowBounds::new(kind, &domains, values, card_lb, card_ub);

        let mut columns: BTreeMap<i64, LinearConstraint> = BTreeMap::new();
        let mut links = Vec::with_capacity(domains.len());
        for (i, (&x, domain)) in vars.iter().zip(&domains).enumerate() {
            let mut assign = LinearConstraint::new(1.0, 1.0);
            let mut link = LinearConstraint::new(0.0, 0.0);
            link.add_coef(&self.nodes, x, 1.0)?;
            for &v in domain {
                let b = self.model.new_var(
                    format!("f{}[{i}]=={v}", id.index()),
                    VarKind::Binary,
                    0.0,
                    1.0,
                );
                assign.add_var(b, 1.0);
                link.add_var(b, -(v as f64));
                columns
                    .entry(v)
                    .or_insert_with(|| LinearConstraint::new(0.0, 0.0))
                    .add_var(b, 1.0);
            }
            self.post(assign);
            links.push(link);
        }

        for (v, mut column) in columns {
            let (lb, ub) = bounds.capacity(v);
            column.set_bounds(lb as f64, ub as f64);
            self.post(column);
        }
        for &(v, lb) in bounds.unreachable() {
            warn!(
                node = %id,
                value = v,
                required = lb,
                "cardinality demand on a value no variable can take"
            );
            self.post(LinearConstraint::new(lb as f64, f64::INFINITY));
        }
        for link in links {
            self.post(link);
        }
        Ok(())
    }

    /// Explicit integer domain of a node, in increasing order.
    pub(super) fn domain_values(&self, id: NodeId) -> Result<Vec<i64>> {
        let node = self.node(id)?;
        if node.continuous {
            return Err(ModelError::ContinuousDomain(id));
        }
        match &node.kind {
            NodeKind::IntVar {
                values: Some(values),
                ..
            } => Ok(values.clone()),
            NodeKind::View {
                base,
                scale,
                offset,
                ..
            } => {
                let mut values: Vec<i64> = self
                    .domain_values(*base)?
                    .into_iter()
                    .map(|v| (*scale * v as f64 + *offset) as i64)
                    .collect();
                values.sort_unstable();
                values.dedup();
                Ok(values)
            }
            _ => {
                let (lo, hi) = (node.lower.ceil(), node.upper.floor());
                let size = hi - lo + 1.0;
                let limit = self.config.max_flow_domain;
                if !size.is_finite() || size > limit as f64 {
                    return Err(ModelError::DomainTooLarge {
                        node: id,
                        size: if size.is_finite() { size as usize } else { usize::MAX },
                        limit,
                    });
                }
                Ok((lo as i64..=hi as i64).collect())
            }
        }
    }
}
