//! Backend outcome: status, assignment, statistics.

/// Outcome of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolveStatus {
    /// Proven infeasible.
    Unsat = 0,
    /// A feasible assignment was found.
    Sat = 1,
    /// A limit was reached first, or the backend cannot handle the model.
    Unknown = 2,
}

/// Counters reported by the backend after a search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveStats {
    /// Times the search exhausted a level and stepped back.
    pub backtracks: u64,
    /// Search nodes visited.
    pub nodes: u64,
    /// Partial assignments rejected by a row.
    pub failures: u64,
    /// Constraint rows evaluated.
    pub checks: u64,
    /// Bound tightenings applied; zero for backends that do not propagate.
    pub propagations: u64,
    /// Elapsed wall-clock time in milliseconds.
    pub time_ms: f64,
}

/// Solution returned by a [`MipBackend`](super::MipBackend).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MipSolution {
    /// How the search ended.
    pub status: SolveStatus,
    /// Value of every flat variable, indexed by [`VarId::index`](crate::flat::VarId::index).
    /// Empty when no assignment was found.
    pub values: Vec<f64>,
    /// Objective variable's value, when the model has one and an
    /// assignment was found.
    pub objective_value: Option<f64>,
    /// Search counters.
    pub stats: SolveStats,
}

impl MipSolution {
    /// Creates a solution with no assignment.
    pub fn empty(status: SolveStatus) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective_value: None,
            stats: SolveStats::default(),
        }
    }

    /// Whether `values` holds a feasible assignment.
    pub fn is_sat(&self) -> bool {
        self.status == SolveStatus::Sat
    }

    /// Whether the model was proven infeasible.
    pub fn is_unsat(&self) -> bool {
        self.status == SolveStatus::Unsat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(SolveStatus::Unsat as i32, 0);
        assert_eq!(SolveStatus::Sat as i32, 1);
        assert_eq!(SolveStatus::Unknown as i32, 2);
    }

    #[test]
    fn test_empty_solution() {
        let sol = MipSolution::empty(SolveStatus::Unknown);
        assert!(!sol.is_sat());
        assert!(!sol.is_unsat());
        assert!(sol.values.is_empty());
        assert_eq!(sol.stats, SolveStats::default());
    }
}
