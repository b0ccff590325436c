//! Numeric backend seam.
//!
//! A backend receives the frozen [`FlatModel`] and a [`SearchConfig`] and
//! returns a [`MipSolution`]. Search parameters are passed through
//! untouched; infeasibility and exhausted limits are reported through
//! [`SolveStatus`], never as errors.

mod config;
mod enumerate;
mod solution;

pub use config::{RestartPolicy, SearchConfig};
pub use enumerate::EnumerationBackend;
pub use solution::{MipSolution, SolveStats, SolveStatus};

use crate::flat::FlatModel;

/// Trait for numeric MIP backends.
///
/// Implementors wrap an external solver or provide their own search.
pub trait MipBackend {
    /// Solves the model and returns a solution.
    fn solve(&self, model: &FlatModel, config: &SearchConfig) -> MipSolution;
}
