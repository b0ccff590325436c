//! Exhaustive reference backend for small integer models.

use super::config::SearchConfig;
use super::solution::{MipSolution, SolveStats, SolveStatus};
use super::MipBackend;
use crate::flat::{FlatModel, ObjectiveSense, VarId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info};

const TOLERANCE: f64 = 1e-9;

/// Largest domain the backend will enumerate for a single variable.
const MAX_DOMAIN: usize = 1 << 16;

/// Depth-first enumeration of every integer assignment.
///
/// Each row is checked as soon as its last variable is assigned. Decision
/// variables are branched on first. Models with a continuous variable that
/// is not fixed, or with an unbounded integer variable, are answered with
/// [`SolveStatus::Unknown`].
///
/// Known heuristics: `"Lex"` and `"MinDomain"` for variables, `"Min"` and
/// `"Max"` for values.
///
/// # Examples
///
/// ```
/// use u_mipmodel::backend::{EnumerationBackend, SearchConfig};
/// use u_mipmodel::lower::ModelBuilder;
///
/// let mut mb = ModelBuilder::new();
/// let x = mb.int_var(0, 3).unwrap();
/// let y = mb.int_var(0, 3).unwrap();
/// let s = mb.plus(x, y).unwrap();
/// let eq = mb.eq(s, 5).unwrap();
/// let obj = mb.maximise(x).unwrap();
/// mb.add(eq).unwrap();
/// mb.add(obj).unwrap();
/// mb.initialise().unwrap();
///
/// let sol = mb.solve(&EnumerationBackend::new(), &SearchConfig::default()).unwrap();
/// assert!(sol.is_sat());
/// assert_eq!(sol.objective_value, Some(3.0));
/// assert_eq!(mb.value(&sol, y).unwrap(), 2.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumerationBackend;

impl EnumerationBackend {
    pub fn new() -> Self {
        Self
    }

    /// Every feasible assignment of `model`, ignoring the objective.
    ///
    /// Limits in `config` still apply; restarts do not.
    pub fn all_solutions(&self, model: &FlatModel, config: &SearchConfig) -> Vec<Vec<f64>> {
        let Some(mut search) = Search::new(model, config, Mode::All) else {
            return Vec::new();
        };
        search.shuffle(config);
        search.run(None);
        search.all
    }
}

impl MipBackend for EnumerationBackend {
    fn solve(&self, model: &FlatModel, config: &SearchConfig) -> MipSolution {
        let mode = match model.objective() {
            Some(obj) => Mode::Optimise(obj.sense, obj.var),
            None => Mode::First,
        };
        let Some(mut search) = Search::new(model, config, mode) else {
            return MipSolution::empty(SolveStatus::Unknown);
        };

        let mut run = 0;
        let completed = loop {
            search.shuffle(config);
            let cutoff = config.restart.map(|policy| policy.cutoff(run));
            match search.run(cutoff) {
                Outcome::Completed => break true,
                Outcome::Stopped => break false,
                Outcome::Restart => {
                    debug!(run, failures = search.stats.failures, "restart");
                    run += 1;
                }
            }
        };

        search.stats.time_ms = search.start.elapsed().as_secs_f64() * 1000.0;
        let status = match (&search.best, completed) {
            (Some(_), _) => SolveStatus::Sat,
            (None, true) => SolveStatus::Unsat,
            (None, false) => SolveStatus::Unknown,
        };
        if config.verbosity > 0 {
            info!(
                ?status,
                nodes = search.stats.nodes,
                failures = search.stats.failures,
                backtracks = search.stats.backtracks,
                time_ms = search.stats.time_ms,
                "search finished"
            );
        }

        let stats = search.stats;
        match search.best {
            Some(values) => MipSolution {
                status,
                objective_value: model.objective_value(&values),
                values,
                stats,
            },
            None => MipSolution {
                stats,
                ..MipSolution::empty(status)
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    First,
    All,
    Optimise(ObjectiveSense, VarId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Stopped,
    Restart,
}

struct Search<'a> {
    model: &'a FlatModel,
    mode: Mode,
    /// Branching order.
    order: Vec<VarId>,
    /// Candidate values, by position in `order`.
    domains: Vec<Vec<f64>>,
    /// Rows whose last variable sits at each position.
    rows_at: Vec<Vec<usize>>,
    /// Rows without variables.
    constant_rows: Vec<usize>,
    values: Vec<f64>,
    best: Option<Vec<f64>>,
    all: Vec<Vec<f64>>,
    stats: SolveStats,
    rng: StdRng,
    start: Instant,
    time_limit_ms: u64,
    failure_limit: u64,
    run_failures: u64,
    run_cutoff: Option<u64>,
    interrupted: Option<Outcome>,
}

impl<'a> Search<'a> {
    fn new(model: &'a FlatModel, config: &SearchConfig, mode: Mode) -> Option<Self> {
        let n = model.var_count();
        let mut domains = Vec::with_capacity(n);
        for var in model.vars() {
            if !var.is_integral() {
                if var.lower != var.upper {
                    debug!(var = %var.id, "continuous variable is not fixed");
                    return None;
                }
                domains.push(vec![var.lower]);
                continue;
            }
            let (lo, hi) = (var.lower.ceil(), var.upper.floor());
            let domain: Vec<f64> = match &var.values {
                Some(values) => values
                    .iter()
                    .map(|&v| v as f64)
                    .filter(|&v| v >= lo && v <= hi)
                    .collect(),
                None => {
                    if !(hi - lo).is_finite() || hi - lo >= MAX_DOMAIN as f64 {
                        debug!(var = %var.id, "domain too large to enumerate");
                        return None;
                    }
                    (lo as i64..=hi as i64).map(|v| v as f64).collect()
                }
            };
            domains.push(domain);
        }

        let mut order: Vec<VarId> = model.decision_vars().to_vec();
        let mut seen = vec![false; n];
        for v in &order {
            seen[v.index()] = true;
        }
        let decided = order.len();
        order.extend(model.vars().iter().map(|v| v.id).filter(|v| !seen[v.index()]));
        if config.var_heuristic == "MinDomain" {
            order[..decided].sort_by_key(|v| domains[v.index()].len());
            order[decided..].sort_by_key(|v| domains[v.index()].len());
        }

        let mut position = vec![0; n];
        for (pos, v) in order.iter().enumerate() {
            position[v.index()] = pos;
        }
        let mut rows_at = vec![Vec::new(); n];
        let mut constant_rows = Vec::new();
        for (i, row) in model.rows().iter().enumerate() {
            match row.terms().iter().map(|(v, _)| position[v.index()]).max() {
                Some(pos) => rows_at[pos].push(i),
                None => constant_rows.push(i),
            }
        }

        let mut domains: Vec<Vec<f64>> = order
            .iter()
            .map(|v| std::mem::take(&mut domains[v.index()]))
            .collect();
        if config.val_heuristic == "Max" {
            for d in &mut domains {
                d.reverse();
            }
        }

        Some(Self {
            model,
            mode,
            order,
            domains,
            rows_at,
            constant_rows,
            values: vec![0.0; n],
            best: None,
            all: Vec::new(),
            stats: SolveStats::default(),
            rng: StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random)),
            start: Instant::now(),
            time_limit_ms: config.time_limit_ms,
            failure_limit: config.failure_limit,
            run_failures: 0,
            run_cutoff: None,
            interrupted: None,
        })
    }

    fn shuffle(&mut self, config: &SearchConfig) {
        if config.randomized {
            for d in &mut self.domains {
                d.shuffle(&mut self.rng);
            }
        }
    }

    fn run(&mut self, cutoff: Option<u64>) -> Outcome {
        self.run_failures = 0;
        self.run_cutoff = cutoff;
        self.interrupted = None;

        let rows = self.model.rows();
        let constant_ok = self.constant_rows.iter().all(|&i| {
            self.stats.checks += 1;
            rows[i].is_satisfied(&self.values, TOLERANCE)
        });
        if constant_ok {
            self.dfs(0);
        }
        self.interrupted.unwrap_or(Outcome::Completed)
    }

    fn dfs(&mut self, pos: usize) {
        if pos == self.order.len() {
            self.record();
            return;
        }
        let var = self.order[pos].index();
        for i in 0..self.domains[pos].len() {
            if let Some(outcome) = self.budget_exhausted() {
                self.interrupted = Some(outcome);
                return;
            }
            self.values[var] = self.domains[pos][i];
            self.stats.nodes += 1;
            if self.consistent(pos) {
                self.dfs(pos + 1);
                if self.interrupted.is_some() {
                    return;
                }
            } else {
                self.stats.failures += 1;
                self.run_failures += 1;
            }
        }
        self.stats.backtracks += 1;
    }

    fn consistent(&mut self, pos: usize) -> bool {
        let rows = self.model.rows();
        for &i in &self.rows_at[pos] {
            self.stats.checks += 1;
            if !rows[i].is_satisfied(&self.values, TOLERANCE) {
                return false;
            }
        }
        true
    }

    fn record(&mut self) {
        match self.mode {
            Mode::All => self.all.push(self.values.clone()),
            Mode::First => {
                self.best = Some(self.values.clone());
                self.interrupted = Some(Outcome::Completed);
            }
            Mode::Optimise(sense, obj) => {
                let value = self.values[obj.index()];
                let improves = match &self.best {
                    None => true,
                    Some(best) => match sense {
                        ObjectiveSense::Minimise => value < best[obj.index()],
                        ObjectiveSense::Maximise => value > best[obj.index()],
                    },
                };
                if improves {
                    self.best = Some(self.values.clone());
                }
            }
        }
    }

    fn budget_exhausted(&self) -> Option<Outcome> {
        if self.failure_limit > 0 && self.stats.failures >= self.failure_limit {
            return Some(Outcome::Stopped);
        }
        if self.time_limit_ms > 0
            && self.start.elapsed().as_millis() >= u128::from(self.time_limit_ms)
        {
            return Some(Outcome::Stopped);
        }
        match self.run_cutoff {
            Some(cutoff) if self.run_failures >= cutoff => Some(Outcome::Restart),
            _ => None,
        }
    }
}
