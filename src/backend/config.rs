//! Search parameters passed through to a backend.

use crate::error::{ModelError, Result};

/// Restart schedule: the failure cutoff of each successive search run.
///
/// # References
///
/// - Luby: Luby, Sinclair & Zuckerman (1993)
/// - Geometric: Walsh (1999)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RestartPolicy {
    /// `base * luby(i)` with `luby = 1, 1, 2, 1, 1, 2, 4, ...`.
    Luby { base: u64 },

    /// `base * factor^i`.
    Geometric { base: u64, factor: f64 },

    /// Luby sequence whose unit grows geometrically: `base * factor^i * luby(i)`.
    GeometricLuby { base: u64, factor: f64 },
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Geometric {
            base: 32,
            factor: 4.0 / 3.0,
        }
    }
}

impl RestartPolicy {
    /// Failure cutoff of run `i` (0-based). Never less than 1.
    ///
    /// ```
    /// use u_mipmodel::backend::RestartPolicy;
    ///
    /// let luby = RestartPolicy::Luby { base: 10 };
    /// let cutoffs: Vec<u64> = (0..7).map(|i| luby.cutoff(i)).collect();
    /// assert_eq!(cutoffs, vec![10, 10, 20, 10, 10, 20, 40]);
    /// ```
    pub fn cutoff(&self, run: u32) -> u64 {
        let raw = match *self {
            RestartPolicy::Luby { base } => base.saturating_mul(luby(run)),
            RestartPolicy::Geometric { base, factor } => {
                (base as f64 * factor.powi(run as i32)) as u64
            }
            RestartPolicy::GeometricLuby { base, factor } => {
                (base as f64 * factor.powi(run as i32) * luby(run) as f64) as u64
            }
        };
        raw.max(1)
    }

    fn validate(&self) -> Result<()> {
        let (base, factor) = match *self {
            RestartPolicy::Luby { base } => (base, 1.0),
            RestartPolicy::Geometric { base, factor }
            | RestartPolicy::GeometricLuby { base, factor } => (base, factor),
        };
        if base == 0 {
            return Err(ModelError::InvalidConfig(
                "restart base must be at least 1".into(),
            ));
        }
        if !(factor >= 1.0 && factor.is_finite()) {
            return Err(ModelError::InvalidConfig(format!(
                "restart factor must be finite and >= 1, got {factor}"
            )));
        }
        Ok(())
    }
}

/// `i`-th term (0-based) of the Luby sequence.
fn luby(i: u32) -> u64 {
    let mut i = u64::from(i) + 1;
    loop {
        // smallest k with 2^k - 1 >= i
        let mut k = 1u32;
        while (1u64 << k) - 1 < i {
            k += 1;
        }
        if (1u64 << k) - 1 == i {
            return 1u64 << (k - 1);
        }
        i -= (1u64 << (k - 1)) - 1;
    }
}

/// Search configuration handed to a [`MipBackend`](super::MipBackend).
///
/// Heuristic names are opaque strings: each backend interprets the ones it
/// knows and falls back to its default for the others.
///
/// # Examples
///
/// ```
/// use u_mipmodel::backend::{RestartPolicy, SearchConfig};
///
/// let config = SearchConfig::default()
///     .with_time_limit_ms(5_000)
///     .with_seed(7)
///     .with_heuristic("MinDomain", "Max")
///     .with_restart(RestartPolicy::Luby { base: 64 });
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchConfig {
    /// Wall-clock limit in milliseconds. 0 = no limit.
    pub time_limit_ms: u64,

    /// Maximum number of failures. 0 = no limit.
    pub failure_limit: u64,

    /// Random seed for reproducibility.
    pub seed: Option<u64>,

    /// Randomize value ordering.
    pub randomized: bool,

    /// Variable selection heuristic.
    pub var_heuristic: String,

    /// Value selection heuristic.
    pub val_heuristic: String,

    /// Restart schedule; `None` runs a single search.
    pub restart: Option<RestartPolicy>,

    /// 0 is silent; higher values log more.
    pub verbosity: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: 0,
            failure_limit: 0,
            seed: None,
            randomized: false,
            var_heuristic: "Lex".into(),
            val_heuristic: "Min".into(),
            restart: None,
            verbosity: 0,
        }
    }
}

impl SearchConfig {
    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = ms;
        self
    }

    pub fn with_failure_limit(mut self, n: u64) -> Self {
        self.failure_limit = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_randomized(mut self, randomized: bool) -> Self {
        self.randomized = randomized;
        self
    }

    pub fn with_heuristic(mut self, var: &str, val: &str) -> Self {
        self.var_heuristic = var.into();
        self.val_heuristic = val.into();
        self
    }

    pub fn with_restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = Some(policy);
        self
    }

    pub fn with_verbosity(mut self, verbosity: u32) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.var_heuristic.is_empty() || self.val_heuristic.is_empty() {
            return Err(ModelError::InvalidConfig(
                "heuristic names must not be empty".into(),
            ));
        }
        if let Some(policy) = &self.restart {
            policy.validate()?;
        }
        Ok(())
    }
}
