//! Lowering configuration.

use crate::error::{ModelError, Result};

/// Configuration for the lowering engine.
///
/// # Examples
///
/// ```
/// use u_mipmodel::lower::LoweringConfig;
///
/// let config = LoweringConfig::default()
///     .with_epsilon(1e-4)
///     .with_max_flow_domain(1_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct LoweringConfig {
    /// Minimal separation used for strict relations and disequalities on
    /// rows with continuous terms. Bounds the precision of `<`, `>` and `!=`.
    pub epsilon: f64,

    /// Use a separation of 1 when every term of a row is an integral
    /// coefficient on an integer variable.
    pub integral_separation: bool,

    /// Largest per-variable domain a flow encoding will enumerate.
    pub max_flow_domain: usize,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            integral_separation: true,
            max_flow_domain: 100_000,
        }
    }
}

impl LoweringConfig {
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_integral_separation(mut self, enabled: bool) -> Self {
        self.integral_separation = enabled;
        self
    }

    pub fn with_max_flow_domain(mut self, n: usize) -> Self {
        self.max_flow_domain = n;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(ModelError::InvalidConfig(format!(
                "epsilon must be positive and finite, got {}",
                self.epsilon
            )));
        }
        if self.max_flow_domain == 0 {
            return Err(ModelError::InvalidConfig(
                "max_flow_domain must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoweringConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.integral_separation);
        assert_eq!(config.epsilon, 1e-6);
    }

    #[test]
    fn test_invalid_epsilon() {
        assert!(LoweringConfig::default().with_epsilon(0.0).validate().is_err());
        assert!(LoweringConfig::default()
            .with_epsilon(f64::INFINITY)
            .validate()
            .is_err());
        assert!(LoweringConfig::default()
            .with_max_flow_domain(0)
            .validate()
            .is_err());
    }
}
