//! Monte Carlo configuration.

use crate::error::{Error, Result};

/// Number of proposals per acceptance-ratio window.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Configuration for the Monte Carlo random walk.
///
/// # Examples
///
/// ```
/// use u_refine::mc::McConfig;
///
/// let config = McConfig::default()
///     .with_max_iterations(1000)
///     .with_initial_temperature(1.0)
///     .with_damping(0.5)
///     .with_seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct McConfig {
    /// Number of steps. Each step proposes once per group. Must be positive.
    pub max_iterations: usize,

    /// Starting annealing temperature. Must be positive.
    pub initial_temperature: f64,

    /// Global scale applied to every proposal step.
    pub damping: f64,

    /// Proposals per acceptance-ratio window.
    pub window_size: usize,

    /// Random seed. The stream is seeded once per run.
    pub seed: u64,
}

impl Default for McConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            initial_temperature: 1.0,
            damping: 1.0,
            window_size: DEFAULT_WINDOW_SIZE,
            seed: 1,
        }
    }
}

impl McConfig {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_initial_temperature(mut self, t: f64) -> Self {
        self.initial_temperature = t;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_window_size(mut self, n: usize) -> Self {
        self.window_size = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be positive".into()));
        }
        if !(self.initial_temperature > 0.0) || !self.initial_temperature.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "initial_temperature must be positive, got {}",
                self.initial_temperature
            )));
        }
        if !self.damping.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "damping must be finite, got {}",
                self.damping
            )));
        }
        if self.window_size == 0 {
            return Err(Error::InvalidConfig("window_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = McConfig::default();
        assert_eq!(config.window_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_iterations() {
        let config = McConfig::default().with_max_iterations(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_temperature() {
        assert!(McConfig::default()
            .with_initial_temperature(0.0)
            .validate()
            .is_err());
        assert!(McConfig::default()
            .with_initial_temperature(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_bad_damping() {
        let config = McConfig::default().with_damping(f64::INFINITY);
        assert!(config.validate().is_err());
    }
}
