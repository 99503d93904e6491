//! Refinement configuration.

use crate::error::{Error, Result};
use crate::local::RefinementAttempt;
use crate::mc::{McConfig, DEFAULT_WINDOW_SIZE};
use crate::params::{GroupingPolicy, StepCoefficients};

/// Which phases run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Algorithm {
    /// Monte Carlo annealing followed by local refinement.
    #[default]
    MonteCarlo,
    /// Local refinement only, from the input values.
    OneStepFit,
}

/// Source of the per-point uncertainties.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StandardErrorMode {
    /// Every point gets this uncertainty.
    ConstantValue(f64),
    /// Use the observed uncertainties as given.
    UseInputValue,
}

impl Default for StandardErrorMode {
    fn default() -> Self {
        StandardErrorMode::ConstantValue(1.0)
    }
}

/// Random-walk coefficients for the thermal neutron d → TOF parameters.
pub fn thermal_neutron_steps() -> Vec<(String, StepCoefficients)> {
    [
        ("Dtt1", StepCoefficients::new(5.0, 0.0, true)),
        ("Dtt1t", StepCoefficients::new(5.0, 0.0, true)),
        ("Dtt2t", StepCoefficients::new(0.1, 1.0, false)),
        ("Zero", StepCoefficients::new(5.0, 0.0, false)),
        ("Zerot", StepCoefficients::new(5.0, 0.0, false)),
        ("Width", StepCoefficients::new(0.0, 0.1, true)),
        ("Tcross", StepCoefficients::new(0.0, 0.1, true)),
    ]
    .into_iter()
    .map(|(name, c)| (name.to_string(), c))
    .collect()
}

/// Configuration for a full refinement.
///
/// # Examples
///
/// ```
/// use u_refine::driver::{Algorithm, RefineConfig, StandardErrorMode};
///
/// let config = RefineConfig::default()
///     .with_algorithm(Algorithm::MonteCarlo)
///     .with_max_iterations(1000)
///     .with_random_seed(42)
///     .with_standard_error(StandardErrorMode::UseInputValue);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefineConfig {
    pub algorithm: Algorithm,

    /// Seed of the single random stream used by the Monte Carlo phase.
    pub random_seed: u64,

    /// Monte Carlo steps. Must be positive.
    pub max_iterations: usize,

    /// Starting annealing temperature. Must be positive.
    pub initial_temperature: f64,

    /// Proposal step scale.
    pub damping: f64,

    pub standard_error: StandardErrorMode,

    /// How fit parameters are grouped for joint proposals.
    pub grouping: GroupingPolicy,

    /// Random-walk coefficients by parameter name, applied at setup.
    /// Names absent from the table are ignored. Parameters not listed keep
    /// `a0 = step`, `a1 = 0`.
    pub step_policy: Vec<(String, StepCoefficients)>,

    /// Ordered local refinement attempts.
    pub attempts: Vec<RefinementAttempt>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            random_seed: 1,
            max_iterations: 100,
            initial_temperature: 1.0,
            damping: 1.0,
            standard_error: StandardErrorMode::default(),
            grouping: GroupingPolicy::default(),
            step_policy: thermal_neutron_steps(),
            attempts: RefinementAttempt::default_sequence(),
        }
    }
}

impl RefineConfig {
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

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

    pub fn with_standard_error(mut self, mode: StandardErrorMode) -> Self {
        self.standard_error = mode;
        self
    }

    pub fn with_grouping(mut self, grouping: GroupingPolicy) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_step_policy(mut self, policy: Vec<(String, StepCoefficients)>) -> Self {
        self.step_policy = policy;
        self
    }

    pub fn with_attempts(mut self, attempts: Vec<RefinementAttempt>) -> Self {
        self.attempts = attempts;
        self
    }

    /// Monte Carlo phase options.
    pub fn mc_config(&self) -> McConfig {
        McConfig {
            max_iterations: self.max_iterations,
            initial_temperature: self.initial_temperature,
            damping: self.damping,
            window_size: DEFAULT_WINDOW_SIZE,
            seed: self.random_seed,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.mc_config().validate()?;
        for attempt in &self.attempts {
            attempt.method.validate()?;
        }
        if let StandardErrorMode::ConstantValue(c) = self.standard_error {
            if !(c > 0.0) || !c.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "constant standard error must be positive, got {c}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{AttemptSeed, LmConfig, LocalMethod};

    #[test]
    fn test_default_config_is_valid() {
        let config = RefineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.attempts.len(), 3);
        assert_eq!(config.step_policy.len(), 7);
    }

    #[test]
    fn test_mc_config_mirrors_options() {
        let config = RefineConfig::default()
            .with_random_seed(9)
            .with_max_iterations(50)
            .with_initial_temperature(2.0)
            .with_damping(0.25);
        let mc = config.mc_config();
        assert_eq!(mc.seed, 9);
        assert_eq!(mc.max_iterations, 50);
        assert_eq!(mc.initial_temperature, 2.0);
        assert_eq!(mc.damping, 0.25);
        assert_eq!(mc.window_size, 10);
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        assert!(RefineConfig::default().with_max_iterations(0).validate().is_err());
        assert!(RefineConfig::default()
            .with_initial_temperature(0.0)
            .validate()
            .is_err());
        assert!(RefineConfig::default()
            .with_standard_error(StandardErrorMode::ConstantValue(0.0))
            .validate()
            .is_err());
        let broken = LocalMethod::LevenbergMarquardt(LmConfig::default().with_max_iterations(0));
        assert!(RefineConfig::default()
            .with_attempts(vec![RefinementAttempt::new(broken, AttemptSeed::Original)])
            .validate()
            .is_err());
    }
}
