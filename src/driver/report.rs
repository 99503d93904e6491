//! Refinement output: parameter table, diagnostic curve, status.

use crate::error::Diagnostic;
use crate::local::AttemptReport;
use crate::params::FitOrTie;

/// Name of the synthetic row carrying the starting chi-square.
pub const CHI2_INIT: &str = "Chi2_Init";
/// Name of the synthetic row carrying the final chi-square.
pub const CHI2_RESULT: &str = "Chi2_Result";

/// One row of the output parameter table.
///
/// Synthetic chi-square rows carry only a name and value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputRow {
    pub name: String,
    pub value: f64,
    pub fit_or_tie: Option<FitOrTie>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub uncertainty: Option<f64>,
}

impl OutputRow {
    pub fn synthetic(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            fit_or_tie: None,
            min: None,
            max: None,
            step: None,
            uncertainty: None,
        }
    }
}

/// Per-point comparison of data and model before and after refinement.
/// Residuals are `observed - model`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticCurve {
    pub xs: Vec<f64>,
    pub observed: Vec<f64>,
    pub model: Vec<f64>,
    pub residual: Vec<f64>,
    pub prefit_model: Vec<f64>,
    pub prefit_residual: Vec<f64>,
    /// Z-score of each final residual against all final residuals.
    pub residual_zscore: Vec<f64>,
}

impl DiagnosticCurve {
    pub fn new(xs: &[f64], observed: &[f64], model: Vec<f64>, prefit_model: Vec<f64>) -> Self {
        let residual: Vec<f64> = observed.iter().zip(&model).map(|(o, m)| o - m).collect();
        let prefit_residual: Vec<f64> = observed
            .iter()
            .zip(&prefit_model)
            .map(|(o, m)| o - m)
            .collect();
        let residual_zscore = zscore(&residual);
        Self {
            xs: xs.to_vec(),
            observed: observed.to_vec(),
            model,
            residual,
            prefit_model,
            prefit_residual,
            residual_zscore,
        }
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

/// `(v - mean) / sd` with the population standard deviation. All zeros
/// when the spread is zero. Non-finite entries are ignored in the
/// statistics and map to NaN.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return vec![f64::NAN; values.len()];
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let sd = (finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                f64::NAN
            } else if sd > 0.0 {
                (v - mean) / sd
            } else {
                0.0
            }
        })
        .collect()
}

/// Which result the refinement settled on.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RefinementStatus {
    /// A local attempt was at least as good as the Monte Carlo best.
    LocalAdopted { attempt: usize, method: String },
    /// The Monte Carlo best was kept. `local_discarded` is true when a local
    /// result existed but was worse.
    MonteCarloKept { local_discarded: bool },
    /// Nothing improved on the starting parameters.
    Unchanged,
}

impl std::fmt::Display for RefinementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefinementStatus::LocalAdopted { attempt, method } => {
                write!(f, "refined: local attempt {attempt} ({method}) adopted")
            }
            RefinementStatus::MonteCarloKept {
                local_discarded: true,
            } => write!(
                f,
                "refined: monte carlo result kept, worse local refinement discarded"
            ),
            RefinementStatus::MonteCarloKept {
                local_discarded: false,
            } => write!(
                f,
                "refined: monte carlo result kept, no local improvement available"
            ),
            RefinementStatus::Unchanged => write!(
                f,
                "failed: no improvement over the starting parameters"
            ),
        }
    }
}

/// Summary of the Monte Carlo phase.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct McSummary {
    pub best_chi_square: f64,
    pub best_step: usize,
    pub best_group: Option<usize>,
    pub iterations: usize,
    pub accepted_moves: usize,
    pub final_temperature: f64,
    pub cancelled: bool,
}

/// Everything a refinement produces.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementReport {
    /// One row per input parameter, in table order.
    pub parameters: Vec<OutputRow>,
    pub chi2_init: f64,
    pub chi2_result: f64,
    /// Final chi-square over `max(weighted points - fit parameters, 1)`.
    pub chi2_per_dof: f64,
    pub curve: DiagnosticCurve,
    pub status: RefinementStatus,
    pub monte_carlo: Option<McSummary>,
    pub local_attempts: Vec<AttemptReport>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RefinementReport {
    /// Parameter rows followed by the `Chi2_Init` and `Chi2_Result` rows.
    pub fn table(&self) -> Vec<OutputRow> {
        let mut rows = self.parameters.clone();
        rows.push(OutputRow::synthetic(CHI2_INIT, self.chi2_init));
        rows.push(OutputRow::synthetic(CHI2_RESULT, self.chi2_result));
        rows
    }

    pub fn status_message(&self) -> String {
        self.status.to_string()
    }

    pub fn parameter(&self, name: &str) -> Option<&OutputRow> {
        self.parameters.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zscore() {
        let z = zscore(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(z[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(z[0], -z[2], epsilon = 1e-12);
        assert_relative_eq!(z[2], 1.5f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_zscore_flat() {
        assert_eq!(zscore(&[2.0, 2.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_curve_residuals() {
        let curve = DiagnosticCurve::new(&[1.0, 2.0], &[10.0, 20.0], vec![9.0, 21.0], vec![0.0, 0.0]);
        assert_eq!(curve.residual, vec![1.0, -1.0]);
        assert_eq!(curve.prefit_residual, vec![10.0, 20.0]);
        assert_eq!(curve.residual_zscore, vec![1.0, -1.0]);
    }

    #[test]
    fn test_status_messages() {
        assert!(RefinementStatus::Unchanged.to_string().starts_with("failed"));
        let s = RefinementStatus::LocalAdopted {
            attempt: 1,
            method: "levenberg-marquardt".into(),
        };
        assert!(s.to_string().contains("attempt 1"));
    }
}
