//! Solver contract for the local least-squares polish.

use crate::error::{Error, Result};
use crate::model::{Objective, ResponseModel};

/// The reduced problem a local solver sees: only the free parameters vary,
/// every other store value is held at `base`.
pub struct FitProblem<'a, M> {
    objective: &'a Objective<M>,
    base: Vec<f64>,
    free: Vec<usize>,
    steps: Vec<f64>,
}

impl<'a, M: ResponseModel> FitProblem<'a, M> {
    /// `base` is a full store vector; `free` lists the varied indices and
    /// `steps` their characteristic step sizes (used to seed simplices).
    pub fn new(
        objective: &'a Objective<M>,
        base: &[f64],
        free: Vec<usize>,
        steps: Vec<f64>,
    ) -> Result<Self> {
        objective.evaluate(base)?;
        if steps.len() != free.len() {
            return Err(Error::SizeMismatch {
                what: "free parameter steps",
                expected: free.len(),
                actual: steps.len(),
            });
        }
        Ok(Self {
            objective,
            base: base.to_vec(),
            free,
            steps,
        })
    }

    /// Number of free parameters.
    pub fn dim(&self) -> usize {
        self.free.len()
    }

    /// Number of residuals (observed points).
    pub fn residual_len(&self) -> usize {
        self.objective.data().len()
    }

    /// Points that carry weight in the chi-square.
    pub fn weighted_points(&self) -> usize {
        self.objective.weighted_points()
    }

    pub fn free(&self) -> &[usize] {
        &self.free
    }

    pub fn steps(&self) -> &[f64] {
        &self.steps
    }

    /// Free values extracted from a full store vector.
    pub fn reduce(&self, full: &[f64]) -> Vec<f64> {
        self.free.iter().map(|&i| full[i]).collect()
    }

    /// Full store vector with `x` written into the free slots.
    pub fn expand(&self, x: &[f64]) -> Vec<f64> {
        let mut full = self.base.clone();
        for (&i, &v) in self.free.iter().zip(x) {
            full[i] = v;
        }
        full
    }

    /// Weighted residuals at free values `x`.
    pub fn residuals(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.objective.residuals(&self.expand(x))
    }

    /// Sum of squared residuals; saturates at `f64::MAX`.
    pub fn cost(&self, x: &[f64]) -> Result<f64> {
        let cost: f64 = self.residuals(x)?.iter().map(|r| r * r).sum();
        Ok(if cost.is_finite() { cost } else { f64::MAX })
    }
}

/// What one solver run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    /// Free parameter values, within bounds.
    pub solution: Vec<f64>,
    pub converged: bool,
    /// Final sum of squared weighted residuals.
    pub final_cost: f64,
    /// 1-sigma uncertainties of the free parameters, when available.
    pub uncertainties: Option<Vec<f64>>,
    pub iterations: u64,
    pub message: String,
}

impl SolveOutcome {
    pub fn failed(initial: &[f64], message: impl Into<String>) -> Self {
        Self {
            solution: initial.to_vec(),
            converged: false,
            final_cost: f64::INFINITY,
            uncertainties: None,
            iterations: 0,
            message: message.into(),
        }
    }
}

/// A deterministic nonlinear least-squares method.
///
/// Implementations never return an error: failure to converge is reported
/// through [`SolveOutcome::converged`] with a diagnostic message.
pub trait LeastSquaresSolver {
    /// Human-readable method name.
    fn name(&self) -> &str;

    /// Minimizes `problem.cost` from `initial` subject to box `bounds`.
    fn solve<M: ResponseModel>(
        &self,
        problem: &FitProblem<'_, M>,
        initial: &[f64],
        bounds: &[(f64, f64)],
    ) -> SolveOutcome;
}

/// Clamps every component into its bounds.
pub fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params
        .iter()
        .zip(bounds.iter())
        .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
        .collect()
}

/// Signed offset of magnitude at most `delta` from `x` that stays inside
/// `(lo, hi)`. Prefers `+delta`, then `-delta`; in a box narrower than
/// `delta` it moves to the farther bound. Zero when `lo == hi == x`.
pub(crate) fn bounded_offset(x: f64, delta: f64, (lo, hi): (f64, f64)) -> f64 {
    if x + delta <= hi {
        delta
    } else if x - delta >= lo {
        -delta
    } else if hi - x >= x - lo {
        hi - x
    } else {
        lo - x
    }
}
