//! Levenberg-Marquardt polish with box constraints.
//!
//! Damped Gauss-Newton on the weighted residual vector:
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr
//! ```
//!
//! The Jacobian is taken by forward differences. Trial points are clamped
//! into bounds. λ shrinks after an accepted step and grows after a rejected
//! one.

use super::types::{bounded_offset, clamp_params, FitProblem, LeastSquaresSolver, SolveOutcome};
use crate::error::{Error, Result};
use crate::model::ResponseModel;
use nalgebra::{DMatrix, DVector};

/// Diagonal entries below this are floored before damping.
const DIAG_FLOOR: f64 = 1e-12;
/// λ above this means no damped step reduces the cost any further.
const LAMBDA_MAX: f64 = 1e16;

/// Levenberg-Marquardt options.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LmConfig {
    pub max_iterations: u64,
    /// Converged when an accepted step lowers the cost by less than this
    /// fraction.
    pub f_tolerance: f64,
    /// Converged when the step norm falls below this relative to `‖x‖`.
    pub x_tolerance: f64,
    /// Converged when `‖Jᵀr‖∞ <= g_tolerance * (1 + cost)`.
    pub g_tolerance: f64,
    /// Converged when the cost itself falls below this.
    pub cost_tolerance: f64,
    pub initial_lambda: f64,
    /// Relative forward-difference step.
    pub fd_step: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            f_tolerance: 1e-12,
            x_tolerance: 1e-14,
            g_tolerance: 1e-12,
            cost_tolerance: 1e-20,
            initial_lambda: 1e-3,
            fd_step: 1e-7,
        }
    }
}

impl LmConfig {
    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "levenberg-marquardt max_iterations must be positive".into(),
            ));
        }
        if !(self.initial_lambda > 0.0) || !(self.fd_step > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "levenberg-marquardt initial_lambda and fd_step must be positive, got {} and {}",
                self.initial_lambda, self.fd_step
            )));
        }
        let tolerances = [
            self.f_tolerance,
            self.x_tolerance,
            self.g_tolerance,
            self.cost_tolerance,
        ];
        if tolerances.iter().any(|t| !(*t >= 0.0)) {
            return Err(Error::InvalidConfig(
                "levenberg-marquardt tolerances must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Levenberg-Marquardt solver.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: LmConfig) -> Self {
        Self { config }
    }

    fn minimize<M: ResponseModel>(
        &self,
        problem: &FitProblem<'_, M>,
        initial: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<SolveOutcome> {
        let cfg = &self.config;
        let mut x = clamp_params(initial, bounds);
        let mut r = DVector::from_vec(problem.residuals(&x)?);
        let mut cost = r.norm_squared();
        if !cost.is_finite() {
            return Ok(SolveOutcome::failed(&x, "non-finite starting cost"));
        }
        let mut lambda = cfg.initial_lambda;

        let mut done: Option<&str> = None;
        let mut iterations = 0u64;
        while iterations < cfg.max_iterations {
            iterations += 1;
            if cost <= cfg.cost_tolerance {
                done = Some("cost below tolerance");
                break;
            }

            let jac = self.jacobian(problem, &x, &r, bounds)?;
            let jt = jac.transpose();
            let jtj = &jt * &jac;
            let g = &jt * &r;
            if g.amax() <= cfg.g_tolerance * (1.0 + cost) {
                done = Some("gradient below tolerance");
                break;
            }

            let mut accepted = false;
            while lambda <= LAMBDA_MAX {
                let mut a = jtj.clone();
                for i in 0..a.nrows() {
                    a[(i, i)] += lambda * jtj[(i, i)].max(DIAG_FLOOR);
                }
                let Some(dx) = solve_damped(a, -&g) else {
                    lambda *= 10.0;
                    continue;
                };

                let x_trial: Vec<f64> = clamp_params(
                    &x.iter().zip(dx.iter()).map(|(a, b)| a + b).collect::<Vec<_>>(),
                    bounds,
                );
                let r_trial = DVector::from_vec(problem.residuals(&x_trial)?);
                let cost_trial = r_trial.norm_squared();

                if cost_trial.is_finite() && cost_trial < cost {
                    let reduction = (cost - cost_trial) / cost;
                    let step_norm = x
                        .iter()
                        .zip(&x_trial)
                        .map(|(a, b)| (a - b).powi(2))
                        .sum::<f64>()
                        .sqrt();
                    let x_norm = x_trial.iter().map(|v| v * v).sum::<f64>().sqrt();

                    x = x_trial;
                    r = r_trial;
                    cost = cost_trial;
                    lambda = (lambda * 0.1).max(1e-15);
                    accepted = true;

                    if reduction < cfg.f_tolerance {
                        done = Some("relative reduction below tolerance");
                    } else if step_norm <= cfg.x_tolerance * (x_norm + cfg.x_tolerance) {
                        done = Some("step below tolerance");
                    }
                    break;
                }
                lambda *= 10.0;
            }

            if !accepted {
                done = Some("no damped step reduces the cost");
                break;
            }
            if done.is_some() {
                break;
            }
        }

        let uncertainties = self.uncertainties(problem, &x, &r, cost, bounds)?;
        Ok(SolveOutcome {
            solution: x,
            converged: done.is_some(),
            final_cost: cost,
            uncertainties,
            iterations,
            message: done
                .unwrap_or("maximum iterations reached")
                .to_string(),
        })
    }

    /// Forward differences with the step kept inside both bounds. A
    /// parameter pinned by its bounds gets a zero column.
    fn jacobian<M: ResponseModel>(
        &self,
        problem: &FitProblem<'_, M>,
        x: &[f64],
        r: &DVector<f64>,
        bounds: &[(f64, f64)],
    ) -> Result<DMatrix<f64>> {
        let m = r.len();
        let n = x.len();
        let mut jac = DMatrix::zeros(m, n);
        let mut xp = x.to_vec();
        for j in 0..n {
            let delta = self.config.fd_step * x[j].abs().max(1.0);
            let (lo, hi) = bounds[j];
            xp[j] = (x[j] + bounded_offset(x[j], delta, bounds[j])).clamp(lo, hi);
            let h = xp[j] - x[j];
            if h == 0.0 {
                continue;
            }
            let rp = problem.residuals(&xp)?;
            for i in 0..m {
                jac[(i, j)] = (rp[i] - r[i]) / h;
            }
            xp[j] = x[j];
        }
        Ok(jac)
    }

    /// `sqrt(diag((JᵀJ)⁻¹) · χ²/dof)`; `None` when there are no degrees of
    /// freedom or the normal matrix cannot be inverted.
    fn uncertainties<M: ResponseModel>(
        &self,
        problem: &FitProblem<'_, M>,
        x: &[f64],
        r: &DVector<f64>,
        cost: f64,
        bounds: &[(f64, f64)],
    ) -> Result<Option<Vec<f64>>> {
        let n = x.len();
        let points = problem.weighted_points();
        if points <= n {
            return Ok(None);
        }
        let jac = self.jacobian(problem, x, r, bounds)?;
        let jtj = jac.transpose() * &jac;
        let Some(cov) = jtj.try_inverse() else {
            return Ok(None);
        };
        let scale = cost / (points - n) as f64;
        let sigmas: Vec<f64> = (0..n).map(|i| (cov[(i, i)] * scale).sqrt()).collect();
        if sigmas.iter().all(|s| s.is_finite()) {
            Ok(Some(sigmas))
        } else {
            Ok(None)
        }
    }
}

/// Cholesky first; SVD with progressively looser tolerances as a fallback.
fn solve_damped(a: DMatrix<f64>, b: DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let dx = chol.solve(&b);
        if dx.iter().all(|v| v.is_finite()) {
            return Some(dx);
        }
    }
    let svd = a.svd(true, true);
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(dx) = svd.solve(&b, tol) {
            if dx.iter().all(|v| v.is_finite()) {
                return Some(dx);
            }
        }
    }
    None
}

impl LeastSquaresSolver for LevenbergMarquardt {
    fn name(&self) -> &str {
        "levenberg-marquardt"
    }

    fn solve<M: ResponseModel>(
        &self,
        problem: &FitProblem<'_, M>,
        initial: &[f64],
        bounds: &[(f64, f64)],
    ) -> SolveOutcome {
        if problem.dim() == 0 {
            return SolveOutcome::failed(initial, "no free parameters");
        }
        self.minimize(problem, initial, bounds)
            .unwrap_or_else(|e| SolveOutcome::failed(initial, e.to_string()))
    }
}
