//! Derivative-free Nelder-Mead polish.
//!
//! Thin wrapper around argmin's Nelder-Mead. Bounds are honored by clamping
//! every vertex before it is scored and clamping the reported best point.

use super::types::{bounded_offset, clamp_params, FitProblem, LeastSquaresSolver, SolveOutcome};
use crate::error::{Error, Result};
use crate::model::ResponseModel;
use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;

/// Nelder-Mead options.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimplexConfig {
    pub max_iterations: u64,
    /// Converged once the standard deviation of vertex costs drops below this.
    pub sd_tolerance: f64,
    /// Relative vertex offset used when a parameter has no table step.
    pub relative_offset: f64,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            sd_tolerance: 1e-10,
            relative_offset: 0.05,
        }
    }
}

impl SimplexConfig {
    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_sd_tolerance(mut self, tol: f64) -> Self {
        self.sd_tolerance = tol;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "simplex max_iterations must be positive".into(),
            ));
        }
        if !(self.sd_tolerance >= 0.0) || !(self.relative_offset > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "simplex sd_tolerance must be non-negative and relative_offset positive, got {} and {}",
                self.sd_tolerance, self.relative_offset
            )));
        }
        Ok(())
    }
}

/// Nelder-Mead solver.
#[derive(Debug, Clone, Default)]
pub struct Simplex {
    config: SimplexConfig,
}

impl Simplex {
    pub fn new(config: SimplexConfig) -> Self {
        Self { config }
    }

    /// `n + 1` vertices: the start plus one offset along each axis, kept
    /// inside both bounds.
    fn initial_simplex(&self, x0: &[f64], steps: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let mut vertices = Vec::with_capacity(x0.len() + 1);
        vertices.push(x0.to_vec());
        for i in 0..x0.len() {
            let delta = if steps[i] > 0.0 {
                steps[i]
            } else if x0[i] != 0.0 {
                self.config.relative_offset * x0[i].abs()
            } else {
                2.5e-4
            };
            let mut v = x0.to_vec();
            v[i] = x0[i] + bounded_offset(x0[i], delta, bounds[i]);
            vertices.push(v);
        }
        vertices
    }
}

struct SimplexCost<'a, 'b, M> {
    problem: &'a FitProblem<'b, M>,
    bounds: &'a [(f64, f64)],
}

impl<M: ResponseModel> CostFunction for SimplexCost<'_, '_, M> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let clamped = clamp_params(params, self.bounds);
        self.problem
            .cost(&clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl LeastSquaresSolver for Simplex {
    fn name(&self) -> &str {
        "simplex"
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
        let x0 = clamp_params(initial, bounds);
        let vertices = self.initial_simplex(&x0, problem.steps(), bounds);

        let solver = match NelderMead::new(vertices).with_sd_tolerance(self.config.sd_tolerance) {
            Ok(s) => s,
            Err(e) => return SolveOutcome::failed(&x0, format!("invalid simplex options: {e}")),
        };
        let cost = SimplexCost { problem, bounds };
        let res = match Executor::new(cost, solver)
            .configure(|state| state.max_iters(self.config.max_iterations))
            .run()
        {
            Ok(res) => res,
            Err(e) => return SolveOutcome::failed(&x0, format!("simplex aborted: {e}")),
        };

        let state = res.state();
        let Some(best) = state.get_best_param() else {
            return SolveOutcome::failed(&x0, "simplex produced no best point");
        };
        let solution = clamp_params(best, bounds);
        let final_cost = match problem.cost(&solution) {
            Ok(c) => c,
            Err(e) => return SolveOutcome::failed(&x0, e.to_string()),
        };
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        SolveOutcome {
            solution,
            converged,
            final_cost,
            uncertainties: None,
            iterations: state.get_iter(),
            message: termination.to_string(),
        }
    }
}
