//! Ordered local least-squares attempts.
//!
//! Each attempt runs one deterministic solver from a configured seed point.
//! Successful attempts compete on chi-square; ties go to the earliest.

use super::levenberg::{LevenbergMarquardt, LmConfig};
use super::simplex::{Simplex, SimplexConfig};
use super::types::{FitProblem, LeastSquaresSolver, SolveOutcome};
use crate::error::{Diagnostic, Result};
use crate::model::{Objective, ResponseModel};
use crate::params::{ParameterSnapshot, ParameterStore};

/// Solver used by one attempt.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LocalMethod {
    Simplex(SimplexConfig),
    LevenbergMarquardt(LmConfig),
}

impl LocalMethod {
    pub fn name(&self) -> &'static str {
        match self {
            LocalMethod::Simplex(_) => "simplex",
            LocalMethod::LevenbergMarquardt(_) => "levenberg-marquardt",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            LocalMethod::Simplex(cfg) => cfg.validate(),
            LocalMethod::LevenbergMarquardt(cfg) => cfg.validate(),
        }
    }

    fn solve<M: ResponseModel>(
        &self,
        problem: &FitProblem<'_, M>,
        initial: &[f64],
        bounds: &[(f64, f64)],
    ) -> SolveOutcome {
        match self {
            LocalMethod::Simplex(cfg) => Simplex::new(cfg.clone()).solve(problem, initial, bounds),
            LocalMethod::LevenbergMarquardt(cfg) => {
                LevenbergMarquardt::new(cfg.clone()).solve(problem, initial, bounds)
            }
        }
    }
}

/// Where an attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttemptSeed {
    /// The store state handed to the refiner (the Monte Carlo best).
    MonteCarloBest,
    /// The previous attempt's solution if it converged, else the Monte
    /// Carlo best.
    Previous,
    /// The values before any optimization.
    Original,
}

/// One configured attempt.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefinementAttempt {
    pub method: LocalMethod,
    pub seed: AttemptSeed,
}

impl RefinementAttempt {
    pub fn new(method: LocalMethod, seed: AttemptSeed) -> Self {
        Self { method, seed }
    }

    /// Simplex from the Monte Carlo best, Levenberg-Marquardt from its
    /// result, Levenberg-Marquardt from the original start.
    pub fn default_sequence() -> Vec<Self> {
        vec![
            Self::new(
                LocalMethod::Simplex(SimplexConfig::default()),
                AttemptSeed::MonteCarloBest,
            ),
            Self::new(
                LocalMethod::LevenbergMarquardt(LmConfig::default()),
                AttemptSeed::Previous,
            ),
            Self::new(
                LocalMethod::LevenbergMarquardt(LmConfig::default()),
                AttemptSeed::Original,
            ),
        ]
    }
}

/// Outcome of one attempt, kept for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    pub method: &'static str,
    pub seed: AttemptSeed,
    pub converged: bool,
    /// Chi-square at the attempt's solution, for converged attempts.
    pub chi_square: Option<f64>,
    pub iterations: u64,
    pub message: String,
}

/// The selected local solution.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSolution {
    /// Index of the winning attempt.
    pub attempt: usize,
    /// Full store vector.
    pub values: Vec<f64>,
    pub chi_square: f64,
    /// Per store index; `None` for fixed parameters or when unavailable.
    pub uncertainties: Vec<Option<f64>>,
}

/// Everything the local phase produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalOutcome {
    /// `None` when every attempt failed.
    pub best: Option<LocalSolution>,
    pub attempts: Vec<AttemptReport>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the configured attempts and selects the best successful one.
#[derive(Debug, Clone)]
pub struct LocalRefiner {
    attempts: Vec<RefinementAttempt>,
}

impl Default for LocalRefiner {
    fn default() -> Self {
        Self::new(RefinementAttempt::default_sequence())
    }
}

impl LocalRefiner {
    pub fn new(attempts: Vec<RefinementAttempt>) -> Self {
        Self { attempts }
    }

    pub fn attempts(&self) -> &[RefinementAttempt] {
        &self.attempts
    }

    /// Refines the fit parameters of `store` (left at the Monte Carlo best).
    /// `original` is the state before any optimization. The store is not
    /// modified.
    pub fn refine<M: ResponseModel>(
        &self,
        objective: &Objective<M>,
        store: &ParameterStore,
        original: &ParameterSnapshot,
    ) -> Result<LocalOutcome> {
        let free = store.fit_indices();
        let steps: Vec<f64> = free.iter().map(|&i| store.param(i).step).collect();
        let bounds: Vec<(f64, f64)> = free.iter().map(|&i| store.param(i).bounds()).collect();
        let problem = FitProblem::new(objective, store.values(), free.clone(), steps)?;

        let baseline_included = objective.chi_square_of(original.values())?.included;
        let mc_best = problem.reduce(store.values());
        let original = problem.reduce(original.values());
        let mut previous: Option<Vec<f64>> = None;

        let mut best: Option<LocalSolution> = None;
        let mut reports = Vec::with_capacity(self.attempts.len());
        let mut diagnostics = Vec::new();

        for (k, attempt) in self.attempts.iter().enumerate() {
            let start = match attempt.seed {
                AttemptSeed::MonteCarloBest => &mc_best,
                AttemptSeed::Original => &original,
                AttemptSeed::Previous => previous.as_ref().unwrap_or(&mc_best),
            };
            let outcome = attempt.method.solve(&problem, start, &bounds);

            let mut message = outcome.message.clone();
            let chi = if outcome.converged {
                let full = problem.expand(&outcome.solution);
                let chi = objective.chi_square_of(&full)?.score(baseline_included);
                if chi.is_finite() {
                    Some((full, chi))
                } else {
                    message = format!("{message}; solution has degenerate or non-finite chi2");
                    None
                }
            } else {
                None
            };

            reports.push(AttemptReport {
                method: attempt.method.name(),
                seed: attempt.seed,
                converged: chi.is_some(),
                chi_square: chi.as_ref().map(|(_, c)| *c),
                iterations: outcome.iterations,
                message: message.clone(),
            });

            let Some((full, chi)) = chi else {
                let diagnostic = Diagnostic::Convergence {
                    attempt: k,
                    method: attempt.method.name().to_string(),
                    reason: message,
                };
                log::warn!("local refinement {diagnostic}");
                diagnostics.push(diagnostic);
                previous = None;
                continue;
            };
            log::info!(
                "local refinement attempt {k} ({}) converged: chi2 = {chi}",
                attempt.method.name()
            );

            if best.as_ref().is_none_or(|b| chi < b.chi_square) {
                let mut uncertainties = vec![None; store.len()];
                if let Some(sigmas) = &outcome.uncertainties {
                    for (&i, &s) in free.iter().zip(sigmas) {
                        uncertainties[i] = Some(s);
                    }
                }
                best = Some(LocalSolution {
                    attempt: k,
                    values: full,
                    chi_square: chi,
                    uncertainties,
                });
            }
            previous = Some(outcome.solution);
        }

        if best.is_none() && !self.attempts.is_empty() {
            log::warn!("every local refinement attempt failed; no improvement available");
        }

        Ok(LocalOutcome {
            best,
            attempts: reports,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObservedData;
    use crate::params::ParameterRow;
    use approx::assert_abs_diff_eq;

    #[derive(Debug)]
    struct Line;

    impl ResponseModel for Line {
        fn parameter_names(&self) -> &[&str] {
            &["A", "B"]
        }

        fn evaluate(&self, params: &[f64], xs: &[f64], out: &mut [f64]) {
            for (y, &x) in out.iter_mut().zip(xs) {
                *y = params[0] + params[1] * x;
            }
        }
    }

    fn setup() -> (Objective<Line>, ParameterStore) {
        let xs: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 1.0 + 3.0 * x).collect();
        let data = ObservedData::new(xs, ys, vec![0.5; 6]).unwrap();
        let store = ParameterStore::from_rows(&[
            ParameterRow::new("A", 0.0, "f", -50.0, 50.0, 0.5),
            ParameterRow::new("B", 1.0, "f", -50.0, 50.0, 0.5),
        ])
        .unwrap();
        let objective = Objective::new(Line, data, &store).unwrap();
        (objective, store)
    }

    #[test]
    fn test_default_sequence_reaches_minimum() {
        let (objective, store) = setup();
        let original = store.snapshot();
        let out = LocalRefiner::default()
            .refine(&objective, &store, &original)
            .unwrap();
        let best = out.best.expect("a converged attempt");
        assert_abs_diff_eq!(best.values[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(best.values[1], 3.0, epsilon = 1e-6);
        assert_eq!(out.attempts.len(), 3);
    }

    #[test]
    fn test_rerun_from_converged_output_is_stable() {
        let (objective, mut store) = setup();
        let original = store.snapshot();
        let refiner = LocalRefiner::default();
        let first = refiner.refine(&objective, &store, &original).unwrap().best.unwrap();

        store.restore_values(&first.values).unwrap();
        let converged = store.snapshot();
        let second = refiner.refine(&objective, &store, &converged).unwrap().best.unwrap();
        assert_abs_diff_eq!(second.chi_square, first.chi_square, epsilon = 1e-9);
    }

    #[test]
    fn test_ties_favor_earliest_attempt() {
        let (objective, store) = setup();
        let original = store.snapshot();
        let lm = LocalMethod::LevenbergMarquardt(LmConfig::default());
        let refiner = LocalRefiner::new(vec![
            RefinementAttempt::new(lm.clone(), AttemptSeed::MonteCarloBest),
            RefinementAttempt::new(lm, AttemptSeed::MonteCarloBest),
        ]);
        let out = refiner.refine(&objective, &store, &original).unwrap();
        assert_eq!(out.attempts[0].chi_square, out.attempts[1].chi_square);
        assert_eq!(out.best.unwrap().attempt, 0);
    }

    #[test]
    fn test_all_attempts_failing_reports_no_improvement() {
        let (objective, store) = setup();
        let original = store.snapshot();
        let capped = LocalMethod::LevenbergMarquardt(LmConfig::default().with_max_iterations(1));
        let refiner = LocalRefiner::new(vec![
            RefinementAttempt::new(capped.clone(), AttemptSeed::MonteCarloBest),
            RefinementAttempt::new(capped, AttemptSeed::Original),
        ]);
        let out = refiner.refine(&objective, &store, &original).unwrap();
        assert!(out.best.is_none());
        assert_eq!(out.diagnostics.len(), 2);
        assert!(out.attempts.iter().all(|a| !a.converged));
    }

    /// `y = p * x`, undefined at every point once `p > 3`.
    #[derive(Debug)]
    struct Cliff;

    impl ResponseModel for Cliff {
        fn parameter_names(&self) -> &[&str] {
            &["P"]
        }

        fn evaluate(&self, params: &[f64], xs: &[f64], out: &mut [f64]) {
            for (y, &x) in out.iter_mut().zip(xs) {
                *y = if params[0] > 3.0 { f64::NAN } else { params[0] * x };
            }
        }
    }

    #[test]
    fn test_degenerate_solution_never_selected() {
        let xs = vec![1.0, 2.0, 3.0];
        let ys: Vec<f64> = xs.iter().map(|x| 10.0 * x).collect();
        let data = ObservedData::new(xs, ys, vec![1.0; 3]).unwrap();
        let store =
            ParameterStore::from_rows(&[ParameterRow::new("P", 1.0, "f", 0.0, 100.0, 1.0)])
                .unwrap();
        let objective = Objective::new(Cliff, data, &store).unwrap();
        let original = store.snapshot();

        let out = LocalRefiner::default()
            .refine(&objective, &store, &original)
            .unwrap();
        for attempt in &out.attempts {
            if let Some(chi) = attempt.chi_square {
                assert!(chi.is_finite() && chi > 0.0, "attempt chi2 {chi}");
            }
        }
        if let Some(best) = out.best {
            assert!(best.values[0] <= 3.0);
            assert!(best.chi_square > 0.0);
        }
    }

    #[test]
    fn test_fixed_parameters_stay_put() {
        let (objective, _) = setup();
        let store = ParameterStore::from_rows(&[
            ParameterRow::new("A", 1.0, "t", -50.0, 50.0, 0.5),
            ParameterRow::new("B", 1.0, "f", -50.0, 50.0, 0.5),
        ])
        .unwrap();
        let original = store.snapshot();
        let out = LocalRefiner::default()
            .refine(&objective, &store, &original)
            .unwrap();
        let best = out.best.unwrap();
        assert_eq!(best.values[0], 1.0);
        assert_abs_diff_eq!(best.values[1], 3.0, epsilon = 1e-6);
        assert_eq!(best.uncertainties[0], None);
    }
}
