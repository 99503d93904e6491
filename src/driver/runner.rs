//! Top-level refinement orchestration.
//!
//! [`RefinementDriver`] parses the parameter table, runs the Monte Carlo
//! phase, polishes with the local refiner, reconciles the two results and
//! assembles the report.

use super::config::{Algorithm, RefineConfig, StandardErrorMode};
use super::report::{DiagnosticCurve, McSummary, OutputRow, RefinementReport, RefinementStatus};
use crate::error::Result;
use crate::local::LocalRefiner;
use crate::mc::McRunner;
use crate::model::{Objective, ObservedData, ResponseModel};
use crate::params::{ParameterRow, ParameterStore};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Runs the complete refinement for one data set.
///
/// # Usage
///
/// ```ignore
/// let driver = RefinementDriver::new(ThermalNeutronDtoTof::new(), RefineConfig::default());
/// let report = driver.run(&data, &rows)?;
/// println!("{}: {} -> {}", report.status, report.chi2_init, report.chi2_result);
/// ```
#[derive(Debug, Clone)]
pub struct RefinementDriver<M> {
    model: M,
    config: RefineConfig,
}

impl<M: ResponseModel> RefinementDriver<M> {
    pub fn new(model: M, config: RefineConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Refines `table` against `data`.
    ///
    /// Fails only on precondition errors. Convergence problems and
    /// degenerate predictions are reported through the returned status and
    /// diagnostics.
    pub fn run(&self, data: &ObservedData, table: &[ParameterRow]) -> Result<RefinementReport> {
        self.run_with_cancel(data, table, None)
    }

    /// Like [`run`](Self::run), with a cancellation token checked between
    /// Monte Carlo steps. A cancelled run still polishes and reports the
    /// best state found so far.
    pub fn run_with_cancel(
        &self,
        data: &ObservedData,
        table: &[ParameterRow],
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<RefinementReport> {
        let config = &self.config;
        config.validate()?;

        // 1. Parameters and groups
        let mut store = ParameterStore::from_rows(table)?;
        for (name, coeffs) in &config.step_policy {
            if store.index_of(name).is_ok() {
                store.set_step_coefficients(name, *coeffs)?;
            }
        }
        store.reset_move_stats();
        let groups = config.grouping.build(&store)?;

        let data = match config.standard_error {
            StandardErrorMode::ConstantValue(sigma) => data.with_constant_error(sigma),
            StandardErrorMode::UseInputValue => data.clone(),
        };
        let objective = Objective::new(&self.model, data, &store)?;

        let original = store.snapshot();
        let prefit = objective.evaluation(original.values())?;
        let chi2_init = prefit.chi_square.value;
        log::info!(
            "refinement start: {} parameters ({} fit) in {} groups, chi2 = {chi2_init}",
            store.len(),
            store.fit_indices().len(),
            groups.len()
        );

        // 2. Monte Carlo
        let mut diagnostics = Vec::new();
        let (monte_carlo, mc_chi) = match config.algorithm {
            Algorithm::MonteCarlo => {
                let result = McRunner::run_with_cancel(
                    &objective,
                    &mut store,
                    &groups,
                    &config.mc_config(),
                    cancel,
                )?;
                diagnostics.extend(result.diagnostics.iter().cloned());
                let summary = McSummary {
                    best_chi_square: result.best.chi_square,
                    best_step: result.best.step,
                    best_group: result.best.group,
                    iterations: result.iterations,
                    accepted_moves: result.accepted_moves,
                    final_temperature: result.final_temperature,
                    cancelled: result.cancelled,
                };
                (Some(summary), result.best.chi_square)
            }
            Algorithm::OneStepFit => (None, chi2_init),
        };

        // 3. Local refinement
        let local = LocalRefiner::new(config.attempts.clone()).refine(&objective, &store, &original)?;
        diagnostics.extend(local.diagnostics.iter().cloned());

        // 4. Reconcile
        let mut uncertainties = vec![None; store.len()];
        let mut status = match &local.best {
            Some(solution) if solution.chi_square <= mc_chi => {
                store.restore_values(&solution.values)?;
                uncertainties.clone_from(&solution.uncertainties);
                RefinementStatus::LocalAdopted {
                    attempt: solution.attempt,
                    method: local.attempts[solution.attempt].method.to_string(),
                }
            }
            Some(solution) => {
                log::warn!(
                    "local refinement chi2 {} is worse than monte carlo chi2 {mc_chi}; discarded",
                    solution.chi_square
                );
                RefinementStatus::MonteCarloKept {
                    local_discarded: true,
                }
            }
            None if store.snapshot() == original => RefinementStatus::Unchanged,
            None => RefinementStatus::MonteCarloKept {
                local_discarded: false,
            },
        };

        let mut fitted = objective.evaluation(store.values())?;
        let baseline = prefit.chi_square.included;
        if status != RefinementStatus::Unchanged && !fitted.chi_square.score(baseline).is_finite() {
            log::warn!(
                "refined parameters leave {} of {baseline} points degenerate; keeping the start",
                baseline.saturating_sub(fitted.chi_square.included)
            );
            store.restore(&original)?;
            uncertainties = vec![None; store.len()];
            status = RefinementStatus::Unchanged;
            fitted = objective.evaluation(store.values())?;
        }

        // 5. Report
        let chi2_result = fitted.chi_square.value;
        let fit_count = store.fit_indices().len();
        let dof = fitted.chi_square.included.saturating_sub(fit_count).max(1);
        let chi2_per_dof = chi2_result / dof as f64;

        let parameters = store
            .params()
            .iter()
            .zip(uncertainties)
            .map(|(p, uncertainty)| OutputRow {
                name: p.name.clone(),
                value: p.value,
                fit_or_tie: Some(p.fit_or_tie()),
                min: Some(p.min),
                max: Some(p.max),
                step: Some(p.step),
                uncertainty,
            })
            .collect();
        let curve = DiagnosticCurve::new(
            objective.data().xs(),
            objective.data().ys(),
            fitted.predicted,
            prefit.predicted,
        );

        log::info!("refinement done: {status}; chi2 {chi2_init} -> {chi2_result}");
        Ok(RefinementReport {
            parameters,
            chi2_init,
            chi2_result,
            chi2_per_dof,
            curve,
            status,
            monte_carlo,
            local_attempts: local.attempts,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::report::{CHI2_INIT, CHI2_RESULT};
    use crate::error::{Error, ErrorKind};
    use crate::local::{AttemptSeed, LmConfig, LocalMethod, RefinementAttempt};
    use crate::model::ThermalNeutronDtoTof;
    use crate::params::GroupingPolicy;

    const PEAKS: [f64; 3] = [1.0758, 0.89198, 0.8186];

    // (name, true value, lower, upper)
    const TRUTH: [(&str, f64, f64, f64); 7] = [
        ("Zero", 0.0, -100.0, 100.0),
        ("Dtt1", 5000.0, 4000.0, 6000.0),
        ("Dtt1t", 5000.0, 4000.0, 6000.0),
        ("Dtt2t", 0.0, -50.0, 50.0),
        ("Zerot", 0.0, -100.0, 100.0),
        ("Width", 1.0, 0.0, 10.0),
        ("Tcross", 1.0, 0.0, 10.0),
    ];

    fn synthetic(ds: &[f64]) -> ObservedData {
        let ys: Vec<f64> = ds
            .iter()
            .map(|&d| ThermalNeutronDtoTof::tof(d, 5000.0, 5000.0, 0.0, 0.0, 0.0, 1.0, 1.0))
            .collect();
        ObservedData::new(ds.to_vec(), ys, vec![1.0; ds.len()]).unwrap()
    }

    fn table(scale: f64, fit: impl Fn(&str) -> bool) -> Vec<ParameterRow> {
        TRUTH
            .iter()
            .map(|&(name, v, lo, hi)| {
                let flag = if fit(name) { "f" } else { "t" };
                ParameterRow::new(name, v * scale, flag, lo, hi, 1.0)
            })
            .collect()
    }

    #[test]
    fn test_scenario_perturbed_start_drops_chi2_hundredfold() {
        let data = synthetic(&PEAKS);
        let rows = table(1.05, |_| true);
        let config = RefineConfig::default()
            .with_max_iterations(1000)
            .with_random_seed(20240101);
        let report = RefinementDriver::new(ThermalNeutronDtoTof::new(), config)
            .run(&data, &rows)
            .unwrap();

        assert!(report.chi2_init > 1e4, "start chi2 {}", report.chi2_init);
        assert!(
            report.chi2_result * 100.0 <= report.chi2_init,
            "chi2 {} -> {}",
            report.chi2_init,
            report.chi2_result
        );
        let mc = report.monte_carlo.as_ref().unwrap();
        assert_eq!(mc.iterations, 1000);
        assert!(report.chi2_result <= mc.best_chi_square);
    }

    #[test]
    fn test_zero_noise_converges_to_truth() {
        let ds = [1.2, 1.0758, 0.95, 0.89198, 0.8186, 0.7, 0.6];
        let data = synthetic(&ds);
        let rows = table(1.02, |n| n == "Dtt1" || n == "Dtt1t" || n == "Zero");
        let config = RefineConfig::default()
            .with_max_iterations(200)
            .with_random_seed(5);
        let report = RefinementDriver::new(ThermalNeutronDtoTof::new(), config)
            .run(&data, &rows)
            .unwrap();

        assert!(report.chi2_result < 1e-8, "final chi2 {}", report.chi2_result);
        // Tied parameters are reported at their input values.
        assert_eq!(report.parameter("Width").unwrap().value, 1.02);
        assert!(matches!(report.status, RefinementStatus::LocalAdopted { .. }));
    }

    #[test]
    fn test_fixed_seed_runs_are_identical() {
        let data = synthetic(&PEAKS);
        let rows = table(1.05, |_| true);
        let run = || {
            let config = RefineConfig::default()
                .with_max_iterations(200)
                .with_random_seed(77);
            let report = RefinementDriver::new(ThermalNeutronDtoTof::new(), config)
                .run(&data, &rows)
                .unwrap();
            report
                .parameters
                .iter()
                .map(|r| r.value.to_bits())
                .chain([report.chi2_result.to_bits()])
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_one_step_fit_skips_monte_carlo() {
        let data = synthetic(&[1.2, 1.0758, 0.95, 0.89198, 0.8186]);
        let rows = table(1.01, |n| n == "Dtt1" || n == "Dtt1t");
        let config = RefineConfig::default().with_algorithm(Algorithm::OneStepFit);
        let report = RefinementDriver::new(ThermalNeutronDtoTof::new(), config)
            .run(&data, &rows)
            .unwrap();
        assert!(report.monte_carlo.is_none());
        assert!(report.chi2_result < report.chi2_init);
    }

    #[test]
    fn test_total_failure_returns_start() {
        let data = synthetic(&PEAKS);
        let rows = table(1.05, |_| true);
        let capped = LocalMethod::LevenbergMarquardt(LmConfig::default().with_max_iterations(1));
        let config = RefineConfig::default()
            .with_algorithm(Algorithm::OneStepFit)
            .with_attempts(vec![RefinementAttempt::new(capped, AttemptSeed::Original)]);
        let report = RefinementDriver::new(ThermalNeutronDtoTof::new(), config)
            .run(&data, &rows)
            .unwrap();

        assert_eq!(report.status, RefinementStatus::Unchanged);
        assert_eq!(report.chi2_result, report.chi2_init);
        assert!(report.status_message().starts_with("failed"));
        assert_eq!(report.parameter("Dtt1").unwrap().value, 5000.0 * 1.05);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.kind() == ErrorKind::Convergence));
    }

    #[test]
    fn test_output_table_and_curve() {
        let data = synthetic(&PEAKS);
        let rows = table(1.05, |_| true);
        let config = RefineConfig::default().with_max_iterations(50);
        let report = RefinementDriver::new(ThermalNeutronDtoTof::new(), config)
            .run(&data, &rows)
            .unwrap();

        let table = report.table();
        assert_eq!(table.len(), 9);
        assert_eq!(table[7].name, CHI2_INIT);
        assert_eq!(table[7].value, report.chi2_init);
        assert_eq!(table[8].name, CHI2_RESULT);
        assert!(table[8].fit_or_tie.is_none());

        assert_eq!(report.curve.len(), 3);
        for i in 0..3 {
            let expected = report.curve.observed[i] - report.curve.prefit_model[i];
            assert_eq!(report.curve.prefit_residual[i], expected);
        }
        // Three points, seven fit parameters: one degree of freedom floor.
        assert_eq!(report.chi2_per_dof, report.chi2_result);
    }

    #[test]
    fn test_group_with_tied_parameter_is_rejected() {
        let data = synthetic(&PEAKS);
        let rows = table(1.0, |n| n != "Width");
        let config = RefineConfig::default().with_grouping(GroupingPolicy::Explicit(vec![vec![
            "Dtt1".into(),
            "Width".into(),
        ]]));
        let err = RefinementDriver::new(ThermalNeutronDtoTof::new(), config)
            .run(&data, &rows)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGroup { .. }));
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_missing_model_parameter_is_rejected() {
        let data = synthetic(&PEAKS);
        let rows: Vec<ParameterRow> = table(1.0, |_| true)
            .into_iter()
            .filter(|r| r.name != "Tcross")
            .collect();
        let err = RefinementDriver::new(ThermalNeutronDtoTof::new(), RefineConfig::default())
            .run(&data, &rows)
            .unwrap_err();
        assert_eq!(err, Error::UnknownParameter("Tcross".into()));
    }

    #[test]
    fn test_all_tied_is_unchanged() {
        let data = synthetic(&PEAKS);
        let rows = table(1.05, |_| false);
        let report = RefinementDriver::new(ThermalNeutronDtoTof::new(), RefineConfig::default())
            .run(&data, &rows)
            .unwrap();
        assert_eq!(report.status, RefinementStatus::Unchanged);
        assert_eq!(report.chi2_result, report.chi2_init);
        assert_eq!(report.monte_carlo.unwrap().accepted_moves, 0);
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
    fn test_degenerate_region_never_reported_as_fit() {
        let xs = vec![1.0, 2.0, 3.0];
        let ys: Vec<f64> = xs.iter().map(|x| 10.0 * x).collect();
        let data = ObservedData::new(xs, ys, vec![1.0; 3]).unwrap();
        let rows = vec![ParameterRow::new("P", 1.0, "f", 0.0, 100.0, 0.5)];
        let config = RefineConfig::default()
            .with_max_iterations(5000)
            .with_random_seed(42);
        let report = RefinementDriver::new(Cliff, config).run(&data, &rows).unwrap();

        let p = report.parameter("P").unwrap().value;
        assert!(p.is_finite() && p <= 3.0, "P = {p}");
        assert!(report.chi2_result > 0.0);
        assert!(report.chi2_result <= report.chi2_init);
        assert!(report.curve.model.iter().all(|m| m.is_finite()));
        assert!(report.monte_carlo.unwrap().best_chi_square > 0.0);
    }

    #[test]
    fn test_long_noisy_run_stays_finite() {
        let noise = [1.0, -1.0, 1.0];
        let base = synthetic(&PEAKS);
        let ys: Vec<f64> = base.ys().iter().zip(noise).map(|(y, n)| y + n).collect();
        let data = ObservedData::new(PEAKS.to_vec(), ys, vec![1.0; 3]).unwrap();
        let rows = table(1.05, |_| true);
        let config = RefineConfig::default()
            .with_max_iterations(20_000)
            .with_random_seed(42);
        let report = RefinementDriver::new(ThermalNeutronDtoTof::new(), config)
            .run(&data, &rows)
            .unwrap();

        assert!(report.chi2_result.is_finite());
        assert!(report.chi2_result <= report.chi2_init);
        assert!(report.parameters.iter().all(|r| r.value.is_finite()));
        assert!(report.curve.model.iter().all(|m| m.is_finite()));
        let mc = report.monte_carlo.unwrap();
        assert!(mc.best_chi_square > 0.0);
        assert!(mc.final_temperature.is_finite());
    }

    #[test]
    fn test_cancelled_run_still_reports() {
        let data = synthetic(&PEAKS);
        let rows = table(1.05, |_| true);
        let driver = RefinementDriver::new(ThermalNeutronDtoTof::new(), RefineConfig::default());
        let cancel = Arc::new(AtomicBool::new(true));
        let report = driver.run_with_cancel(&data, &rows, Some(cancel)).unwrap();
        assert!(report.monte_carlo.unwrap().cancelled);
        assert!(report.chi2_result <= report.chi2_init);
    }
}
