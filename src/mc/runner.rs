//! Monte Carlo execution loop.
//!
//! `INIT -> ITERATING -> DONE` with a fixed iteration budget. The best state
//! is threaded through every step as a value and returned at the end; the
//! store is left holding the best snapshot.

use super::annealing::AnnealingController;
use super::config::McConfig;
use super::proposal::ProposalGenerator;
use crate::error::{Diagnostic, Result};
use crate::model::{ChiSquare, Objective, ResponseModel};
use crate::params::{ParameterGroup, ParameterSnapshot, ParameterStore};
use crate::random::create_rng;
use rand::rngs::StdRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lowest chi-square seen so far and where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct BestState {
    pub snapshot: ParameterSnapshot,
    pub chi_square: f64,
    /// Step that produced this state; `0` for the starting state.
    pub step: usize,
    /// Group whose proposal produced this state; `None` for the start.
    pub group: Option<usize>,
}

/// Result of a Monte Carlo run.
#[derive(Debug, Clone)]
pub struct McResult {
    /// Best state found. The store has been restored to it.
    pub best: BestState,

    /// Chi-square of the unperturbed starting state.
    pub start_chi_square: f64,

    /// Steps completed.
    pub iterations: usize,

    /// Proposals evaluated (steps × groups).
    pub proposals: usize,

    /// Accepted proposals, including improvements.
    pub accepted_moves: usize,

    /// Accepted proposals that lowered the current chi-square.
    pub improving_moves: usize,

    /// Temperature after the last step.
    pub final_temperature: f64,

    /// Evaluations with at least one degenerate point.
    pub degenerate_evaluations: usize,

    /// Whether cancelled externally.
    pub cancelled: bool,

    /// Best chi-square after each step; element 0 is the start.
    pub best_history: Vec<f64>,

    /// Recovered conditions worth reporting.
    pub diagnostics: Vec<Diagnostic>,
}

/// Executes the grouped random walk.
pub struct McRunner;

impl McRunner {
    /// Runs the Monte Carlo phase to completion of its iteration budget.
    pub fn run<M: ResponseModel>(
        objective: &Objective<M>,
        store: &mut ParameterStore,
        groups: &[ParameterGroup],
        config: &McConfig,
    ) -> Result<McResult> {
        Self::run_with_cancel(objective, store, groups, config, None)
    }

    /// Runs with an optional cancellation token, checked between steps.
    ///
    /// An uncancelled run is identical to [`McRunner::run`].
    pub fn run_with_cancel<M: ResponseModel>(
        objective: &Objective<M>,
        store: &mut ParameterStore,
        groups: &[ParameterGroup],
        config: &McConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<McResult> {
        config.validate()?;

        // INIT
        let start = objective.chi_square_of(store.values())?;
        let mut walk = Walk {
            objective,
            generator: ProposalGenerator::new(config.damping),
            annealing: AnnealingController::with_window(
                config.initial_temperature,
                config.window_size,
            )?,
            rng: create_rng(config.seed),
            cur_chi: start.value,
            baseline_included: start.included,
            trial: store.values().to_vec(),
            proposals: 0,
            accepted_moves: 0,
            improving_moves: 0,
            degenerate_evaluations: 0,
            diagnostics: Vec::new(),
        };
        walk.note_degeneracy(store, &start);

        let mut best = BestState {
            snapshot: store.snapshot(),
            chi_square: start.value,
            step: 0,
            group: None,
        };
        log::info!(
            "monte carlo start: chi2 = {}, {} groups, {} steps",
            start.value,
            groups.len(),
            config.max_iterations
        );

        // ITERATING
        let mut best_history = Vec::with_capacity(config.max_iterations + 1);
        best_history.push(best.chi_square);
        let mut iterations = 0usize;
        let mut cancelled = false;

        for step in 1..=config.max_iterations {
            if let Some(ref flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    cancelled = true;
                    break;
                }
            }
            best = walk.step(store, groups, step, best)?;
            iterations = step;
            best_history.push(best.chi_square);
        }

        // DONE
        store.restore(&best.snapshot)?;
        log::info!(
            "monte carlo done: best chi2 = {} (step {}), accepted {}/{}",
            best.chi_square,
            best.step,
            walk.accepted_moves,
            walk.proposals
        );

        Ok(McResult {
            start_chi_square: start.value,
            iterations,
            proposals: walk.proposals,
            accepted_moves: walk.accepted_moves,
            improving_moves: walk.improving_moves,
            final_temperature: walk.annealing.temperature(),
            degenerate_evaluations: walk.degenerate_evaluations,
            cancelled,
            best_history,
            diagnostics: walk.diagnostics,
            best,
        })
    }
}

/// Mutable state of the walk other than the best state.
struct Walk<'a, M> {
    objective: &'a Objective<M>,
    generator: ProposalGenerator,
    annealing: AnnealingController,
    rng: StdRng,
    cur_chi: f64,
    /// Points included at INIT. Trials covering fewer are never accepted.
    baseline_included: usize,
    trial: Vec<f64>,
    proposals: usize,
    accepted_moves: usize,
    improving_moves: usize,
    degenerate_evaluations: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<M: ResponseModel> Walk<'_, M> {
    /// One pass over every group in order, then one window update.
    fn step(
        &mut self,
        store: &mut ParameterStore,
        groups: &[ParameterGroup],
        step: usize,
        mut best: BestState,
    ) -> Result<BestState> {
        for (gi, group) in groups.iter().enumerate() {
            let proposal = self.generator.propose(
                store,
                gi,
                group,
                self.cur_chi,
                best.chi_square,
                &mut self.rng,
            );

            self.trial.copy_from_slice(store.values());
            proposal.apply_to(&mut self.trial);
            let chi = self.objective.chi_square_of(&self.trial)?;
            if chi.is_degenerate() {
                let trial = std::mem::take(&mut self.trial);
                self.note_degeneracy_values(store, &trial, &chi);
                self.trial = trial;
            }
            self.proposals += 1;
            let score = chi.score(self.baseline_included);

            let accepted = self.annealing.accept(score, self.cur_chi, &mut self.rng);
            self.annealing.record(accepted);
            self.generator.settle(store, &proposal, accepted);

            if accepted {
                if score < self.cur_chi {
                    self.improving_moves += 1;
                }
                self.accepted_moves += 1;
                self.cur_chi = score;

                if score < best.chi_square {
                    log::debug!("new best chi2 {score} at step {step}, group {gi}");
                    best = BestState {
                        snapshot: store.snapshot(),
                        chi_square: score,
                        step,
                        group: Some(gi),
                    };
                }
            }
        }
        self.annealing.close_window_if_full();
        Ok(best)
    }

    fn note_degeneracy(&mut self, store: &ParameterStore, chi: &ChiSquare) {
        let values = store.values().to_vec();
        self.note_degeneracy_values(store, &values, chi);
    }

    /// Warns on the first degenerate evaluation of the run; later ones are
    /// only counted and logged at debug level.
    fn note_degeneracy_values(&mut self, store: &ParameterStore, values: &[f64], chi: &ChiSquare) {
        let Some(&index) = chi.degenerate.first() else {
            return;
        };
        self.degenerate_evaluations += 1;
        let parameters: Vec<(String, f64)> = store
            .params()
            .iter()
            .zip(values)
            .map(|(p, &v)| (p.name.clone(), v))
            .collect();
        let predicted = self
            .objective
            .evaluate(values)
            .map(|p| p[index])
            .unwrap_or(f64::NAN);
        let diagnostic = Diagnostic::Degeneracy {
            index,
            predicted,
            parameters,
        };
        if self.degenerate_evaluations == 1 {
            log::warn!("{diagnostic}");
            self.diagnostics.push(diagnostic);
        } else {
            log::debug!("{diagnostic}");
        }
    }
}
