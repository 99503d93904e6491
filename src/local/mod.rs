//! Deterministic least-squares polish.
//!
//! After the stochastic search, [`LocalRefiner`] runs an ordered list of
//! solver attempts (derivative-free [`Simplex`], derivative-based
//! [`LevenbergMarquardt`]) from different starting points and keeps the
//! best converged one.

mod levenberg;
mod refiner;
mod simplex;
mod types;

pub use levenberg::{LevenbergMarquardt, LmConfig};
pub use refiner::{
    AttemptReport, AttemptSeed, LocalMethod, LocalOutcome, LocalRefiner, LocalSolution,
    RefinementAttempt,
};
pub use simplex::{Simplex, SimplexConfig};
pub use types::{clamp_params, FitProblem, LeastSquaresSolver, SolveOutcome};
