//! Monte Carlo simulated annealing over parameter groups.
//!
//! Each step perturbs every parameter group in a fixed order, scores the
//! proposal by chi-square and keeps or discards it under the Metropolis
//! criterion. The acceptance temperature adapts to the recent acceptance
//! ratio, and the proposal step size adapts to how far the current fit is
//! from the best fit seen so far.
//!
//! # References
//!
//! - Kirkpatrick, Gelatt & Vecchi (1983), "Optimization by Simulated Annealing"
//! - Metropolis et al. (1953), "Equation of State Calculations by Fast
//!   Computing Machines"

mod annealing;
mod config;
mod proposal;
mod runner;

pub use annealing::{AnnealingController, HIGH_ACCEPTANCE, LOW_ACCEPTANCE};
pub use config::{McConfig, DEFAULT_WINDOW_SIZE};
pub use proposal::{Move, Proposal, ProposalGenerator};
pub use runner::{BestState, McResult, McRunner};
