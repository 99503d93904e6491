//! End-to-end refinement.
//!
//! [`RefinementDriver`] takes a parameter table and observed data, runs the
//! Monte Carlo search and the local polish, and returns a
//! [`RefinementReport`] with the refined table, chi-square before and after,
//! and a diagnostic curve.

mod config;
mod report;
mod runner;

pub use config::{thermal_neutron_steps, Algorithm, RefineConfig, StandardErrorMode};
pub use report::{
    zscore, DiagnosticCurve, McSummary, OutputRow, RefinementReport, RefinementStatus, CHI2_INIT,
    CHI2_RESULT,
};
pub use runner::RefinementDriver;
