//! Response models and the chi-square objective.
//!
//! A [`ResponseModel`] maps parameter values and abscissae to predictions.
//! [`Objective`] binds a model to a parameter store layout and observed data
//! and scores parameter vectors by uncertainty-weighted chi-square.

mod objective;
mod thermal;
mod types;

pub use objective::{
    chi_square, chi_square_terms, ChiSquare, Evaluation, Objective, ObservedData, SIGMA_EPSILON,
};
pub use thermal::ThermalNeutronDtoTof;
pub use types::ResponseModel;
