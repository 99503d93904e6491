//! Hybrid stochastic/deterministic refinement of instrument-response
//! parameters.
//!
//! Given a parametric response model, observed points with uncertainties
//! and a table of named parameters, the crate searches for the parameter
//! values minimizing chi-square:
//!
//! - **Monte Carlo annealing** ([`mc`]): grouped random-walk proposals,
//!   Metropolis acceptance with a temperature that adapts to the recent
//!   acceptance ratio, and step sizes that shrink as the fit improves.
//! - **Local refinement** ([`local`]): Nelder-Mead and Levenberg-Marquardt
//!   attempts from several seeds, keeping the best converged result.
//! - **Driver** ([`driver`]): table parsing, phase orchestration,
//!   reconciliation and the output report.
//!
//! The bundled model is the thermal neutron d-spacing to time-of-flight
//! conversion ([`model::ThermalNeutronDtoTof`]); any [`model::ResponseModel`]
//! can be refined.
//!
//! # Example
//!
//! ```
//! use u_refine::driver::{RefineConfig, RefinementDriver};
//! use u_refine::model::{ObservedData, ThermalNeutronDtoTof};
//! use u_refine::params::ParameterRow;
//!
//! let ds = vec![1.0758, 0.89198, 0.8186];
//! let tofs: Vec<f64> = ds.iter().map(|d| 5000.0 * d).collect();
//! let data = ObservedData::new(ds, tofs, vec![1.0; 3]).unwrap();
//!
//! let rows = vec![
//!     ParameterRow::new("Zero", 0.0, "t", -100.0, 100.0, 1.0),
//!     ParameterRow::new("Dtt1", 5100.0, "f", 4000.0, 6000.0, 1.0),
//!     ParameterRow::new("Dtt1t", 5100.0, "f", 4000.0, 6000.0, 1.0),
//!     ParameterRow::new("Dtt2t", 0.0, "t", -50.0, 50.0, 1.0),
//!     ParameterRow::new("Zerot", 0.0, "t", -100.0, 100.0, 1.0),
//!     ParameterRow::new("Width", 1.0, "t", 0.0, 10.0, 1.0),
//!     ParameterRow::new("Tcross", 1.0, "t", 0.0, 10.0, 1.0),
//! ];
//!
//! let driver = RefinementDriver::new(
//!     ThermalNeutronDtoTof::new(),
//!     RefineConfig::default().with_max_iterations(200).with_random_seed(7),
//! );
//! let report = driver.run(&data, &rows).unwrap();
//! assert!(report.chi2_result < report.chi2_init);
//! ```

pub mod driver;
pub mod error;
pub mod local;
pub mod mc;
pub mod model;
pub mod params;
pub mod random;

pub use error::{Diagnostic, Error, ErrorKind, Result};
