//! Parameter storage and grouping.
//!
//! [`ParameterStore`] holds the named, bounded, flagged scalars that the
//! refinement varies. [`ParameterGroup`] lists the parameters that one
//! random-walk proposal perturbs together.

mod group;
mod store;
mod types;

pub use group::{GroupingPolicy, ParameterGroup};
pub use store::{ParameterSnapshot, ParameterStore, StepCoefficients};
pub use types::{FitOrTie, MoveDirection, MoveStats, Parameter, ParameterRow};
