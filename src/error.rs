//! Error taxonomy.
//!
//! Fatal conditions are returned as [`Error`] and abort the call that hit
//! them. Recoverable conditions never abort a refinement: they are collected
//! as [`Diagnostic`] values and surfaced through logging and the final report.

use thiserror::Error;

/// Severity class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Bad input or configuration. Fatal, not retried.
    Precondition,
    /// A model prediction was NaN or out of range. Recovered per point.
    Degeneracy,
    /// A local least-squares attempt did not converge. Recovered per attempt.
    Convergence,
}

/// Fatal refinement error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A parameter name is not present in the store.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// Two arrays that must have equal length do not.
    #[error("size mismatch in {what}: expected {expected}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// No observed data points were supplied.
    #[error("observed data is empty")]
    EmptyData,

    /// An option is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A parameter group references an unknown or non-fit parameter.
    #[error("invalid parameter group {group}: {reason}")]
    InvalidGroup { group: usize, reason: String },

    /// The input parameter table is malformed.
    #[error("invalid parameter table: {0}")]
    InvalidTable(String),
}

impl Error {
    /// Every fatal error is a precondition failure.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Precondition
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A recovered, non-fatal condition observed during a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Diagnostic {
    /// The model produced a non-finite value at `index` for `parameters`.
    Degeneracy {
        index: usize,
        predicted: f64,
        parameters: Vec<(String, f64)>,
    },

    /// A local refinement attempt failed softly.
    Convergence {
        attempt: usize,
        method: String,
        reason: String,
    },
}

impl Diagnostic {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Diagnostic::Degeneracy { .. } => ErrorKind::Degeneracy,
            Diagnostic::Convergence { .. } => ErrorKind::Convergence,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::Degeneracy {
                index,
                predicted,
                parameters,
            } => {
                write!(f, "degenerate prediction {predicted} at index {index} for [")?;
                for (i, (name, value)) in parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                write!(f, "]")
            }
            Diagnostic::Convergence {
                attempt,
                method,
                reason,
            } => write!(f, "attempt {attempt} ({method}) failed: {reason}"),
        }
    }
}
