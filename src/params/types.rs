//! Parameter records and the input table row format.

use crate::error::{Error, Result};

/// Whether the optimizer may vary a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FitOrTie {
    /// Free to vary.
    Fit,
    /// Held at its input value.
    Tie,
}

impl FitOrTie {
    /// Parses the table flag. Accepts `f`/`fit` and `t`/`tie`, any case.
    pub fn parse(text: &str) -> Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "f" | "fit" => Ok(FitOrTie::Fit),
            "t" | "tie" => Ok(FitOrTie::Tie),
            other => Err(Error::InvalidTable(format!(
                "fit/tie flag must be 'f' or 't', got '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FitOrTie::Fit => "f",
            FitOrTie::Tie => "t",
        }
    }
}

/// Direction of the last committed move of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MoveDirection {
    Positive,
    Negative,
    #[default]
    None,
}

/// Random-walk bookkeeping. Diagnostics only.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveStats {
    pub positive: usize,
    pub negative: usize,
    pub no_move: usize,
    pub sum_step: f64,
    pub max_abs_step: f64,
    pub last_direction: MoveDirection,
}

/// A named, bounded scalar parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    /// Step size from the input table.
    pub step: f64,
    /// Additive random-walk coefficient.
    pub step_a0: f64,
    /// Multiplicative random-walk coefficient.
    pub step_a1: f64,
    /// Proposals never leave this parameter negative.
    pub nonnegative: bool,
    pub fit: bool,
    pub stats: MoveStats,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            step: 0.0,
            step_a0: 0.0,
            step_a1: 0.0,
            nonnegative: false,
            fit: false,
            stats: MoveStats::default(),
        }
    }

    pub fn fit_or_tie(&self) -> FitOrTie {
        if self.fit {
            FitOrTie::Fit
        } else {
            FitOrTie::Tie
        }
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

/// One row of the input parameter table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterRow {
    pub name: String,
    pub value: f64,
    pub fit_or_tie: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParameterRow {
    pub fn new(
        name: impl Into<String>,
        value: f64,
        fit_or_tie: impl Into<String>,
        min: f64,
        max: f64,
        step: f64,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            fit_or_tie: fit_or_tie.into(),
            min,
            max,
            step,
        }
    }

    /// Converts the row into a parameter with default random-walk
    /// coefficients (`a0 = step`, `a1 = 0`).
    pub fn to_parameter(&self) -> Result<Parameter> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidTable("empty parameter name".into()));
        }
        if !self.value.is_finite() {
            return Err(Error::InvalidTable(format!(
                "{name}: value must be finite, got {}",
                self.value
            )));
        }
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(Error::InvalidTable(format!(
                "{name}: invalid bounds [{}, {}]",
                self.min, self.max
            )));
        }
        let fit = FitOrTie::parse(&self.fit_or_tie)? == FitOrTie::Fit;

        let mut param = Parameter::new(name, self.value);
        param.min = self.min;
        param.max = self.max;
        param.step = self.step;
        param.step_a0 = self.step;
        param.fit = fit;
        Ok(param)
    }
}
