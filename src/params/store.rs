//! Name-indexed parameter storage.
//!
//! Names are resolved to stable indices once; everything inside the
//! optimization loops works on indices and value slices.

use super::types::{MoveStats, Parameter, ParameterRow};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// Random-walk coefficients assigned to a parameter at group setup.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepCoefficients {
    pub a0: f64,
    pub a1: f64,
    pub nonnegative: bool,
}

impl StepCoefficients {
    pub fn new(a0: f64, a1: f64, nonnegative: bool) -> Self {
        Self {
            a0,
            a1,
            nonnegative,
        }
    }
}

/// Index-ordered copy of all parameter values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterSnapshot {
    values: Vec<f64>,
}

impl ParameterSnapshot {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Owns every parameter of one refinement.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: Vec<Parameter>,
    values: Vec<f64>,
    index: HashMap<String, usize>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from input table rows, preserving row order.
    pub fn from_rows(rows: &[ParameterRow]) -> Result<Self> {
        let mut store = Self::new();
        for row in rows {
            store.insert(row.to_parameter()?)?;
        }
        Ok(store)
    }

    /// Adds a parameter. Duplicate names are rejected.
    pub fn insert(&mut self, param: Parameter) -> Result<usize> {
        if self.index.contains_key(&param.name) {
            return Err(Error::InvalidTable(format!(
                "duplicate parameter '{}'",
                param.name
            )));
        }
        let idx = self.params.len();
        self.index.insert(param.name.clone(), idx);
        self.values.push(param.value);
        self.params.push(param);
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<f64> {
        Ok(self.values[self.index_of(name)?])
    }

    /// Sets a value by name. No clamping to bounds.
    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        let idx = self.index_of(name)?;
        self.set_value(idx, value);
        Ok(())
    }

    /// # Panics
    /// Panics if `idx` is out of range.
    pub fn value(&self, idx: usize) -> f64 {
        self.values[idx]
    }

    /// # Panics
    /// Panics if `idx` is out of range.
    pub fn set_value(&mut self, idx: usize, value: f64) {
        self.values[idx] = value;
        self.params[idx].value = value;
    }

    /// All values in index order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn param(&self, idx: usize) -> &Parameter {
        &self.params[idx]
    }

    pub(crate) fn param_mut(&mut self, idx: usize) -> &mut Parameter {
        &mut self.params[idx]
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Indices of parameters flagged for fitting, in store order.
    pub fn fit_indices(&self) -> Vec<usize> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.fit)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            values: self.values.clone(),
        }
    }

    /// Restores every value from a snapshot taken on this store.
    pub fn restore(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        self.restore_values(&snapshot.values)
    }

    pub fn restore_values(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(Error::SizeMismatch {
                what: "parameter snapshot",
                expected: self.values.len(),
                actual: values.len(),
            });
        }
        for (idx, &v) in values.iter().enumerate() {
            self.set_value(idx, v);
        }
        Ok(())
    }

    /// Name-keyed view of a snapshot, for the I/O boundary.
    pub fn named(&self, snapshot: &ParameterSnapshot) -> BTreeMap<String, f64> {
        self.params
            .iter()
            .zip(snapshot.values.iter())
            .map(|(p, &v)| (p.name.clone(), v))
            .collect()
    }

    /// Name/value pairs of the current state.
    pub fn named_values(&self) -> Vec<(String, f64)> {
        self.params
            .iter()
            .zip(self.values.iter())
            .map(|(p, &v)| (p.name.clone(), v))
            .collect()
    }

    pub fn set_step_coefficients(&mut self, name: &str, coeffs: StepCoefficients) -> Result<()> {
        let idx = self.index_of(name)?;
        let p = &mut self.params[idx];
        p.step_a0 = coeffs.a0;
        p.step_a1 = coeffs.a1;
        p.nonnegative = coeffs.nonnegative;
        Ok(())
    }

    pub fn reset_move_stats(&mut self) {
        for p in &mut self.params {
            p.stats = MoveStats::default();
        }
    }
}
