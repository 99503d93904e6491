//! Jointly perturbed parameter groups.

use super::store::ParameterStore;
use crate::error::{Error, Result};

/// How fit parameters are partitioned into groups.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupingPolicy {
    /// Every fit parameter in one group, in table order.
    #[default]
    SingleGroup,
    /// One group per fit parameter, in table order.
    Individual,
    /// Explicit groups by name, processed in the given order.
    Explicit(Vec<Vec<String>>),
}

impl GroupingPolicy {
    /// Builds validated groups against `store`.
    pub fn build(&self, store: &ParameterStore) -> Result<Vec<ParameterGroup>> {
        let fit_names = || {
            store
                .fit_indices()
                .into_iter()
                .map(|i| store.param(i).name.clone())
        };
        match self {
            GroupingPolicy::SingleGroup => {
                let names: Vec<String> = fit_names().collect();
                if names.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![ParameterGroup::new(store, 0, &names)?])
            }
            GroupingPolicy::Individual => fit_names()
                .enumerate()
                .map(|(g, name)| ParameterGroup::new(store, g, &[name]))
                .collect(),
            GroupingPolicy::Explicit(groups) => groups
                .iter()
                .enumerate()
                .map(|(g, names)| ParameterGroup::new(store, g, names))
                .collect(),
        }
    }
}

/// Ordered set of parameters perturbed together in one proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGroup {
    indices: Vec<usize>,
    names: Vec<String>,
}

impl ParameterGroup {
    /// Resolves `names` against `store`. Each member must exist, be a fit
    /// parameter and appear only once. `group` is used in error messages.
    pub fn new<S: AsRef<str>>(store: &ParameterStore, group: usize, names: &[S]) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::InvalidGroup {
                group,
                reason: "group is empty".into(),
            });
        }
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let idx = store.index_of(name).map_err(|_| Error::InvalidGroup {
                group,
                reason: format!("unknown parameter '{name}'"),
            })?;
            if !store.param(idx).fit {
                return Err(Error::InvalidGroup {
                    group,
                    reason: format!("parameter '{name}' is not flagged for fitting"),
                });
            }
            if indices.contains(&idx) {
                return Err(Error::InvalidGroup {
                    group,
                    reason: format!("parameter '{name}' listed twice"),
                });
            }
            indices.push(idx);
        }
        Ok(Self {
            indices,
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
        })
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
