//! Grouped random-walk proposals.
//!
//! Step magnitude grows with the current chi-square and shrinks as the
//! best-ever chi-square improves:
//!
//! ```text
//! step = damping * cur_chi * (value * a1 + a0) * u / best_chi,   u ~ U[-1, 1)
//! ```
//!
//! Only the non-negativity flag is enforced on the proposed value (by
//! reflection about zero). Min/max bounds are not applied here.

use crate::params::{MoveDirection, Parameter, ParameterGroup, ParameterStore};
use rand::Rng;

/// One proposed parameter change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub index: usize,
    pub old: f64,
    pub new: f64,
    pub step: f64,
}

/// Candidate values for every member of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub group: usize,
    pub moves: Vec<Move>,
}

impl Proposal {
    /// Writes the proposed values into a full parameter vector.
    pub fn apply_to(&self, values: &mut [f64]) {
        for m in &self.moves {
            values[m.index] = m.new;
        }
    }
}

/// Produces proposals and records their outcome on the parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalGenerator {
    damping: f64,
}

impl ProposalGenerator {
    pub fn new(damping: f64) -> Self {
        Self { damping }
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// Step for `param` given a uniform draw `u`. Zero once the best
    /// chi-square has reached zero.
    pub fn step_size(&self, param: &Parameter, cur_chi: f64, best_chi: f64, u: f64) -> f64 {
        if !(best_chi > 0.0) {
            return 0.0;
        }
        self.damping * cur_chi * (param.value * param.step_a1 + param.step_a0) * u / best_chi
    }

    /// Applies the step and the non-negativity reflection.
    pub fn propose_value(param: &Parameter, step: f64) -> f64 {
        let new = param.value + step;
        if param.nonnegative && new < 0.0 {
            new.abs()
        } else {
            new
        }
    }

    /// Draws one `u` per group member, in group order.
    pub fn propose<R: Rng>(
        &self,
        store: &ParameterStore,
        group_index: usize,
        group: &ParameterGroup,
        cur_chi: f64,
        best_chi: f64,
        rng: &mut R,
    ) -> Proposal {
        let moves = group
            .indices()
            .iter()
            .map(|&index| {
                let param = store.param(index);
                let u: f64 = rng.random_range(-1.0..1.0);
                let step = self.step_size(param, cur_chi, best_chi, u);
                Move {
                    index,
                    old: param.value,
                    new: Self::propose_value(param, step),
                    step,
                }
            })
            .collect();
        Proposal {
            group: group_index,
            moves,
        }
    }

    /// Records the outcome of a proposal and, if accepted, commits it.
    pub fn settle(&self, store: &mut ParameterStore, proposal: &Proposal, accepted: bool) {
        for m in &proposal.moves {
            if accepted {
                store.set_value(m.index, m.new);
            }
            let stats = &mut store.param_mut(m.index).stats;
            stats.sum_step += m.step.abs();
            stats.max_abs_step = stats.max_abs_step.max(m.step.abs());
            let direction = if !accepted || m.new == m.old {
                MoveDirection::None
            } else if m.new > m.old {
                MoveDirection::Positive
            } else {
                MoveDirection::Negative
            };
            match direction {
                MoveDirection::Positive => stats.positive += 1,
                MoveDirection::Negative => stats.negative += 1,
                MoveDirection::None => stats.no_move += 1,
            }
            stats.last_direction = direction;
        }
    }
}
