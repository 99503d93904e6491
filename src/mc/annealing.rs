//! Metropolis acceptance with an adaptive temperature.
//!
//! The controller keeps a rolling window of accept/reject outcomes. When a
//! window closes, a low acceptance ratio doubles the temperature and a high
//! one halves it.

use super::config::DEFAULT_WINDOW_SIZE;
use crate::error::{Error, Result};
use rand::Rng;

/// Below this acceptance ratio the temperature doubles.
pub const LOW_ACCEPTANCE: f64 = 0.2;
/// At or above this acceptance ratio the temperature halves.
pub const HIGH_ACCEPTANCE: f64 = 0.8;

/// Tracks the acceptance window and the current temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnealingController {
    temperature: f64,
    window_size: usize,
    window_accepted: usize,
    window_total: usize,
}

impl AnnealingController {
    pub fn new(temperature: f64) -> Result<Self> {
        Self::with_window(temperature, DEFAULT_WINDOW_SIZE)
    }

    pub fn with_window(temperature: f64, window_size: usize) -> Result<Self> {
        if !(temperature > 0.0) || !temperature.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "temperature must be positive and finite, got {temperature}"
            )));
        }
        if window_size == 0 {
            return Err(Error::InvalidConfig("window_size must be positive".into()));
        }
        Ok(Self {
            temperature,
            window_size,
            window_accepted: 0,
            window_total: 0,
        })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn window(&self) -> (usize, usize) {
        (self.window_accepted, self.window_total)
    }

    /// Metropolis rule. Improvements are always accepted without drawing;
    /// otherwise one uniform draw decides.
    pub fn accept<R: Rng>(&self, new_chi: f64, cur_chi: f64, rng: &mut R) -> bool {
        if new_chi < cur_chi {
            return true;
        }
        let dice: f64 = rng.random_range(0.0..1.0);
        self.accept_with_draw(new_chi, cur_chi, dice)
    }

    /// Metropolis rule against a given uniform draw in `[0, 1)`.
    pub fn accept_with_draw(&self, new_chi: f64, cur_chi: f64, dice: f64) -> bool {
        if new_chi < cur_chi {
            return true;
        }
        if !(cur_chi > 0.0) || !new_chi.is_finite() {
            return false;
        }
        let bar = (-(new_chi - cur_chi) / (cur_chi * self.temperature)).exp();
        dice < bar
    }

    /// Counts one proposal outcome in the current window.
    pub fn record(&mut self, accepted: bool) {
        self.window_total += 1;
        if accepted {
            self.window_accepted += 1;
        }
    }

    /// Closes the window if it holds at least `window_size` proposals.
    /// Returns the new temperature when the window closed.
    pub fn close_window_if_full(&mut self) -> Option<f64> {
        if self.window_total >= self.window_size {
            Some(self.close_window())
        } else {
            None
        }
    }

    /// Adapts the temperature to the window's acceptance ratio and resets
    /// both counters.
    pub fn close_window(&mut self) -> f64 {
        if self.window_total > 0 {
            let ratio = self.window_accepted as f64 / self.window_total as f64;
            if ratio < LOW_ACCEPTANCE {
                // Saturates at f64::MAX.
                self.temperature = (self.temperature * 2.0).min(f64::MAX);
            } else if ratio >= HIGH_ACCEPTANCE {
                self.temperature /= 2.0;
            }
            log::debug!(
                "annealing window {}/{} -> temperature {}",
                self.window_accepted,
                self.window_total,
                self.temperature
            );
        }
        self.window_accepted = 0;
        self.window_total = 0;
        self.temperature
    }
}
