//! Termination criteria for the iterative solvers.
//!
//! A termination policy is asked once per iteration whether the solver should stop.
//! It sees the iteration counter and two residual measures: the previous (best so
//! far) value and the current one.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Decides when an iterative solver stops.
///
/// Any `Fn(usize, f64, f64) -> bool` closure is a termination policy.
pub trait Termination {
    /// Returns true if the solver should stop after `iteration`.
    fn terminate(&self, iteration: usize, previous: f64, current: f64) -> bool;
}

impl<F> Termination for F
where
    F: Fn(usize, f64, f64) -> bool,
{
    fn terminate(&self, iteration: usize, previous: f64, current: f64) -> bool {
        self(iteration, previous, current)
    }
}

/// Stop after a number of iterations or once the residual change is small
/// relative to the residual itself, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminationCriteria {
    /// Maximum number of iterations; `0` means unlimited. Default: 100
    pub max_iterations: usize,

    /// Stop when `|previous - current| < precision * current`; `0` disables the
    /// check. Default: 1e-8
    pub precision: f64,
}

impl Default for TerminationCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            precision: 1e-8,
        }
    }
}

impl TerminationCriteria {
    /// Creates termination criteria from an iteration limit and a relative precision.
    pub fn new(max_iterations: usize, precision: f64) -> Self {
        Self {
            max_iterations,
            precision,
        }
    }

    /// Run exactly `max_iterations` iterations, ignoring the residual change.
    pub fn iterations(max_iterations: usize) -> Self {
        Self::new(max_iterations, 0.0)
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative precision.
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// Parse criteria from a JSON object such as `{"max_iterations": 50, "precision": 1e-6}`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Termination for TerminationCriteria {
    fn terminate(&self, iteration: usize, previous: f64, current: f64) -> bool {
        (self.max_iterations > 0 && iteration >= self.max_iterations)
            || (self.precision != 0.0 && (previous - current).abs() < self.precision * current)
    }
}
