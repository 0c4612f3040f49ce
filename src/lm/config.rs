//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! This module defines the damping schedule and the linear-solve strategy used by
//! [`LevenbergMarquardt`](super::LevenbergMarquardt). When to stop is not part of
//! the configuration; it is decided by the termination policy passed to each call.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Method for solving the damped normal equations in each Levenberg-Marquardt step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecompositionMethod {
    /// Cholesky decomposition. Fastest, but requires a positive definite matrix;
    /// when the factorization fails the solver switches to SVD for the rest of the run.
    #[default]
    Cholesky,

    /// QR decomposition. A failure is fatal.
    QR,

    /// SVD decomposition. Slowest but most stable, reports the effective rank.
    /// A failure is fatal.
    SVD,
}

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Initial value for the damping parameter. Default: 1.0
    pub initial_lambda: f64,

    /// Factor by which lambda is divided after an accepted step and multiplied after
    /// a rejected one. Default: 10.0
    pub lambda_factor: f64,

    /// Lower bound for lambda. Default: 1e-200
    pub min_lambda: f64,

    /// Upper bound for lambda. Default: 1e200
    pub max_lambda: f64,

    /// Method used to solve the damped normal equations. Default: Cholesky
    pub decomposition_method: DecompositionMethod,

    /// Whether to record one [`IterationRecord`](super::IterationRecord) per
    /// iteration in the report. Default: false
    pub record_trace: bool,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            initial_lambda: 1.0,
            lambda_factor: 10.0,
            min_lambda: 1e-200,
            max_lambda: 1e200,
            decomposition_method: DecompositionMethod::default(),
            record_trace: false,
        }
    }
}

impl LmConfig {
    /// Parse a configuration from JSON. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
