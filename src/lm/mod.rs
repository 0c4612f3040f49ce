//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides the damped least-squares solver used for most fitting
//! problems in this crate. The damping schedule and the linear-solve strategy are
//! configured through [`LmConfig`]; when to stop, how to normalize candidates and
//! how to weight residuals are passed to each call as policy objects.

pub mod algorithm;
pub mod config;
pub mod step;

// Re-export key types
pub use algorithm::{
    levenberg_marquardt, weighted_levenberg_marquardt, IterationRecord, LevenbergMarquardt,
    LmReport,
};
pub use config::{DecompositionMethod, LmConfig};
pub use step::{LmStep, NormalEquations, StepResult};
