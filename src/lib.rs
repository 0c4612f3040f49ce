//! # robustfit-rs
//!
//! `robustfit-rs` fits parametric models to noisy measurement vectors, including
//! data sets that contain outliers.
//!
//! The library provides:
//! - A [`Problem`] trait describing a model `f(x)` and its Jacobian
//! - A Levenberg-Marquardt solver with Cholesky, QR or SVD step solves and
//!   pluggable robust weighting (Tukey, Huber, Cauchy)
//! - A fixed-iteration Gauss-Newton solver
//! - A derivative-free downhill simplex (Nelder-Mead) solver
//! - A generic RANSAC driver for estimators over paired observations
//!
//! All solvers refine a caller-owned parameter vector in place and take small
//! policy objects that decide when to stop ([`Termination`]), how to keep the
//! parameters valid ([`Normalize`]) and how to weight residuals
//! ([`WeightFunction`]). Closures work as any of the three policies.
//!
//! ## Basic Usage
//!
//! ```
//! use ndarray::array;
//! use robustfit_rs::lm::{levenberg_marquardt, DecompositionMethod};
//! use robustfit_rs::policy::{NoNormalize, TerminationCriteria};
//! use robustfit_rs::problem::LinearFunction;
//!
//! let problem = LinearFunction::new(array![[1.0, 1.0], [1.0, 2.0], [1.0, 3.0]]);
//! let measurement = array![3.0, 5.0, 7.0];
//! let mut params = array![0.0, 0.0];
//!
//! let residual = levenberg_marquardt(
//!     &problem,
//!     &mut params,
//!     &measurement,
//!     &TerminationCriteria::new(100, 1e-10),
//!     &NoNormalize,
//!     DecompositionMethod::Cholesky,
//! )
//! .unwrap();
//!
//! assert!(residual < 1e-10);
//! assert!((params[0] - 1.0).abs() < 1e-5);
//! assert!((params[1] - 2.0).abs() < 1e-5);
//! ```

pub mod error;
pub mod gauss_newton;
pub mod lm;
pub mod policy;
pub mod problem;
pub mod ransac;
pub mod simplex;
pub mod utils;

// Re-exports for convenience
pub use error::{FitError, Result};
pub use gauss_newton::gauss_newton;
pub use lm::{
    levenberg_marquardt, weighted_levenberg_marquardt, DecompositionMethod, LevenbergMarquardt,
    LmConfig, LmReport,
};
pub use policy::{
    NoNormalize, NoWeights, Normalize, Termination, TerminationCriteria, TukeyWeight,
    WeightFunction,
};
pub use problem::{LinearFunction, Problem};
pub use ransac::{ransac, Estimator, FnEstimator, Ransac, RansacConfig, RansacFit};
pub use simplex::downhill_simplex;
pub use utils::NumericJacobian;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
