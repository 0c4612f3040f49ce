//! Problem definition trait and implementations.
//!
//! This module defines the `Problem` trait, which represents a parametric model
//! `f(x)` whose predicted measurement is fitted against an observed measurement
//! vector by the solvers in this crate.

use ndarray::{Array1, Array2};

use crate::error::{check_len, Result};
use crate::utils::finite_difference::{forward_jacobian, DEFAULT_APPROX_WIDTH};

/// A fittable model.
///
/// The solvers never inspect the internal structure of the parameter vector or of
/// the predicted measurement; both are treated as dense real vectors addressable by
/// index. Buffers are allocated by the caller: `result` always has length
/// [`size`](Problem::size) and `jacobian` has shape `size() x params.len()`.
pub trait Problem {
    /// Dimension of the predicted measurement.
    fn size(&self) -> usize;

    /// Compute the predicted measurement `f(params)` into `result`.
    fn evaluate(&self, result: &mut Array1<f64>, params: &Array1<f64>) -> Result<()>;

    /// Compute the predicted measurement together with the Jacobian `∂f/∂x`.
    ///
    /// The default implementation approximates the Jacobian by forward differences,
    /// which costs one extra evaluation per parameter. Problems with an analytic
    /// derivative should override it.
    fn evaluate_with_jacobian(
        &self,
        result: &mut Array1<f64>,
        params: &Array1<f64>,
        jacobian: &mut Array2<f64>,
    ) -> Result<()> {
        forward_jacobian(self, result, params, jacobian, DEFAULT_APPROX_WIDTH)
    }

    /// Compute only the Jacobian at `params`.
    ///
    /// This is used for error propagation, not by the fitting loops.
    fn jacobian(&self, params: &Array1<f64>, jacobian: &mut Array2<f64>) -> Result<()> {
        let mut result = Array1::zeros(self.size());
        self.evaluate_with_jacobian(&mut result, params, jacobian)
    }
}

/// The linear model `f(x) = A·x`.
#[derive(Debug, Clone)]
pub struct LinearFunction {
    matrix: Array2<f64>,
}

impl LinearFunction {
    /// Create a linear function from its coefficient matrix.
    pub fn new(matrix: Array2<f64>) -> Self {
        Self { matrix }
    }

    /// The coefficient matrix `A`.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }
}

impl Problem for LinearFunction {
    fn size(&self) -> usize {
        self.matrix.nrows()
    }

    fn evaluate(&self, result: &mut Array1<f64>, params: &Array1<f64>) -> Result<()> {
        check_len("linear function input", self.matrix.ncols(), params.len())?;
        result.assign(&self.matrix.dot(params));
        Ok(())
    }

    fn evaluate_with_jacobian(
        &self,
        result: &mut Array1<f64>,
        params: &Array1<f64>,
        jacobian: &mut Array2<f64>,
    ) -> Result<()> {
        self.evaluate(result, params)?;
        jacobian.assign(&self.matrix);
        Ok(())
    }
}
