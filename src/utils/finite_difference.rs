//! Finite difference methods for numerical differentiation.
//!
//! This module provides the forward-difference Jacobian used by the default
//! [`Problem::evaluate_with_jacobian`] and the [`NumericJacobian`] adapter for
//! problems that only know how to evaluate themselves.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::problem::Problem;

/// Default differencing width, relative to the magnitude of each parameter.
pub const DEFAULT_APPROX_WIDTH: f64 = 1e-3;

/// Compute `f(params)` and its Jacobian using forward finite differences.
///
/// Column `j` of the Jacobian is `(f(x + h_j e_j) - f(x)) / h_j` with
/// `h_j = width * x_j`, or `h_j = width` when `x_j == 0`.
///
/// Fails with [`FitError::FunctionEvaluation`] if some `h_j` underflows to zero or
/// is not finite.
///
/// # Arguments
///
/// * `problem` - The problem to differentiate
/// * `result` - Receives `f(params)`
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `jacobian` - Receives the `size() x params.len()` Jacobian
/// * `width` - The relative differencing width
pub fn forward_jacobian<P: Problem + ?Sized>(
    problem: &P,
    result: &mut Array1<f64>,
    params: &Array1<f64>,
    jacobian: &mut Array2<f64>,
    width: f64,
) -> Result<()> {
    let n_results = problem.size();
    let n_params = params.len();
    if jacobian.dim() != (n_results, n_params) {
        return Err(FitError::DimensionMismatch(format!(
            "Expected a {}x{} Jacobian, got {}x{}",
            n_results,
            n_params,
            jacobian.nrows(),
            jacobian.ncols()
        )));
    }

    problem.evaluate(result, params)?;

    let mut perturbed = params.clone();
    let mut perturbed_result = Array1::zeros(n_results);
    for j in 0..n_params {
        let h = if params[j] != 0.0 {
            params[j] * width
        } else {
            width
        };
        if h == 0.0 || !h.is_finite() {
            return Err(FitError::FunctionEvaluation(format!(
                "no usable difference step for parameter {} = {}",
                j, params[j]
            )));
        }

        perturbed[j] = params[j] + h;
        problem.evaluate(&mut perturbed_result, &perturbed)?;

        let mut column = jacobian.column_mut(j);
        column.assign(&((&perturbed_result - &*result) / h));

        perturbed[j] = params[j];
    }

    Ok(())
}

/// Adapter that supplies a numerically approximated Jacobian to a problem that
/// only implements [`Problem::evaluate`].
///
/// Each Jacobian costs one evaluation per parameter in addition to the
/// evaluation at the point itself.
#[derive(Debug, Clone)]
pub struct NumericJacobian<P> {
    inner: P,
    width: f64,
}

impl<P: Problem> NumericJacobian<P> {
    /// Wrap a problem using the default differencing width.
    pub fn new(inner: P) -> Self {
        Self::with_width(inner, DEFAULT_APPROX_WIDTH)
    }

    /// Wrap a problem, differencing at `width * |x_j|` (or `width` for zero entries).
    pub fn with_width(inner: P, width: f64) -> Self {
        Self { inner, width }
    }

    /// The wrapped problem.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Problem> Problem for NumericJacobian<P> {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn evaluate(&self, result: &mut Array1<f64>, params: &Array1<f64>) -> Result<()> {
        self.inner.evaluate(result, params)
    }

    fn evaluate_with_jacobian(
        &self,
        result: &mut Array1<f64>,
        params: &Array1<f64>,
        jacobian: &mut Array2<f64>,
    ) -> Result<()> {
        forward_jacobian(&self.inner, result, params, jacobian, self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// f(x, y) = [x², x·y, sin(y)]
    struct Curvy;

    impl Problem for Curvy {
        fn size(&self) -> usize {
            3
        }

        fn evaluate(&self, result: &mut Array1<f64>, params: &Array1<f64>) -> Result<()> {
            let (x, y) = (params[0], params[1]);
            result[0] = x * x;
            result[1] = x * y;
            result[2] = y.sin();
            Ok(())
        }
    }

    #[test]
    fn test_forward_jacobian_accuracy() {
        let params = array![1.5, 0.3];
        let mut result = Array1::zeros(3);
        let mut jac = Array2::zeros((3, 2));
        forward_jacobian(&Curvy, &mut result, &params, &mut jac, 1e-6).unwrap();

        assert_relative_eq!(result[1], 0.45, epsilon = 1e-12);
        assert_relative_eq!(jac[[0, 0]], 3.0, epsilon = 1e-5);
        assert_relative_eq!(jac[[0, 1]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(jac[[1, 0]], 0.3, epsilon = 1e-5);
        assert_relative_eq!(jac[[1, 1]], 1.5, epsilon = 1e-5);
        assert_relative_eq!(jac[[2, 1]], 0.3_f64.cos(), epsilon = 1e-5);
    }

    #[test]
    fn test_zero_parameter_uses_absolute_width() {
        let params = array![0.0, 0.0];
        let mut result = Array1::zeros(3);
        let mut jac = Array2::zeros((3, 2));
        forward_jacobian(&Curvy, &mut result, &params, &mut jac, 1e-7).unwrap();

        assert!(jac.iter().all(|v| v.is_finite()));
        assert_relative_eq!(jac[[2, 1]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_wrong_jacobian_shape() {
        let mut result = Array1::zeros(3);
        let mut jac = Array2::zeros((2, 2));
        let err = forward_jacobian(&Curvy, &mut result, &array![1.0, 1.0], &mut jac, 1e-6);
        assert!(matches!(err, Err(FitError::DimensionMismatch(_))));
    }

    #[test]
    fn test_unusable_step() {
        let mut result = Array1::zeros(3);
        let mut jac = Array2::zeros((3, 2));
        // 1e-320 * 1e-6 underflows to zero
        let err = forward_jacobian(&Curvy, &mut result, &array![1e-320, 1.0], &mut jac, 1e-6);
        assert!(matches!(err, Err(FitError::FunctionEvaluation(_))));

        let err = forward_jacobian(&Curvy, &mut result, &array![1.0, f64::INFINITY], &mut jac, 1e-6);
        assert!(matches!(err, Err(FitError::FunctionEvaluation(_))));
    }

    #[test]
    fn test_numeric_jacobian_wrapper() {
        let wrapped = NumericJacobian::with_width(Curvy, 1e-6);
        let mut jac = Array2::zeros((3, 2));
        wrapped.jacobian(&array![2.0, 1.0], &mut jac).unwrap();

        assert_eq!(wrapped.size(), 3);
        assert_relative_eq!(jac[[0, 0]], 4.0, epsilon = 1e-4);
        assert_relative_eq!(jac[[1, 1]], 2.0, epsilon = 1e-4);
    }
}
