//! Undamped Gauss-Newton iterations.
//!
//! Each iteration evaluates the problem and its Jacobian, solves the normal
//! equations `JᵗJ Δx = Jᵗr` with a QR decomposition, applies `x += Δx`
//! unconditionally and normalizes. There is no step control and no termination
//! policy: the caller chooses the number of iterations, which makes the cost of a
//! call fixed. Use [`LevenbergMarquardt`](crate::lm::LevenbergMarquardt) when the
//! starting point may be far from the solution.

use ndarray::{Array1, Array2};
use tracing::{debug, trace};

use crate::error::{check_len, FitError, Result};
use crate::lm::{LmStep, NormalEquations};
use crate::policy::Normalize;
use crate::problem::Problem;

/// Run `iterations` Gauss-Newton steps on `params`.
///
/// # Errors
///
/// * `FitError::DimensionMismatch` if the measurement length does not match the
///   problem or the system is under-determined
/// * `FitError::SingularMatrix` if `JᵗJ` is singular
pub fn gauss_newton<P, N>(
    problem: &P,
    params: &mut Array1<f64>,
    measurement: &Array1<f64>,
    iterations: usize,
    normalize: &N,
) -> Result<()>
where
    P: Problem + ?Sized,
    N: Normalize + ?Sized,
{
    let n_meas = measurement.len();
    let n_params = params.len();
    check_len("measurement", problem.size(), n_meas)?;
    if n_params == 0 {
        return Err(FitError::InvalidInput("parameter vector is empty".to_string()));
    }
    if n_params > n_meas {
        return Err(FitError::DimensionMismatch(format!(
            "under-determined system: {} parameters but {} measurements",
            n_params, n_meas
        )));
    }

    let mut estimate = Array1::zeros(n_meas);
    let mut jacobian = Array2::zeros((n_meas, n_params));
    debug!(params = ?params.as_slice(), "Gauss-Newton entry params");

    for i in 0..iterations {
        problem.evaluate_with_jacobian(&mut estimate, params, &mut jacobian)?;
        let residual = measurement - &estimate;
        debug!(iteration = i, residual = residual.dot(&residual), "Gauss-Newton residual");

        let normal = NormalEquations::new(&jacobian, &residual)?;
        let step = LmStep::solve_qr(normal.jtj, &normal.jtr)?;
        for (p, d) in params.iter_mut().zip(step.iter()) {
            *p += d;
        }
        trace!(params = ?params.as_slice(), "Gauss-Newton params");

        normalize.normalize(params);
    }

    Ok(())
}
