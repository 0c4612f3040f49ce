//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! The driver fits a [`Problem`] to a measurement vector by repeatedly solving the
//! damped normal equations `(JᵗJ + λI) Δx = Jᵗr`. A candidate step is accepted only
//! if it lowers the (optionally weighted) squared residual norm; the damping
//! parameter is divided by the damping factor after an accepted step and multiplied
//! by it after a rejected one. A rejected step reuses the cached Jacobian and
//! residual, so the problem is evaluated exactly once per iteration.

use ndarray::{Array1, Array2};
use std::fmt;
use tracing::{debug, trace};

use crate::error::{check_len, FitError, Result};
use crate::policy::{NoWeights, Normalize, Termination, WeightFunction};
use crate::problem::Problem;

use super::config::{DecompositionMethod, LmConfig};
use super::step::{LmStep, NormalEquations};

/// One iteration of a Levenberg-Marquardt run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationRecord {
    /// Iteration number, starting at 1
    pub iteration: usize,

    /// Damping parameter used to compute the step of this iteration
    pub lambda: f64,

    /// Squared residual norm at the candidate parameters
    pub residual_norm_sq: f64,

    /// Whether the candidate was accepted
    pub accepted: bool,
}

/// Result of a Levenberg-Marquardt run.
///
/// The fitted parameters are written back into the caller's parameter vector;
/// the report only describes how the run went.
#[derive(Debug, Clone)]
pub struct LmReport {
    /// Squared residual norm at the returned parameters
    pub residual_norm_sq: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of accepted steps
    pub accepted_steps: usize,

    /// Number of rejected steps
    pub rejected_steps: usize,

    /// Damping parameter at the end of the run
    pub lambda: f64,

    /// Decomposition method in use at the end of the run. This differs from the
    /// configured method if a Cholesky factorization failed.
    pub decomposition_method: DecompositionMethod,

    /// Effective rank reported by the last SVD solve, if any
    pub rank: Option<usize>,

    /// Per-iteration trace, empty unless `record_trace` is set
    pub trace: Vec<IterationRecord>,
}

impl fmt::Display for LmReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Levenberg-Marquardt Result:")?;
        writeln!(f, "  Residual norm²: {:.6e}", self.residual_norm_sq)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(
            f,
            "  Steps: {} accepted, {} rejected",
            self.accepted_steps, self.rejected_steps
        )?;
        writeln!(f, "  Final lambda: {:.3e}", self.lambda)?;
        writeln!(f, "  Solver: {:?}", self.decomposition_method)?;
        if let Some(rank) = self.rank {
            writeln!(f, "  Effective rank: {}", rank)?;
        }
        Ok(())
    }
}

/// Residual and Jacobian at one parameter vector, with weights already applied.
struct Linearization {
    estimate: Array1<f64>,
    residual: Array1<f64>,
    jacobian: Array2<f64>,
    weights: Option<Array1<f64>>,
}

impl Linearization {
    fn new(n_meas: usize, n_params: usize, weighted: bool) -> Self {
        Self {
            estimate: Array1::zeros(n_meas),
            residual: Array1::zeros(n_meas),
            jacobian: Array2::zeros((n_meas, n_params)),
            weights: weighted.then(|| Array1::zeros(n_meas)),
        }
    }

    /// Evaluate the problem at `params` and return the squared residual norm.
    fn update<P, W>(
        &mut self,
        problem: &P,
        params: &Array1<f64>,
        measurement: &Array1<f64>,
        weighting: &W,
    ) -> Result<f64>
    where
        P: Problem + ?Sized,
        W: WeightFunction + ?Sized,
    {
        problem.evaluate_with_jacobian(&mut self.estimate, params, &mut self.jacobian)?;
        self.residual.assign(measurement);
        self.residual -= &self.estimate;

        // scale rows of r and J by √w
        if let Some(weights) = self.weights.as_mut() {
            weighting.compute_weights(&self.residual, weights);
            for (i, mut row) in self.jacobian.rows_mut().into_iter().enumerate() {
                let w = weights[i].sqrt();
                self.residual[i] *= w;
                row *= w;
            }
            trace!(weights = ?weights.as_slice(), "Weights");
        }

        Ok(self.residual.dot(&self.residual))
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Set the factor by which lambda is scaled after each step.
    pub fn with_lambda_factor(mut self, factor: f64) -> Self {
        self.config.lambda_factor = factor;
        self
    }

    /// Set the method used for solving the linear system.
    pub fn with_decomposition_method(mut self, method: DecompositionMethod) -> Self {
        self.config.decomposition_method = method;
        self
    }

    /// Record one [`IterationRecord`] per iteration in the report.
    pub fn with_record_trace(mut self, record_trace: bool) -> Self {
        self.config.record_trace = record_trace;
        self
    }

    /// The configuration used by this optimizer.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    fn validate_config(&self) -> Result<()> {
        let c = &self.config;
        if !(c.initial_lambda > 0.0 && c.initial_lambda.is_finite()) {
            return Err(FitError::InvalidParameter(format!(
                "initial_lambda must be positive and finite, got {}",
                c.initial_lambda
            )));
        }
        if !(c.lambda_factor > 1.0 && c.lambda_factor.is_finite()) {
            return Err(FitError::InvalidParameter(format!(
                "lambda_factor must be greater than one, got {}",
                c.lambda_factor
            )));
        }
        if !(c.min_lambda > 0.0 && c.min_lambda <= c.max_lambda && c.max_lambda.is_finite()) {
            return Err(FitError::InvalidParameter(format!(
                "invalid lambda bounds [{}, {}]",
                c.min_lambda, c.max_lambda
            )));
        }
        Ok(())
    }

    /// Fit `problem` to `measurement`, refining `params` in place.
    ///
    /// # Arguments
    ///
    /// * `problem` - The model to fit
    /// * `params` - Initial guess, overwritten with every accepted step
    /// * `measurement` - Target values, length `problem.size()`
    /// * `termination` - Called once per iteration with
    ///   `(iteration, previous residual², candidate residual²)`
    /// * `normalize` - Applied to every candidate before it is evaluated
    /// * `weighting` - Robust weighting policy; [`NoWeights`] skips the weighting pass
    ///
    /// # Errors
    ///
    /// * `FitError::DimensionMismatch` if the measurement length does not match the
    ///   problem or the system is under-determined
    /// * `FitError::SingularMatrix` if a QR solve meets a singular system
    /// * `FitError::LinearAlgebraError` if a QR or SVD solve fails otherwise
    /// * Any error returned by the problem
    pub fn minimize<P, T, N, W>(
        &self,
        problem: &P,
        params: &mut Array1<f64>,
        measurement: &Array1<f64>,
        termination: &T,
        normalize: &N,
        weighting: &W,
    ) -> Result<LmReport>
    where
        P: Problem + ?Sized,
        T: Termination + ?Sized,
        N: Normalize + ?Sized,
        W: WeightFunction + ?Sized,
    {
        self.validate_config()?;
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

        let weighted = !weighting.no_weights();
        let mut current = Linearization::new(n_meas, n_params, weighted);
        let mut candidate = Linearization::new(n_meas, n_params, weighted);

        let mut err_prev = current.update(problem, params, measurement, weighting)?;
        debug!(residual = err_prev, "Levenberg-Marquardt residual 0");

        let LmConfig {
            lambda_factor,
            min_lambda,
            max_lambda,
            ..
        } = self.config;
        let mut lambda = self.config.initial_lambda.clamp(min_lambda, max_lambda);
        let mut method = self.config.decomposition_method;
        let mut report = LmReport {
            residual_norm_sq: err_prev,
            iterations: 0,
            accepted_steps: 0,
            rejected_steps: 0,
            lambda,
            decomposition_method: method,
            rank: None,
            trace: Vec::new(),
        };

        // nothing left to improve
        if err_prev == 0.0 {
            return Ok(report);
        }

        let mut normal = NormalEquations::new(&current.jacobian, &current.residual)?;
        let mut new_params = params.clone();
        let mut iteration = 0;

        loop {
            iteration += 1;

            let step = loop {
                match LmStep::solve(method, &normal, lambda)? {
                    Some(step) => break step,
                    None => {
                        debug!("Error in Cholesky decomposition, switching to SVD");
                        method = DecompositionMethod::SVD;
                    }
                }
            };
            if step.rank.is_some() {
                report.rank = step.rank;
            }
            trace!(step = ?step.step.as_slice(), "Parameter step");

            new_params.assign(&*params);
            new_params += &step.step;
            normalize.normalize(&mut new_params);

            let err = candidate.update(problem, &new_params, measurement, weighting)?;
            debug!(iteration, residual = err, lambda, "Levenberg-Marquardt residual");

            let stop = termination.terminate(iteration, err_prev, err);

            // NaN never compares less, so a non-finite candidate is rejected
            let accepted = err < err_prev;
            if self.config.record_trace {
                report.trace.push(IterationRecord {
                    iteration,
                    lambda,
                    residual_norm_sq: err,
                    accepted,
                });
            }

            if accepted {
                lambda = (lambda / lambda_factor).max(min_lambda);
                params.assign(&new_params);
                std::mem::swap(&mut current, &mut candidate);
                normal = NormalEquations::new(&current.jacobian, &current.residual)?;
                err_prev = err;
                report.accepted_steps += 1;
            } else {
                lambda = (lambda * lambda_factor).min(max_lambda);
                report.rejected_steps += 1;
            }

            if stop || err_prev == 0.0 {
                break;
            }
        }

        report.residual_norm_sq = err_prev;
        report.iterations = iteration;
        report.lambda = lambda;
        report.decomposition_method = method;
        Ok(report)
    }
}

/// Unweighted Levenberg-Marquardt fit with the default damping schedule.
///
/// Returns the squared residual norm at the refined `params`.
pub fn levenberg_marquardt<P, T, N>(
    problem: &P,
    params: &mut Array1<f64>,
    measurement: &Array1<f64>,
    termination: &T,
    normalize: &N,
    method: DecompositionMethod,
) -> Result<f64>
where
    P: Problem + ?Sized,
    T: Termination + ?Sized,
    N: Normalize + ?Sized,
{
    weighted_levenberg_marquardt(
        problem,
        params,
        measurement,
        termination,
        normalize,
        &NoWeights,
        method,
    )
}

/// Levenberg-Marquardt fit with a robust weighting policy.
///
/// Returns the weighted squared residual norm at the refined `params`.
pub fn weighted_levenberg_marquardt<P, T, N, W>(
    problem: &P,
    params: &mut Array1<f64>,
    measurement: &Array1<f64>,
    termination: &T,
    normalize: &N,
    weighting: &W,
    method: DecompositionMethod,
) -> Result<f64>
where
    P: Problem + ?Sized,
    T: Termination + ?Sized,
    N: Normalize + ?Sized,
    W: WeightFunction + ?Sized,
{
    LevenbergMarquardt::new()
        .with_decomposition_method(method)
        .minimize(problem, params, measurement, termination, normalize, weighting)
        .map(|report| report.residual_norm_sq)
}
