//! Step calculation shared by the Levenberg-Marquardt and Gauss-Newton solvers.
//!
//! Both solvers reduce each iteration to the normal equations
//! `(JᵗJ + λI) Δx = Jᵗr`. This module forms `JᵗJ` and `Jᵗr` and solves the damped
//! system with one of the dense factorizations provided by `nalgebra`.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use tracing::{debug, trace};

use super::config::DecompositionMethod;
use crate::error::{FitError, Result};
use crate::utils::matrix_convert::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

/// The undamped normal equations `JᵗJ` and `Jᵗr` of one linearization.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    /// `JᵗJ`, an `n x n` symmetric matrix
    pub jtj: DMatrix<f64>,

    /// `Jᵗr`, length `n`
    pub jtr: DVector<f64>,
}

impl NormalEquations {
    /// Form the normal equations from a Jacobian and a residual vector.
    pub fn new(jacobian: &Array2<f64>, residual: &Array1<f64>) -> Result<Self> {
        if jacobian.nrows() != residual.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Jacobian has {} rows but the residual has {} entries",
                jacobian.nrows(),
                residual.len()
            )));
        }
        let j = ndarray_to_nalgebra(jacobian);
        let r = ndarray_vec_to_nalgebra(residual);
        Ok(Self {
            jtj: j.tr_mul(&j),
            jtr: j.tr_mul(&r),
        })
    }

    /// Number of parameters.
    pub fn dim(&self) -> usize {
        self.jtr.len()
    }

    /// `JᵗJ + λI`.
    pub fn damped(&self, lambda: f64) -> DMatrix<f64> {
        let mut a = self.jtj.clone();
        for i in 0..a.nrows() {
            a[(i, i)] += lambda;
        }
        a
    }
}

/// Result of a step calculation.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The calculated step vector
    pub step: Array1<f64>,

    /// Effective numerical rank, reported by SVD solves only
    pub rank: Option<usize>,

    /// Singular values, reported by SVD solves only
    pub singular_values: Option<Array1<f64>>,
}

impl StepResult {
    fn plain(step: DVector<f64>) -> Self {
        Self {
            step: nalgebra_vec_to_ndarray(&step),
            rank: None,
            singular_values: None,
        }
    }
}

/// Handles step calculation for the least-squares solvers.
pub struct LmStep;

impl LmStep {
    /// Solve `(JᵗJ + λI) Δx = Jᵗr` with the given method.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(step))` on success
    /// * `Ok(None)` if the Cholesky factorization found the matrix not positive
    ///   definite; the caller decides how to fall back
    /// * `Err(FitError::SingularMatrix)` if the QR factor has a zero pivot
    /// * `Err(FitError::LinearAlgebraError)` if a QR or SVD solve failed otherwise
    pub fn solve(
        method: DecompositionMethod,
        normal: &NormalEquations,
        lambda: f64,
    ) -> Result<Option<StepResult>> {
        let a = normal.damped(lambda);
        match method {
            DecompositionMethod::Cholesky => {
                Ok(Self::solve_cholesky(a, &normal.jtr).map(StepResult::plain))
            }
            DecompositionMethod::QR => {
                Self::solve_qr(a, &normal.jtr).map(|x| Some(StepResult::plain(x)))
            }
            DecompositionMethod::SVD => Self::solve_svd(a, &normal.jtr).map(Some),
        }
    }

    /// Solves the symmetric positive definite system `A x = b` using Cholesky
    /// decomposition. Returns `None` if `A` is not positive definite.
    pub fn solve_cholesky(a: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
        if !all_finite(&a, b) {
            return None;
        }
        let x = a.cholesky()?.solve(b);
        x.iter().all(|v| v.is_finite()).then_some(x)
    }

    /// Solves the square system `A x = b` using QR decomposition.
    ///
    /// A diagonal entry of `R` at or below `n · ε · max|R_ii|` counts as zero and
    /// makes the solve fail with [`FitError::SingularMatrix`].
    pub fn solve_qr(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
        if !all_finite(&a, b) {
            return Err(FitError::LinearAlgebraError(
                "QR solve: system contains non-finite values".to_string(),
            ));
        }
        let n = a.nrows();
        let qr = a.qr();
        let r = qr.r();
        let max_diag = (0..n).map(|i| r[(i, i)].abs()).fold(0.0, f64::max);
        let tolerance = max_diag * f64::EPSILON * n as f64;
        if (0..n).any(|i| r[(i, i)].abs() <= tolerance) {
            return Err(FitError::SingularMatrix);
        }
        let x = qr.solve(b).ok_or(FitError::SingularMatrix)?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(FitError::LinearAlgebraError(
                "QR solve produced non-finite values".to_string(),
            ));
        }
        Ok(x)
    }

    /// Solves `A x = b` in the least-squares sense using the singular value
    /// decomposition.
    ///
    /// Singular values below `n · ε · σ_max` are treated as zero, where `ε` is the
    /// machine precision and `n` the matrix dimension; the number of remaining
    /// singular values is the effective rank.
    pub fn solve_svd(a: DMatrix<f64>, b: &DVector<f64>) -> Result<StepResult> {
        if !all_finite(&a, b) {
            return Err(FitError::LinearAlgebraError(
                "SVD solve: system contains non-finite values".to_string(),
            ));
        }
        let n = a.nrows().max(a.ncols());
        let svd = a.try_svd(true, true, f64::EPSILON, 0).ok_or_else(|| {
            FitError::LinearAlgebraError("SVD did not converge".to_string())
        })?;

        let sigma_max = svd.singular_values.iter().copied().fold(0.0, f64::max);
        let cutoff = f64::EPSILON * sigma_max * n as f64;
        let rank = svd.rank(cutoff);
        debug!(rank, "Effective rank");
        trace!(singular_values = ?svd.singular_values.as_slice(), "Singular values");

        let x = svd
            .solve(b, cutoff)
            .map_err(|e| FitError::LinearAlgebraError(format!("SVD solve: {}", e)))?;

        Ok(StepResult {
            step: nalgebra_vec_to_ndarray(&x),
            rank: Some(rank),
            singular_values: Some(nalgebra_vec_to_ndarray(&svd.singular_values)),
        })
    }
}

fn all_finite(a: &DMatrix<f64>, b: &DVector<f64>) -> bool {
    a.iter().all(|v| v.is_finite()) && b.iter().all(|v| v.is_finite())
}
