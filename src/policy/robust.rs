//! Robust weighting policies for handling outliers.
//!
//! A weighting policy turns the current residual vector into one weight per
//! residual row. The Levenberg-Marquardt driver multiplies each row of the
//! Jacobian and each residual entry by the square root of its weight, which turns
//! the plain least-squares step into one step of iteratively reweighted least
//! squares.
//!
//! Measurements often span several rows (a 2D image point contributes two
//! residuals), so every policy here works on blocks of `rows_per_measurement`
//! rows: the block error is `e = Σ r_j²` over the block and the resulting weight
//! is shared by all rows of that block.

use ndarray::Array1;
use std::fmt;

use crate::error::{FitError, Result};

/// Computes per-row weights from a residual vector.
///
/// Any `Fn(&Array1<f64>, &mut Array1<f64>)` closure is a weighting policy; it
/// receives the residual and fills the weights.
pub trait WeightFunction {
    /// Returns true if this policy never weights anything, in which case the solver
    /// skips the weighting pass entirely.
    fn no_weights(&self) -> bool {
        false
    }

    /// Fill `weights` (same length as `residual`) with one weight per residual row.
    fn compute_weights(&self, residual: &Array1<f64>, weights: &mut Array1<f64>);
}

impl<F> WeightFunction for F
where
    F: Fn(&Array1<f64>, &mut Array1<f64>),
{
    fn compute_weights(&self, residual: &Array1<f64>, weights: &mut Array1<f64>) {
        self(residual, weights)
    }
}

/// Plain least squares: every row has weight one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoWeights;

impl WeightFunction for NoWeights {
    fn no_weights(&self) -> bool {
        true
    }

    fn compute_weights(&self, _residual: &Array1<f64>, weights: &mut Array1<f64>) {
        weights.fill(1.0);
    }
}

/// Apply `weight(e)` to every block of `rows` rows, where `e` is the squared norm
/// of the block. A trailing partial block is treated as a block of its own.
fn fill_block_weights<F>(rows: usize, residual: &Array1<f64>, weights: &mut Array1<f64>, weight: F)
where
    F: Fn(f64) -> f64,
{
    let n = residual.len();
    let mut start = 0;
    while start < n {
        let end = (start + rows).min(n);
        let e: f64 = (start..end).map(|i| residual[i] * residual[i]).sum();
        let w = weight(e);
        for i in start..end {
            weights[i] = w;
        }
        start = end;
    }
}

fn check_block_params(rows_per_measurement: usize, scale: f64) -> Result<()> {
    if rows_per_measurement == 0 {
        return Err(FitError::InvalidParameter(
            "rows_per_measurement must be at least 1".to_string(),
        ));
    }
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(FitError::InvalidParameter(format!(
            "tuning constant must be positive and finite, got {}",
            scale
        )));
    }
    Ok(())
}

/// Tukey's bi-weight M-estimator.
///
/// With `ρ(e) = c²/6 · (1 − (1 − e/c²)³)` for `e ≤ c²` and `ρ(e) = c²/6` beyond,
/// the block weight is `√ρ / ρ`. A block with zero error gets weight zero. All
/// blocks with `e ≥ c²` share the same plateau weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TukeyWeight {
    rows_per_measurement: usize,
    c: f64,
}

impl TukeyWeight {
    /// Create a Tukey policy for measurements spanning `rows_per_measurement` rows.
    ///
    /// # Errors
    ///
    /// * `FitError::InvalidParameter` if `rows_per_measurement` is zero or `c` is
    ///   not a positive finite number
    pub fn new(rows_per_measurement: usize, c: f64) -> Result<Self> {
        check_block_params(rows_per_measurement, c)?;
        Ok(Self {
            rows_per_measurement,
            c,
        })
    }

    /// Weight for a block with squared error `e`.
    pub fn block_weight(&self, e: f64) -> f64 {
        if e == 0.0 {
            return 0.0;
        }
        let c2 = self.c * self.c;
        let rho = if e <= c2 {
            let t = 1.0 - e / c2;
            c2 / 6.0 * (1.0 - t * t * t)
        } else {
            c2 / 6.0
        };
        rho.sqrt() / rho
    }
}

impl WeightFunction for TukeyWeight {
    fn compute_weights(&self, residual: &Array1<f64>, weights: &mut Array1<f64>) {
        fill_block_weights(self.rows_per_measurement, residual, weights, |e| {
            self.block_weight(e)
        });
    }
}

impl fmt::Display for TukeyWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tukey(c={}, rows={})", self.c, self.rows_per_measurement)
    }
}

/// Huber weights: one inside `delta`, `delta / ‖r‖` outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HuberWeight {
    rows_per_measurement: usize,
    delta: f64,
}

impl HuberWeight {
    /// Create a Huber policy with threshold `delta` on the block norm.
    pub fn new(rows_per_measurement: usize, delta: f64) -> Result<Self> {
        check_block_params(rows_per_measurement, delta)?;
        Ok(Self {
            rows_per_measurement,
            delta,
        })
    }

    /// Weight for a block with squared error `e`.
    pub fn block_weight(&self, e: f64) -> f64 {
        let norm = e.sqrt();
        if norm <= self.delta {
            1.0
        } else {
            self.delta / norm
        }
    }
}

impl WeightFunction for HuberWeight {
    fn compute_weights(&self, residual: &Array1<f64>, weights: &mut Array1<f64>) {
        fill_block_weights(self.rows_per_measurement, residual, weights, |e| {
            self.block_weight(e)
        });
    }
}

impl fmt::Display for HuberWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Huber(delta={}, rows={})", self.delta, self.rows_per_measurement)
    }
}

/// Cauchy (Lorentzian) weights: `1 / (1 + e / c²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CauchyWeight {
    rows_per_measurement: usize,
    c: f64,
}

impl CauchyWeight {
    /// Create a Cauchy policy with scale `c`.
    pub fn new(rows_per_measurement: usize, c: f64) -> Result<Self> {
        check_block_params(rows_per_measurement, c)?;
        Ok(Self {
            rows_per_measurement,
            c,
        })
    }

    /// Weight for a block with squared error `e`.
    pub fn block_weight(&self, e: f64) -> f64 {
        1.0 / (1.0 + e / (self.c * self.c))
    }
}

impl WeightFunction for CauchyWeight {
    fn compute_weights(&self, residual: &Array1<f64>, weights: &mut Array1<f64>) {
        fill_block_weights(self.rows_per_measurement, residual, weights, |e| {
            self.block_weight(e)
        });
    }
}

impl fmt::Display for CauchyWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cauchy(c={}, rows={})", self.c, self.rows_per_measurement)
    }
}
