//! Shared test problems.

#![allow(dead_code)]

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use robustfit_rs::{Problem, Result};

/// Design matrix of the straight line `y = a·x + b`, one row `[x, 1]` per sample.
pub fn line_design(x: &[f64]) -> Array2<f64> {
    let mut matrix = Array2::ones((x.len(), 2));
    for (i, &xi) in x.iter().enumerate() {
        matrix[[i, 0]] = xi;
    }
    matrix
}

/// Circle fit: the residual of point `i` is its distance to the circle with
/// center `(cx, cy)` and radius `r`, measured against a zero measurement.
pub struct CircleProblem {
    pub points: Vec<(f64, f64)>,
}

impl CircleProblem {
    /// Sample `n` points on a circle with Gaussian radial noise.
    pub fn noisy(center: (f64, f64), radius: f64, n: usize, sigma: f64, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let noise = Normal::new(0.0, sigma).unwrap();
        let points = (0..n)
            .map(|i| {
                let angle = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                let r = radius + noise.sample(&mut rng);
                (center.0 + r * angle.cos(), center.1 + r * angle.sin())
            })
            .collect();
        Self { points }
    }
}

impl Problem for CircleProblem {
    fn size(&self) -> usize {
        self.points.len()
    }

    fn evaluate(&self, result: &mut Array1<f64>, params: &Array1<f64>) -> Result<()> {
        let (cx, cy, r) = (params[0], params[1], params[2]);
        for (out, &(x, y)) in result.iter_mut().zip(self.points.iter()) {
            *out = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() - r;
        }
        Ok(())
    }

    fn evaluate_with_jacobian(
        &self,
        result: &mut Array1<f64>,
        params: &Array1<f64>,
        jacobian: &mut Array2<f64>,
    ) -> Result<()> {
        let (cx, cy, r) = (params[0], params[1], params[2]);
        for (i, &(x, y)) in self.points.iter().enumerate() {
            let d = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
            result[i] = d - r;
            jacobian[[i, 0]] = (cx - x) / d;
            jacobian[[i, 1]] = (cy - y) / d;
            jacobian[[i, 2]] = -1.0;
        }
        Ok(())
    }
}

/// `f(x) = exp(x)` for a single parameter and a single measurement.
pub struct Exponential;

impl Problem for Exponential {
    fn size(&self) -> usize {
        1
    }

    fn evaluate(&self, result: &mut Array1<f64>, params: &Array1<f64>) -> Result<()> {
        result[0] = params[0].exp();
        Ok(())
    }

    fn evaluate_with_jacobian(
        &self,
        result: &mut Array1<f64>,
        params: &Array1<f64>,
        jacobian: &mut Array2<f64>,
    ) -> Result<()> {
        result[0] = params[0].exp();
        jacobian[[0, 0]] = result[0];
        Ok(())
    }
}
