//! Downhill simplex minimizer after Nelder and Mead (1965).
//!
//! Used for problems without a usable Jacobian. Only [`Problem::evaluate`] is
//! called; the objective is the Euclidean norm `‖f(x) − y‖` (not squared).
//!
//! The simplex is stored as an `(n + 1) x n` matrix with one vertex per row,
//! together with the objective value of every vertex and the running sum of all
//! vertices. Every trial point is normalized before it is evaluated.

use ndarray::{Array1, Array2, Axis};
use tracing::{debug, trace};

use crate::error::{check_len, FitError, Result};
use crate::policy::{Normalize, Termination};
use crate::problem::Problem;

/// Scale applied to one coordinate of the seed point per initial vertex.
const INITIAL_SCALE: f64 = 1.48529;

/// Absolute offset used instead of [`INITIAL_SCALE`] when a seed coordinate is zero.
const ZERO_OFFSET: f64 = 0.00025;

struct Simplex<'a, P: ?Sized, N: ?Sized> {
    problem: &'a P,
    measurement: &'a Array1<f64>,
    normalize: &'a N,
    points: Array2<f64>,
    values: Array1<f64>,
    psum: Array1<f64>,
    estimate: Array1<f64>,
}

impl<'a, P, N> Simplex<'a, P, N>
where
    P: Problem + ?Sized,
    N: Normalize + ?Sized,
{
    fn new(
        problem: &'a P,
        measurement: &'a Array1<f64>,
        normalize: &'a N,
        seed: &Array1<f64>,
    ) -> Result<Self> {
        let n = seed.len();
        let mut points = Array2::zeros((n + 1, n));
        let mut first = seed.clone();
        normalize.normalize(&mut first);
        points.row_mut(0).assign(&first);
        for i in 1..=n {
            let mut vertex = seed.clone();
            if vertex[i - 1] == 0.0 {
                vertex[i - 1] = ZERO_OFFSET;
            } else {
                vertex[i - 1] *= INITIAL_SCALE;
            }
            normalize.normalize(&mut vertex);
            points.row_mut(i).assign(&vertex);
        }

        let mut simplex = Self {
            problem,
            measurement,
            normalize,
            psum: points.sum_axis(Axis(0)),
            points,
            values: Array1::zeros(n + 1),
            estimate: Array1::zeros(measurement.len()),
        };
        for i in 0..=n {
            let vertex = simplex.points.row(i).to_owned();
            simplex.values[i] = simplex.objective(&vertex)?;
        }
        Ok(simplex)
    }

    fn dim(&self) -> usize {
        self.psum.len()
    }

    fn objective(&mut self, point: &Array1<f64>) -> Result<f64> {
        self.problem.evaluate(&mut self.estimate, point)?;
        let diff = &self.estimate - self.measurement;
        Ok(diff.dot(&diff).sqrt())
    }

    /// Indices of the lowest, highest and next-highest vertex.
    fn rank(&self) -> (usize, usize, usize) {
        let y = &self.values;
        let mut ilo = 0;
        let (mut ihi, mut inhi) = if y[0] > y[1] { (0, 1) } else { (1, 0) };
        for (i, &value) in y.iter().enumerate() {
            if value <= y[ilo] {
                ilo = i;
            }
            if value > y[ihi] {
                inhi = ihi;
                ihi = i;
            } else if value > y[inhi] && i != ihi {
                inhi = i;
            }
        }
        (ilo, ihi, inhi)
    }

    /// Move the highest vertex through the face opposite to it by factor `fac`
    /// and keep the trial point if it improves on that vertex.
    fn try_vertex(&mut self, ihi: usize, fac: f64) -> Result<f64> {
        let fac1 = (1.0 - fac) / self.dim() as f64;
        let fac2 = fac1 - fac;
        let mut trial = &self.psum * fac1 - &self.points.row(ihi) * fac2;
        self.normalize.normalize(&mut trial);

        let value = self.objective(&trial)?;
        if value < self.values[ihi] {
            self.values[ihi] = value;
            self.psum += &(&trial - &self.points.row(ihi));
            self.points.row_mut(ihi).assign(&trial);
        }
        Ok(value)
    }

    /// Contract every vertex halfway towards the lowest one.
    fn shrink(&mut self, ilo: usize) -> Result<()> {
        let best = self.points.row(ilo).to_owned();
        for i in 0..self.points.nrows() {
            if i == ilo {
                continue;
            }
            let mut vertex = (&self.points.row(i) + &best) * 0.5;
            self.normalize.normalize(&mut vertex);
            self.values[i] = self.objective(&vertex)?;
            self.points.row_mut(i).assign(&vertex);
        }
        self.psum = self.points.sum_axis(Axis(0));
        Ok(())
    }
}

/// Minimize `‖f(params) − measurement‖` with the downhill simplex method.
///
/// The termination policy is called before every iteration with the number of
/// function evaluations so far and the objective values of the best and worst
/// vertex. When it returns true, the best vertex is written to `params` and its
/// objective value is returned.
///
/// Note that a policy that never fires makes this function loop forever.
///
/// # Errors
///
/// * `FitError::InvalidInput` if `params` is empty
/// * `FitError::DimensionMismatch` if the measurement length does not match the problem
/// * Any error returned by the problem
pub fn downhill_simplex<P, T, N>(
    problem: &P,
    params: &mut Array1<f64>,
    measurement: &Array1<f64>,
    termination: &T,
    normalize: &N,
) -> Result<f64>
where
    P: Problem + ?Sized,
    T: Termination + ?Sized,
    N: Normalize + ?Sized,
{
    let n = params.len();
    if n == 0 {
        return Err(FitError::InvalidInput("parameter vector is empty".to_string()));
    }
    check_len("measurement", problem.size(), measurement.len())?;

    let mut simplex = Simplex::new(problem, measurement, normalize, params)?;
    let mut evaluations = 0;

    loop {
        let (ilo, ihi, inhi) = simplex.rank();
        trace!(
            evaluations,
            best = simplex.values[ilo],
            worst = simplex.values[ihi],
            "Simplex"
        );

        if termination.terminate(evaluations, simplex.values[ilo], simplex.values[ihi]) {
            params.assign(&simplex.points.row(ilo));
            debug!(evaluations, residual = simplex.values[ilo], "Downhill simplex finished");
            return Ok(simplex.values[ilo]);
        }

        evaluations += 2;

        // reflect
        let value = simplex.try_vertex(ihi, -1.0)?;
        if value <= simplex.values[ilo] {
            // expand
            simplex.try_vertex(ihi, 2.0)?;
        } else if value >= simplex.values[inhi] {
            // contract
            let saved = simplex.values[ihi];
            let value = simplex.try_vertex(ihi, 0.5)?;
            if value >= saved {
                simplex.shrink(ilo)?;
                evaluations += n;
            }
        } else {
            evaluations -= 1;
        }
    }
}
