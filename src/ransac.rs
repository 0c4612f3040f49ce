//! Generic RANSAC driver over two parallel observation lists.
//!
//! The driver knows nothing about the model being fitted. It is given an
//! [`Estimator`], which turns a list of paired observations into a hypothesis and
//! declares how many observations it needs, and an *evaluator*, which measures the
//! distance of one observation pair from a hypothesis. Each trial draws `set_size` indices uniformly with replacement,
//! estimates a hypothesis from them and counts the observations closer than
//! `threshold`. The largest inlier set that reaches `min_inliers` is kept, and a
//! final hypothesis is estimated from all of its members.
//!
//! A degenerate minimal sample is not an error: the estimator returns `Err`, the
//! trial is logged and skipped, and the run continues. Failing to find enough
//! inliers is not an error either; it is reported as `Ok(None)` (or `0` from
//! [`ransac`]).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{FitError, Result};

/// Estimates a hypothesis from paired observations.
///
/// A closure can be used through [`FnEstimator`].
pub trait Estimator<A, B, H> {
    /// Smallest number of observations from which a unique hypothesis can be
    /// estimated. A configured `set_size` below this is rejected up front.
    fn min_samples(&self) -> usize;

    /// Estimate a hypothesis from `obs1[i]`, `obs2[i]`.
    ///
    /// Returning `Err` for a degenerate sample is expected; the driver skips the
    /// trial.
    fn estimate(&self, obs1: &[A], obs2: &[B]) -> Result<H>;
}

/// An [`Estimator`] built from a closure and its minimal sample size.
#[derive(Debug, Clone, Copy)]
pub struct FnEstimator<F> {
    min_samples: usize,
    estimate: F,
}

impl<F> FnEstimator<F> {
    pub fn new(min_samples: usize, estimate: F) -> Self {
        Self {
            min_samples,
            estimate,
        }
    }
}

impl<A, B, H, F> Estimator<A, B, H> for FnEstimator<F>
where
    F: Fn(&[A], &[B]) -> Result<H>,
{
    fn min_samples(&self) -> usize {
        self.min_samples
    }

    fn estimate(&self, obs1: &[A], obs2: &[B]) -> Result<H> {
        (self.estimate)(obs1, obs2)
    }
}

/// Parameters of a RANSAC run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RansacConfig {
    /// An observation is an inlier iff its distance is below this value.
    pub threshold: f64,

    /// Number of observations drawn per trial.
    pub set_size: usize,

    /// Minimum number of inliers for a hypothesis to be accepted.
    pub min_inliers: usize,

    /// Minimum number of trials before the run may stop early.
    pub min_runs: usize,

    /// Maximum number of trials.
    pub max_runs: usize,

    /// Seed for the sample generator; `None` seeds from system entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl RansacConfig {
    /// Create a configuration with explicit run limits.
    pub fn new(
        threshold: f64,
        set_size: usize,
        min_inliers: usize,
        min_runs: usize,
        max_runs: usize,
    ) -> Self {
        Self {
            threshold,
            set_size,
            min_inliers,
            min_runs,
            max_runs,
            seed: None,
        }
    }

    /// Derive the run limits from the expected fraction of outliers.
    ///
    /// With `n` observations, outlier ratio `ε` and required success probability
    /// `p`, this sets `min_inliers = (1 − ε)·n` (rounded) and
    /// `max_runs = 1 + ln(1 − p) / ln(1 − (1 − ε)^set_size)`, the number of trials
    /// after which at least one all-inlier sample has been drawn with probability
    /// `p`. `min_runs` is 1.
    ///
    /// # Errors
    ///
    /// * `FitError::InvalidParameter` if `ε` is outside `[0, 1)`, `p` is outside
    ///   `(0, 1)`, or `set_size` is zero
    pub fn from_outlier_ratio(
        threshold: f64,
        set_size: usize,
        n: usize,
        outlier_ratio: f64,
        success_probability: f64,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&outlier_ratio) {
            return Err(FitError::InvalidParameter(format!(
                "outlier ratio must be in [0, 1), got {}",
                outlier_ratio
            )));
        }
        if !(success_probability > 0.0 && success_probability < 1.0) {
            return Err(FitError::InvalidParameter(format!(
                "success probability must be in (0, 1), got {}",
                success_probability
            )));
        }
        if set_size == 0 {
            return Err(FitError::InvalidParameter(
                "set_size must be at least 1".to_string(),
            ));
        }

        let inlier_ratio = 1.0 - outlier_ratio;
        let min_inliers = ((inlier_ratio * n as f64).round() as usize).max(1);
        let all_inliers = inlier_ratio.powi(set_size as i32);
        let max_runs =
            (1.0 + (1.0 - success_probability).ln() / (1.0 - all_inliers).ln()) as usize;

        Ok(Self::new(threshold, set_size, min_inliers, 1, max_runs.max(1)))
    }

    /// Use a fixed seed for the sample generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn validate(&self, n1: usize, n2: usize, min_samples: usize) -> Result<()> {
        if n1 != n2 {
            return Err(FitError::DimensionMismatch(format!(
                "observation lists differ in length: {} vs {}",
                n1, n2
            )));
        }
        if n1 == 0 {
            return Err(FitError::InvalidInput("no observations".to_string()));
        }
        if self.set_size == 0 {
            return Err(FitError::InvalidParameter(
                "set_size must be at least 1".to_string(),
            ));
        }
        if self.set_size < min_samples {
            return Err(FitError::InvalidInput(format!(
                "set_size {} is below the estimator minimum of {}",
                self.set_size, min_samples
            )));
        }
        if self.set_size > n1 {
            return Err(FitError::InvalidInput(format!(
                "set_size {} exceeds the number of observations {}",
                self.set_size, n1
            )));
        }
        if self.min_inliers == 0 {
            return Err(FitError::InvalidParameter(
                "min_inliers must be at least 1".to_string(),
            ));
        }
        if self.threshold.is_nan() {
            return Err(FitError::InvalidParameter("threshold is NaN".to_string()));
        }
        Ok(())
    }
}

/// Outcome of a successful RANSAC run.
#[derive(Debug, Clone)]
pub struct RansacFit<H> {
    /// Hypothesis estimated from the best inlier set
    pub hypothesis: H,

    /// Size of the best inlier set
    pub inlier_count: usize,

    /// Inlier mask over the observations, `true` for members of the best set
    pub inliers: Vec<bool>,

    /// Number of trials executed
    pub runs: usize,

    /// Number of trials skipped because the estimator failed
    pub skipped_runs: usize,
}

/// A RANSAC driver owning its own sample generator.
#[derive(Debug, Clone)]
pub struct Ransac<R = StdRng> {
    config: RansacConfig,
    rng: R,
}

impl Ransac<StdRng> {
    /// Create a driver seeded from `config.seed`, or from entropy if unset.
    pub fn new(config: RansacConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }
}

impl<R: Rng> Ransac<R> {
    /// Create a driver drawing samples from `rng`. The configured seed is ignored.
    pub fn with_rng(config: RansacConfig, rng: R) -> Self {
        Self { config, rng }
    }

    /// The configuration of this driver.
    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Run RANSAC over the paired observations `obs1[i]`, `obs2[i]`.
    ///
    /// Returns `Ok(None)` if no trial reached `min_inliers`.
    ///
    /// # Errors
    ///
    /// * `FitError::DimensionMismatch` if the observation lists differ in length
    /// * `FitError::InvalidInput` for an empty data set, or a `set_size` below the
    ///   estimator minimum or above the number of observations
    /// * `FitError::InvalidParameter` for unusable parameters
    /// * Any error returned by the estimator on the final refit
    pub fn fit<A, B, H, E, V>(
        &mut self,
        obs1: &[A],
        obs2: &[B],
        estimator: E,
        evaluator: V,
    ) -> Result<Option<RansacFit<H>>>
    where
        A: Clone,
        B: Clone,
        E: Estimator<A, B, H>,
        V: Fn(&H, &A, &B) -> f64,
    {
        let Self { config, rng } = self;
        config.validate(obs1.len(), obs2.len(), estimator.min_samples())?;
        let n = obs1.len();
        debug!(
            observations = n,
            min_inliers = config.min_inliers,
            "RANSAC start"
        );
        if config.min_inliers > n {
            debug!("RANSAC: fewer observations than required inliers");
            return Ok(None);
        }

        let mut sample1 = Vec::with_capacity(config.set_size);
        let mut sample2 = Vec::with_capacity(config.set_size);
        let mut inliers = vec![false; n];
        let mut best_inliers = vec![false; n];
        let mut best_count = 0;
        let mut runs = 0;
        let mut skipped_runs = 0;

        while runs < config.max_runs {
            runs += 1;

            sample1.clear();
            sample2.clear();
            for _ in 0..config.set_size {
                let i = rng.gen_range(0..n);
                sample1.push(obs1[i].clone());
                sample2.push(obs2[i].clone());
            }

            let hypothesis = match estimator.estimate(&sample1, &sample2) {
                Ok(hypothesis) => hypothesis,
                Err(e) => {
                    debug!(run = runs, error = %e, "Skipping RANSAC trial");
                    skipped_runs += 1;
                    continue;
                }
            };

            inliers.fill(false);
            let mut count = 0;
            for i in 0..n {
                // the rest cannot reach min_inliers any more
                if n - i < config.min_inliers.saturating_sub(count) {
                    break;
                }
                if evaluator(&hypothesis, &obs1[i], &obs2[i]) < config.threshold {
                    inliers[i] = true;
                    count += 1;
                }
            }
            trace!(run = runs, inliers = count, "RANSAC trial");

            if count >= config.min_inliers && count > best_count {
                best_count = count;
                std::mem::swap(&mut inliers, &mut best_inliers);
            }

            if best_count >= config.min_inliers && runs >= config.min_runs {
                break;
            }
        }

        if best_count < config.min_inliers {
            debug!(runs, "RANSAC: not enough inliers found");
            return Ok(None);
        }

        let (final1, final2): (Vec<A>, Vec<B>) = best_inliers
            .iter()
            .enumerate()
            .filter(|&(_, &inlier)| inlier)
            .map(|(i, _)| (obs1[i].clone(), obs2[i].clone()))
            .unzip();
        let hypothesis = estimator.estimate(&final1, &final2)?;
        debug!(inliers = best_count, runs, skipped_runs, "RANSAC finished");

        Ok(Some(RansacFit {
            hypothesis,
            inlier_count: best_count,
            inliers: best_inliers,
            runs,
            skipped_runs,
        }))
    }
}

/// Run RANSAC and write the refit hypothesis into `result`.
///
/// Returns the size of the best inlier set, or `0` if no trial reached
/// `min_inliers`; in that case `result` and `inlier_mask` are left untouched.
pub fn ransac<A, B, H, E, V>(
    result: &mut H,
    obs1: &[A],
    obs2: &[B],
    config: &RansacConfig,
    estimator: E,
    evaluator: V,
    inlier_mask: Option<&mut Vec<bool>>,
) -> Result<usize>
where
    A: Clone,
    B: Clone,
    E: Estimator<A, B, H>,
    V: Fn(&H, &A, &B) -> f64,
{
    match Ransac::new(config.clone()).fit(obs1, obs2, estimator, evaluator)? {
        Some(fit) => {
            *result = fit.hypothesis;
            if let Some(mask) = inlier_mask {
                *mask = fit.inliers;
            }
            Ok(fit.inlier_count)
        }
        None => Ok(0),
    }
}
