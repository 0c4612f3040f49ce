//! Integration tests for the Levenberg-Marquardt algorithm.

mod common;

use approx::assert_relative_eq;
use common::{line_design, CircleProblem, Exponential};
use ndarray::{array, Array1};
use robustfit_rs::lm::{
    levenberg_marquardt, weighted_levenberg_marquardt, DecompositionMethod, LevenbergMarquardt,
    LmConfig,
};
use robustfit_rs::policy::{
    HuberWeight, NoNormalize, NoWeights, TerminationCriteria, TukeyWeight, UnitNormalize,
};
use robustfit_rs::problem::LinearFunction;
use robustfit_rs::{FitError, Problem};

const METHODS: [DecompositionMethod; 3] = [
    DecompositionMethod::Cholesky,
    DecompositionMethod::QR,
    DecompositionMethod::SVD,
];

#[test]
fn test_linear_model_exactness() {
    let problem = LinearFunction::new(array![[4.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]]);
    let truth = array![1.0, -2.0, 3.0];
    let measurement = problem.matrix().dot(&truth);
    let stop_when_exact = |_iteration: usize, _previous: f64, current: f64| current < 1e-10;

    for method in METHODS {
        for start in [array![0.0, 0.0, 0.0], array![100.0, -50.0, 20.0]] {
            let mut params = start;
            let report = LevenbergMarquardt::new()
                .with_lambda(1e-12)
                .with_decomposition_method(method)
                .minimize(
                    &problem,
                    &mut params,
                    &measurement,
                    &stop_when_exact,
                    &NoNormalize,
                    &NoWeights,
                )
                .unwrap();

            assert!(report.residual_norm_sq < 1e-10, "{:?}: {}", method, report);
            assert!(report.accepted_steps <= 2, "{:?}: {}", method, report);
            for i in 0..3 {
                assert_relative_eq!(params[i], truth[i], epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_damping_schedule() {
    // exp(x) = 1 from far left: the first undamped steps overshoot
    let mut params = array![-5.0];
    let report = LevenbergMarquardt::new()
        .with_lambda(1e-6)
        .with_record_trace(true)
        .minimize(
            &Exponential,
            &mut params,
            &array![1.0],
            &TerminationCriteria::new(300, 1e-10),
            &NoNormalize,
            &NoWeights,
        )
        .unwrap();

    assert!(report.rejected_steps >= 1);
    assert!(report.accepted_steps >= 1);
    assert_eq!(report.trace.len(), report.iterations);
    assert_eq!(
        report.accepted_steps + report.rejected_steps,
        report.iterations
    );
    assert!(!report.trace[0].accepted);

    for pair in report.trace.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        assert_eq!(next.iteration, prev.iteration + 1);
        if prev.accepted {
            assert_eq!(next.lambda, prev.lambda / 10.0);
        } else {
            assert_eq!(next.lambda, prev.lambda * 10.0);
        }
    }
    assert!(params[0].abs() < 1e-4, "x = {}", params[0]);
}

#[test]
fn test_trace_disabled_by_default() {
    let mut params = array![-1.0];
    let report = LevenbergMarquardt::new()
        .minimize(
            &Exponential,
            &mut params,
            &array![2.0],
            &TerminationCriteria::default(),
            &NoNormalize,
            &NoWeights,
        )
        .unwrap();
    assert!(report.trace.is_empty());
    assert_relative_eq!(params[0], 2f64.ln(), epsilon = 1e-4);
}

#[test]
fn test_cholesky_falls_back_to_svd() {
    // identical columns: JᵗJ is singular and tiny damping does not rescue Cholesky
    let problem = LinearFunction::new(array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]);
    let mut params = array![0.0, 0.0];
    let report = LevenbergMarquardt::new()
        .with_lambda(1e-20)
        .with_record_trace(true)
        .minimize(
            &problem,
            &mut params,
            &array![2.0, 4.0, 6.0],
            &TerminationCriteria::new(10, 1e-10),
            &NoNormalize,
            &NoWeights,
        )
        .unwrap();

    assert_eq!(report.decomposition_method, DecompositionMethod::SVD);
    assert_eq!(report.rank, Some(1));
    // the failed Cholesky solve is retried within iteration 1 at the same damping
    assert_eq!(report.trace[0].iteration, 1);
    assert_eq!(report.trace[0].lambda, 1e-20);
    assert!(report.trace[0].accepted);
    assert!(report.residual_norm_sq < 1e-20);
    // minimum-norm solution of x0 + x1 = 2
    assert_relative_eq!(params[0], 1.0, epsilon = 1e-8);
    assert_relative_eq!(params[1], 1.0, epsilon = 1e-8);
}

#[test]
fn test_qr_singular_is_fatal() {
    let problem = LinearFunction::new(array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]);
    let config = LmConfig {
        initial_lambda: 1e-20,
        decomposition_method: DecompositionMethod::QR,
        ..LmConfig::default()
    };
    let mut params = array![0.0, 0.0];
    let result = LevenbergMarquardt::with_config(config).minimize(
        &problem,
        &mut params,
        &array![2.0, 4.0, 6.0],
        &TerminationCriteria::default(),
        &NoNormalize,
        &NoWeights,
    );
    assert!(matches!(result, Err(FitError::SingularMatrix)));
}

#[test]
fn test_circle_fit_all_methods() {
    let problem = CircleProblem::noisy((1.0, -2.0), 5.0, 40, 0.01, 11);
    let measurement = Array1::zeros(problem.size());

    for method in METHODS {
        let mut params = array![0.0, 0.0, 3.0];
        let residual = levenberg_marquardt(
            &problem,
            &mut params,
            &measurement,
            &TerminationCriteria::new(200, 1e-12),
            &NoNormalize,
            method,
        )
        .unwrap();

        assert!(residual < 40.0 * 1e-3, "{:?}: residual {}", method, residual);
        assert_relative_eq!(params[0], 1.0, epsilon = 0.02);
        assert_relative_eq!(params[1], -2.0, epsilon = 0.02);
        assert_relative_eq!(params[2], 5.0, epsilon = 0.02);
    }
}

#[test]
fn test_rerun_is_idempotent() {
    let problem = CircleProblem::noisy((0.5, 0.5), 2.0, 30, 0.05, 5);
    let measurement = Array1::zeros(problem.size());
    let termination = TerminationCriteria::new(200, 1e-12);

    let mut params = array![0.0, 0.0, 1.0];
    let first = levenberg_marquardt(
        &problem,
        &mut params,
        &measurement,
        &termination,
        &NoNormalize,
        DecompositionMethod::Cholesky,
    )
    .unwrap();

    let converged = params.clone();
    let second = levenberg_marquardt(
        &problem,
        &mut params,
        &measurement,
        &termination,
        &NoNormalize,
        DecompositionMethod::Cholesky,
    )
    .unwrap();

    assert!(second <= first);
    for i in 0..3 {
        assert!((params[i] - converged[i]).abs() < 1e-6);
    }
}

#[test]
fn test_normalized_parameters() {
    // closest unit vector to (2, 0, 0)
    let problem = LinearFunction::new(ndarray::Array2::eye(3));
    let mut params = array![0.6, 0.8, 0.0];
    levenberg_marquardt(
        &problem,
        &mut params,
        &array![2.0, 0.0, 0.0],
        &TerminationCriteria::new(100, 1e-12),
        &UnitNormalize::new(0, 3),
        DecompositionMethod::Cholesky,
    )
    .unwrap();

    assert_relative_eq!(params[0], 1.0, epsilon = 1e-6);
    assert!(params[1].abs() < 1e-3);
    assert_relative_eq!(params.dot(&params), 1.0, epsilon = 1e-12);
}

/// Line y = 2x + 1 sampled at x = 0..20 with one gross outlier.
fn line_with_outlier() -> (LinearFunction, Array1<f64>) {
    let x: Vec<f64> = (0..20).map(f64::from).collect();
    let problem = LinearFunction::new(line_design(&x));
    let mut measurement = Array1::from_iter(x.iter().map(|x| 2.0 * x + 1.0));
    measurement[10] += 50.0;
    (problem, measurement)
}

fn line_error(params: &Array1<f64>) -> f64 {
    (params[0] - 2.0).abs() + (params[1] - 1.0).abs()
}

#[test]
fn test_robust_weighting_reduces_outlier_influence() {
    let (problem, measurement) = line_with_outlier();
    let termination = TerminationCriteria::new(200, 1e-12);

    let mut plain = array![0.0, 0.0];
    levenberg_marquardt(
        &problem,
        &mut plain,
        &measurement,
        &termination,
        &NoNormalize,
        DecompositionMethod::Cholesky,
    )
    .unwrap();
    let plain_error = line_error(&plain);
    assert!(plain_error > 1.0);

    let mut huber = plain.clone();
    weighted_levenberg_marquardt(
        &problem,
        &mut huber,
        &measurement,
        &termination,
        &NoNormalize,
        &HuberWeight::new(1, 1.0).unwrap(),
        DecompositionMethod::Cholesky,
    )
    .unwrap();
    assert!(line_error(&huber) < 0.2, "huber fit {:?}", huber);

    let mut tukey = plain.clone();
    weighted_levenberg_marquardt(
        &problem,
        &mut tukey,
        &measurement,
        &termination,
        &NoNormalize,
        &TukeyWeight::new(1, 1000.0).unwrap(),
        DecompositionMethod::Cholesky,
    )
    .unwrap();
    assert!(
        line_error(&tukey) < 0.5 * plain_error,
        "tukey fit {:?}, plain fit {:?}",
        tukey,
        plain
    );
}

#[test]
fn test_closure_weighting() {
    let (problem, measurement) = line_with_outlier();
    let termination = TerminationCriteria::new(200, 1e-12);

    let mut plain = array![0.0, 0.0];
    levenberg_marquardt(
        &problem,
        &mut plain,
        &measurement,
        &termination,
        &NoNormalize,
        DecompositionMethod::QR,
    )
    .unwrap();

    // unit weights take the weighted path but must not change the fit
    let unit = |_: &Array1<f64>, weights: &mut Array1<f64>| weights.fill(1.0);
    let mut weighted = array![0.0, 0.0];
    weighted_levenberg_marquardt(
        &problem,
        &mut weighted,
        &measurement,
        &termination,
        &NoNormalize,
        &unit,
        DecompositionMethod::QR,
    )
    .unwrap();

    assert_relative_eq!(weighted[0], plain[0], epsilon = 1e-12);
    assert_relative_eq!(weighted[1], plain[1], epsilon = 1e-12);
}

#[test]
fn test_dimension_errors() {
    let problem = LinearFunction::new(line_design(&[0.0, 1.0, 2.0]));
    let termination = TerminationCriteria::default();

    let mut params = array![0.0, 0.0];
    let result = levenberg_marquardt(
        &problem,
        &mut params,
        &array![1.0, 2.0],
        &termination,
        &NoNormalize,
        DecompositionMethod::Cholesky,
    );
    assert!(matches!(result, Err(FitError::DimensionMismatch(_))));

    let mut params = Array1::zeros(0);
    let result = levenberg_marquardt(
        &problem,
        &mut params,
        &array![1.0, 2.0, 3.0],
        &termination,
        &NoNormalize,
        DecompositionMethod::Cholesky,
    );
    assert!(matches!(result, Err(FitError::InvalidInput(_))));
}
