//! Numerical stability and resource-limit behavior under degenerate inputs.

use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::StandardNormal;
use std::time::Duration;
use trajectory_hmm::{GaussianHmm, HmmConfig};

/// One feature dimension is exactly constant, so its sample variance is
/// zero. The regularization floor must keep the covariance factorizable
/// and every fitted parameter finite.
#[test]
fn test_near_zero_variance_dimension() {
    let mut rng = ChaCha20Rng::seed_from_u64(3);
    let mut rows = Vec::with_capacity(60);
    for i in 0..30 {
        let center = if i < 15 { 0.0 } else { 8.0 };
        let noise: f64 = rng.sample(StandardNormal);
        rows.push(center + 0.3 * noise);
        rows.push(5.0); // constant dimension
    }
    let observations = DMatrix::from_row_slice(30, 2, &rows);
    let config = HmmConfig::default();

    let (model, summary) = GaussianHmm::fit(&observations, &[15, 15], 2, &config).unwrap();

    assert!(summary.log_likelihood.is_finite());
    for params in &model.emission_params {
        assert!(params.mean.iter().all(|v| v.is_finite()));
        assert!(params.covariance.iter().all(|v| v.is_finite()));
        assert!(params.log_det_cov.is_finite());
        // The floored variance must stay strictly positive
        assert!(params.covariance[(1, 1)] > 0.0);
    }

    let decoded = model.decode(&observations, &[15, 15]).unwrap();
    assert_eq!(decoded.len(), 30);
    assert!(decoded.iter().all(|&s| s < 2));
}

/// Long sequences underflow linear-space recursions; the log-space engine
/// must keep every quantity finite.
#[test]
fn test_long_sequence_does_not_underflow() {
    let mut rng = ChaCha20Rng::seed_from_u64(17);
    let n = 400;
    let rows: Vec<f64> = (0..n)
        .map(|i| {
            let center = if (i / 50) % 2 == 0 { -2.0 } else { 2.0 };
            let noise: f64 = rng.sample(StandardNormal);
            center + 0.4 * noise
        })
        .collect();
    let observations = DMatrix::from_row_slice(n, 1, &rows);
    let config = HmmConfig::default();

    let (model, summary) = GaussianHmm::fit(&observations, &[n], 2, &config).unwrap();
    assert!(summary.log_likelihood.is_finite());

    let score = model.score(&observations, &[n]).unwrap();
    assert!(score.is_finite());

    let posteriors = model.posteriors(&observations, &[n]).unwrap();
    assert!(posteriors
        .iter()
        .all(|row| row.iter().all(|p| p.is_finite())));
}

/// All segments of length 1: no transition statistics exist anywhere, yet
/// initial-distribution and emission estimation must still work.
#[test]
fn test_all_singleton_segments() {
    let rows: Vec<f64> = vec![0.0, 0.2, -0.1, 8.0, 8.2, 7.9, 0.1, 8.1];
    let observations = DMatrix::from_row_slice(8, 1, &rows);
    let lengths = [1usize; 8];
    let config = HmmConfig::default();

    let (model, summary) = GaussianHmm::fit(&observations, &lengths, 2, &config).unwrap();
    assert!(summary.log_likelihood.is_finite());

    for row in &model.transition_matrix {
        let row_sum: f64 = row.iter().sum();
        assert!((row_sum - 1.0).abs() < 1e-10);
    }

    let decoded = model.decode(&observations, &lengths).unwrap();
    assert_eq!(decoded.len(), 8);
    // Each singleton decodes independently; identical observations get
    // identical states
    assert_eq!(decoded[0], decoded[6]);
    assert_eq!(decoded[3], decoded[7]);
    assert_ne!(decoded[0], decoded[3]);
}

/// Mixed segment lengths, including length 1 next to longer runs.
#[test]
fn test_unequal_segment_lengths() {
    let mut rng = ChaCha20Rng::seed_from_u64(29);
    let rows: Vec<f64> = (0..27)
        .flat_map(|i| {
            let center = if i % 2 == 0 { 0.0 } else { 6.0 };
            let noise: f64 = rng.sample(StandardNormal);
            vec![center + 0.3 * noise, -center + 0.3 * noise]
        })
        .collect();
    let observations = DMatrix::from_row_slice(27, 2, &rows);
    let lengths = [1, 9, 3, 14];
    let config = HmmConfig::default();

    let (model, summary) = GaussianHmm::fit(&observations, &lengths, 2, &config).unwrap();
    assert!(summary.log_likelihood.is_finite());

    let decoded = model.decode(&observations, &lengths).unwrap();
    assert_eq!(decoded.len(), 27);
}

/// An exhausted wall-clock budget stops training at an iteration boundary
/// and still returns the current (initialization) parameters.
#[test]
fn test_zero_time_budget_stops_before_first_iteration() {
    let observations = DMatrix::from_row_slice(10, 1, &[
        0.0, 0.1, -0.1, 0.2, 0.0, 5.0, 5.1, 4.9, 5.2, 5.0,
    ]);
    let config = HmmConfig {
        max_fit_time: Some(Duration::ZERO),
        ..HmmConfig::default()
    };

    let (model, summary) = GaussianHmm::fit(&observations, &[5, 5], 2, &config).unwrap();

    assert_eq!(summary.iterations, 0);
    assert!(!summary.converged);

    // The initialization parameters are still a usable model
    let decoded = model.decode(&observations, &[5, 5]).unwrap();
    assert_eq!(decoded.len(), 10);
}

/// A generous iteration budget converges well before exhausting it, and
/// convergence is flagged.
#[test]
fn test_convergence_before_iteration_cap() {
    let mut rng = ChaCha20Rng::seed_from_u64(41);
    let rows: Vec<f64> = (0..40)
        .map(|i| {
            let center = if i < 20 { 0.0 } else { 10.0 };
            let noise: f64 = rng.sample(StandardNormal);
            center + 0.5 * noise
        })
        .collect();
    let observations = DMatrix::from_row_slice(40, 1, &rows);
    let config = HmmConfig::default();

    let (_, summary) = GaussianHmm::fit(&observations, &[20, 20], 2, &config).unwrap();
    assert!(summary.converged);
    assert!(summary.iterations < config.max_iterations);
}
