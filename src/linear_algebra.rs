//! Dense linear-algebra kernels for covariance handling.
//!
//! Everything here operates on symmetric positive-definite matrices via
//! Cholesky factorization: regularized decomposition, log-determinants, and
//! the responsibility-weighted moments used by the emission M-step.

use crate::errors::{HmmError, HmmResult};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// Factorizes a symmetric positive-definite matrix, retrying once with a
/// diagonal ridge.
///
/// The first attempt uses the matrix as given. If the decomposition hits a
/// non-positive pivot, `ridge` is added to every diagonal entry and the
/// decomposition is attempted once more; a second failure is returned as
/// [`HmmError::NonPositiveDefinite`].
pub fn regularized_cholesky(
    covariance: &DMatrix<f64>,
    ridge: f64,
) -> HmmResult<Cholesky<f64, Dyn>> {
    if let Some(chol) = Cholesky::new(covariance.clone()) {
        return Ok(chol);
    }

    let dim = covariance.nrows();
    let regularized = covariance + DMatrix::identity(dim, dim) * ridge;
    Cholesky::new(regularized).ok_or_else(|| HmmError::NonPositiveDefinite {
        reason: format!(
            "{}x{} matrix failed Cholesky decomposition even with ridge {:.2e}",
            dim, dim, ridge
        ),
    })
}

/// Log-determinant of the factored matrix: `2 Σ ln L_ii`.
pub fn cholesky_log_det(chol: &Cholesky<f64, Dyn>) -> f64 {
    2.0 * chol.l().diagonal().iter().map(|x| x.ln()).sum::<f64>()
}

/// Responsibility-weighted mean of observation rows.
///
/// `total_weight` must be the (strictly positive) sum of `weights`; the
/// caller checks the low-weight threshold before getting here.
pub fn weighted_mean(
    observations: &DMatrix<f64>,
    weights: &[f64],
    total_weight: f64,
) -> DVector<f64> {
    debug_assert_eq!(observations.nrows(), weights.len());
    debug_assert!(total_weight > 0.0);

    let dim = observations.ncols();
    let mut mean = DVector::zeros(dim);
    for (i, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        for d in 0..dim {
            mean[d] += w * observations[(i, d)];
        }
    }
    mean / total_weight
}

/// Responsibility-weighted covariance of observation rows around `mean`.
///
/// Accumulates centered outer products on the upper triangle and mirrors,
/// so the result is exactly symmetric.
pub fn weighted_covariance(
    observations: &DMatrix<f64>,
    weights: &[f64],
    mean: &DVector<f64>,
    total_weight: f64,
) -> DMatrix<f64> {
    debug_assert_eq!(observations.nrows(), weights.len());
    debug_assert!(total_weight > 0.0);

    let dim = observations.ncols();
    let mut cov = DMatrix::zeros(dim, dim);
    let mut diff = DVector::zeros(dim);

    for (i, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        for d in 0..dim {
            diff[d] = observations[(i, d)] - mean[d];
        }
        for p in 0..dim {
            for q in p..dim {
                let contribution = w * diff[p] * diff[q];
                cov[(p, q)] += contribution;
                if p != q {
                    cov[(q, p)] += contribution;
                }
            }
        }
    }

    cov / total_weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_cholesky_of_identity() {
        let identity = DMatrix::identity(3, 3);
        let chol = regularized_cholesky(&identity, 1e-6).unwrap();
        assert_approx_eq!(cholesky_log_det(&chol), 0.0, 1e-12);
    }

    #[test]
    fn test_cholesky_log_det_diagonal() {
        let cov = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 3.0]));
        let chol = regularized_cholesky(&cov, 1e-6).unwrap();
        assert_approx_eq!(cholesky_log_det(&chol), 6.0_f64.ln(), 1e-12);
    }

    #[test]
    fn test_cholesky_ridge_retry() {
        // Singular matrix: rank 1, needs the ridge to factor
        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let chol = regularized_cholesky(&singular, 1e-4);
        assert!(chol.is_ok());
    }

    #[test]
    fn test_cholesky_failure_propagates() {
        // Negative definite: no ridge of this size rescues it
        let negative = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -1.0]);
        let err = regularized_cholesky(&negative, 1e-6).unwrap_err();
        assert!(matches!(err, HmmError::NonPositiveDefinite { .. }));
    }

    #[test]
    fn test_weighted_moments() {
        let rows = DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 2.0, 0.0, 0.0, 2.0, 2.0, 2.0]);
        let weights = [1.0, 1.0, 1.0, 1.0];
        let mean = weighted_mean(&rows, &weights, 4.0);
        assert_approx_eq!(mean[0], 1.0, 1e-12);
        assert_approx_eq!(mean[1], 1.0, 1e-12);

        let cov = weighted_covariance(&rows, &weights, &mean, 4.0);
        assert_approx_eq!(cov[(0, 0)], 1.0, 1e-12);
        assert_approx_eq!(cov[(1, 1)], 1.0, 1e-12);
        assert_approx_eq!(cov[(0, 1)], 0.0, 1e-12);
        assert_approx_eq!(cov[(0, 1)], cov[(1, 0)], 1e-15);
    }

    #[test]
    fn test_weighted_moments_respect_weights() {
        let rows = DMatrix::from_row_slice(2, 1, &[0.0, 10.0]);
        let weights = [3.0, 1.0];
        let mean = weighted_mean(&rows, &weights, 4.0);
        assert_approx_eq!(mean[0], 2.5, 1e-12);
    }
}
