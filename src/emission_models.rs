//! Multivariate Gaussian emission model for hidden states.
//!
//! Each hidden state emits observations from a state-specific multivariate
//! normal distribution. The precision matrix and covariance log-determinant
//! are cached alongside the covariance so the per-observation log-density is
//! a single quadratic form; the caches are refreshed together after every
//! covariance update.

use crate::{
    errors::HmmResult,
    linear_algebra::{cholesky_log_det, regularized_cholesky, weighted_covariance, weighted_mean},
    math_utils::constants,
};
use nalgebra::{DMatrix, DVector};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Emission parameters for one hidden state.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmissionParameters {
    /// Mean vector of the state's Gaussian (length D)
    pub mean: DVector<f64>,
    /// Covariance matrix (D x D, symmetric positive-definite)
    pub covariance: DMatrix<f64>,
    /// Inverse covariance matrix (cached for the log-density quadratic form)
    pub precision: DMatrix<f64>,
    /// Log determinant of the covariance matrix (cached)
    pub log_det_cov: f64,
}

impl EmissionParameters {
    /// Creates a standard-normal emission: zero mean, identity covariance.
    ///
    /// The caches are exact for the identity, so no factorization is needed.
    pub fn new(dim: usize) -> Self {
        Self {
            mean: DVector::zeros(dim),
            covariance: DMatrix::identity(dim, dim),
            precision: DMatrix::identity(dim, dim),
            log_det_cov: 0.0,
        }
    }

    /// Builds emission parameters from a mean and covariance estimate.
    pub fn from_moments(
        mean: DVector<f64>,
        covariance: DMatrix<f64>,
        regularization: f64,
    ) -> HmmResult<Self> {
        let dim = mean.len();
        let mut params = Self {
            mean,
            covariance,
            precision: DMatrix::identity(dim, dim),
            log_det_cov: 0.0,
        };
        params.update_cached_values(regularization)?;
        Ok(params)
    }

    /// Observation dimensionality of this state.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Refreshes the precision matrix and log-determinant from the covariance.
    ///
    /// Applies diagonal shrinkage before factorizing; if the decomposition
    /// still fails after the ridge retry the error propagates and the state
    /// is considered numerically degenerate.
    pub fn update_cached_values(&mut self, regularization: f64) -> HmmResult<()> {
        let dim = self.dim();
        for i in 0..dim {
            self.covariance[(i, i)] += regularization;
        }

        let chol = regularized_cholesky(&self.covariance, regularization)?;
        self.log_det_cov = cholesky_log_det(&chol);
        self.precision = chol.inverse();
        Ok(())
    }

    /// Log-density of an observation under this state's Gaussian.
    ///
    /// `-0.5 * (D ln 2π + ln|Σ| + (x-μ)ᵀ Σ⁻¹ (x-μ))`, computed through the
    /// cached precision matrix. The value is never clamped: truncating the
    /// tail would silently break the EM monotonicity invariant.
    pub fn log_likelihood(&self, observation: &DVector<f64>) -> f64 {
        let diff = observation - &self.mean;
        let mahalanobis_sq = diff.dot(&(&self.precision * &diff));

        let log_prob =
            -0.5 * (self.dim() as f64 * constants::LN_TWO_PI + self.log_det_cov + mahalanobis_sq);
        debug_assert!(!log_prob.is_nan());
        log_prob
    }

    /// Re-estimates the mean and covariance from responsibility-weighted rows.
    ///
    /// Returns `Ok(false)` without touching the parameters when the total
    /// responsibility falls below [`constants::MIN_STATE_WEIGHT`] — an
    /// effectively unused state keeps its previous parameters for this
    /// iteration rather than collapsing to a singular covariance.
    pub fn reestimate(
        &mut self,
        observations: &DMatrix<f64>,
        responsibilities: &[f64],
        regularization: f64,
    ) -> HmmResult<bool> {
        let total_weight: f64 = responsibilities.iter().sum();
        if total_weight < constants::MIN_STATE_WEIGHT {
            return Ok(false);
        }

        let mean = weighted_mean(observations, responsibilities, total_weight);
        let covariance = weighted_covariance(observations, responsibilities, &mean, total_weight);

        self.mean = mean;
        self.covariance = covariance;
        self.update_cached_values(regularization)?;
        Ok(true)
    }
}
