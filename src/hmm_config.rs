//! Caller-facing configuration for HMM training.

use crate::math_utils::constants;
use std::time::Duration;

/// Configuration for fitting a Gaussian HMM.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HmmConfig {
    /// Maximum number of EM iterations
    pub max_iterations: usize,
    /// Convergence tolerance in log-likelihood units
    pub convergence_tolerance: f64,
    /// Diagonal shrinkage applied to re-estimated covariance matrices
    pub covariance_regularization: f64,
    /// Seed for the initialization RNG; fixed seed gives reproducible fits
    pub seed: u64,
    /// Optional wall-clock budget, checked before each EM iteration
    pub max_fit_time: Option<Duration>,
    /// Run the E-step across segments on the rayon thread pool
    pub parallel: bool,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,            // Matches the usual library default
            convergence_tolerance: 1e-4,    // Log-likelihood units
            covariance_regularization: constants::DEFAULT_COVARIANCE_REGULARIZATION,
            seed: 42,
            max_fit_time: None,             // No deadline unless the caller sets one
            parallel: true,
        }
    }
}

impl HmmConfig {
    /// Configuration with a wall-clock budget for latency-sensitive callers.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            max_fit_time: Some(budget),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HmmConfig::default();
        assert_eq!(config.max_iterations, 200);
        assert!(config.convergence_tolerance > 0.0);
        assert!(config.covariance_regularization > 0.0);
        assert!(config.max_fit_time.is_none());
    }

    #[test]
    fn test_deadline_config() {
        let config = HmmConfig::with_deadline(Duration::from_millis(250));
        assert_eq!(config.max_fit_time, Some(Duration::from_millis(250)));
        assert_eq!(config.max_iterations, 200);
    }
}
