//! Training summary and model-selection criteria.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Summary of a completed `fit` call.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitSummary {
    /// Total log-likelihood of the training data under the final parameters
    pub log_likelihood: f64,
    /// Number of EM iterations performed
    pub iterations: usize,
    /// Whether the tolerance criterion was met before the iteration or time
    /// budget ran out
    pub converged: bool,
    /// Akaike Information Criterion
    pub aic: f64,
    /// Bayesian Information Criterion
    pub bic: f64,
    /// Number of free model parameters
    pub num_parameters: usize,
    /// Segment evaluations excluded for a `-inf` log-likelihood, summed over
    /// all iterations
    pub degenerate_segments: usize,
    /// Emission updates skipped because a state received negligible
    /// responsibility, summed over all iterations
    pub frozen_state_updates: usize,
}

/// Number of free parameters of a K-state, D-dimensional Gaussian HMM.
///
/// Initial distribution contributes K-1 (sums to 1), each transition row
/// K-1, each state a mean of D and a symmetric covariance of D(D+1)/2.
pub fn count_free_parameters(num_states: usize, dim: usize) -> usize {
    let initial_params = num_states - 1;
    let transition_params = num_states * (num_states - 1);
    let emission_params = num_states * (dim + dim * (dim + 1) / 2);

    initial_params + transition_params + emission_params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_free_parameters() {
        // 1 state, 1 feature: no initial/transition freedom, mean + variance
        assert_eq!(count_free_parameters(1, 1), 2);

        // 3 states, 2 features: 2 + 6 + 3 * (2 + 3)
        assert_eq!(count_free_parameters(3, 2), 23);
    }
}
