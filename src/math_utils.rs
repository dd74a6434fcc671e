//! Scalar numerical utilities for log-space probability arithmetic.

/// Numerical constants used throughout the engine.
pub mod constants {
    /// ln(2π), the normalization constant of the Gaussian log-density.
    pub const LN_TWO_PI: f64 = 1.8378770664093454835606594728112;

    /// Default diagonal regularization applied to re-estimated covariances.
    pub const DEFAULT_COVARIANCE_REGULARIZATION: f64 = 1e-6;

    /// Minimum total responsibility below which a state's emission
    /// parameters are frozen for the iteration instead of re-estimated.
    pub const MIN_STATE_WEIGHT: f64 = 1e-10;

    /// Floor applied to probability entries before renormalization so no
    /// state or transition becomes exactly unreachable.
    pub const PROB_FLOOR: f64 = 1e-10;

    /// Relative slack allowed for log-likelihood decreases before the EM
    /// monotonicity invariant is considered violated.
    pub const LOG_LIKELIHOOD_SLACK: f64 = 1e-6;
}

/// Computes `log(Σ exp(v_i))` with the max-shift trick.
///
/// Returns `f64::NEG_INFINITY` for an empty slice or when every input is
/// negative infinity (no valid path).
///
/// # Example
/// ```rust
/// use trajectory_hmm::math_utils::log_sum_exp;
///
/// let result = log_sum_exp(&[0.0_f64.ln(), 1.0_f64.ln()]);
/// assert!((result - 1.0_f64.ln()).abs() < 1e-12);
/// assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
/// ```
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max_val = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max_val == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|&v| (v - max_val).exp()).sum();
    max_val + sum.ln()
}

/// Clamps each entry to at least `floor` and renormalizes the row to sum 1.
///
/// Rows with no mass at all become uniform rather than NaN.
pub fn normalize_probabilities(row: &mut [f64], floor: f64) {
    if row.is_empty() {
        return;
    }

    let mut sum = 0.0;
    for p in row.iter_mut() {
        if !p.is_finite() || *p < floor {
            *p = floor;
        }
        sum += *p;
    }

    if sum > 0.0 {
        let inv_sum = 1.0 / sum;
        for p in row.iter_mut() {
            *p *= inv_sum;
        }
    } else {
        let uniform = 1.0 / row.len() as f64;
        for p in row.iter_mut() {
            *p = uniform;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_log_sum_exp_basic() {
        // log(e^0 + e^0) = ln 2
        assert_approx_eq!(log_sum_exp(&[0.0, 0.0]), 2.0_f64.ln(), 1e-12);

        // Single value is returned unchanged
        assert_approx_eq!(log_sum_exp(&[-3.5]), -3.5, 1e-12);
    }

    #[test]
    fn test_log_sum_exp_extreme_values() {
        // Naive exp would overflow; max-shift must not
        let result = log_sum_exp(&[1000.0, 1000.0]);
        assert_approx_eq!(result, 1000.0 + 2.0_f64.ln(), 1e-9);

        let result = log_sum_exp(&[-1e9, -1e9 + 1.0]);
        assert!(result.is_finite());
    }

    #[test]
    fn test_log_sum_exp_neg_infinity() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(
            log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]),
            f64::NEG_INFINITY
        );

        // -inf entries are ignored when a finite entry exists
        assert_approx_eq!(log_sum_exp(&[f64::NEG_INFINITY, 0.0]), 0.0, 1e-12);
    }

    #[test]
    fn test_normalize_probabilities() {
        let mut row = [2.0, 2.0, 0.0, 0.0];
        normalize_probabilities(&mut row, 1e-10);
        let sum: f64 = row.iter().sum();
        assert_approx_eq!(sum, 1.0, 1e-12);
        // Floored entries stay strictly positive
        assert!(row.iter().all(|&p| p > 0.0));
    }

    #[test]
    fn test_normalize_probabilities_zero_mass() {
        let mut row = [0.0, 0.0];
        normalize_probabilities(&mut row, 0.0);
        assert_approx_eq!(row[0], 0.5, 1e-12);
        assert_approx_eq!(row[1], 0.5, 1e-12);
    }
}
