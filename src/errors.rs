//! Error types and input validation for HMM training and decoding.
//!
//! All validation runs before any numerical work begins, so a failed call
//! never leaves a partially updated model behind.

use thiserror::Error;

/// Error types for HMM operations.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum HmmError {
    /// Input shapes or values are inconsistent with the requested operation.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Description of the violated input contract
        reason: String,
    },

    /// Too few observation rows for the requested model size.
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Minimum required observation rows
        required: usize,
        /// Actual number of observation rows provided
        actual: usize,
    },

    /// A covariance matrix is not positive definite even after regularization.
    #[error("Covariance matrix is not positive definite: {reason}")]
    NonPositiveDefinite {
        /// Context for the failed factorization
        reason: String,
    },

    /// The EM log-likelihood decreased beyond floating-point slack.
    ///
    /// This indicates an implementation bug, not bad data, and is always fatal.
    #[error("Internal consistency violation: {reason}")]
    InternalConsistency {
        /// Description of the violated invariant
        reason: String,
    },
}

/// Result type for HMM operations.
pub type HmmResult<T> = Result<T, HmmError>;

/// Validates the segment-length list against the observation matrix.
///
/// Every length must be positive and the lengths must sum to `total_rows`.
///
/// # Example
/// ```rust
/// use trajectory_hmm::errors::validate_segment_lengths;
///
/// assert!(validate_segment_lengths(&[5, 5, 5], 15).is_ok());
/// assert!(validate_segment_lengths(&[5, 5, 5, 0], 15).is_err());
/// assert!(validate_segment_lengths(&[5, 5, 4], 15).is_err());
/// ```
pub fn validate_segment_lengths(lengths: &[usize], total_rows: usize) -> HmmResult<()> {
    if lengths.is_empty() {
        return Err(HmmError::InvalidInput {
            reason: "segment length list is empty".to_string(),
        });
    }

    for (i, &len) in lengths.iter().enumerate() {
        if len == 0 {
            return Err(HmmError::InvalidInput {
                reason: format!("segment {} has non-positive length", i),
            });
        }
    }

    let sum: usize = lengths.iter().sum();
    if sum != total_rows {
        return Err(HmmError::InvalidInput {
            reason: format!(
                "segment lengths sum to {} but observation matrix has {} rows",
                sum, total_rows
            ),
        });
    }

    Ok(())
}

/// Validates the requested number of hidden states.
pub fn validate_num_states(num_states: usize) -> HmmResult<()> {
    if num_states < 1 {
        return Err(HmmError::InvalidInput {
            reason: "number of states must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Validates that an observation matrix is non-empty and finite.
pub fn validate_observations(observations: &nalgebra::DMatrix<f64>) -> HmmResult<()> {
    if observations.nrows() == 0 || observations.ncols() == 0 {
        return Err(HmmError::InvalidInput {
            reason: format!(
                "observation matrix must be non-empty, got {}x{}",
                observations.nrows(),
                observations.ncols()
            ),
        });
    }

    if observations.iter().any(|v| !v.is_finite()) {
        return Err(HmmError::InvalidInput {
            reason: "observation matrix contains non-finite values".to_string(),
        });
    }

    Ok(())
}
