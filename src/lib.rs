//! # Trajectory HMM
//!
//! Gaussian-emission hidden Markov models for longitudinal clinical
//! trajectories.
//!
//! This crate is the numerical engine behind trajectory staging of
//! longitudinal patient data: it fits a continuous-observation HMM to a
//! batch of independent observation sequences of possibly unequal length
//! (Baum-Welch over the forward-backward algorithm, entirely in log-space)
//! and decodes the most likely hidden-state path per sequence (Viterbi).
//! Collaborating code owns dataset construction and presentation; the
//! engine consumes an observation matrix plus segment lengths and produces
//! fitted parameters and state labels.
//!
//! ## Key Features
//!
//! - **Multi-sequence training**: segments share parameters but exchange no
//!   other information; unequal lengths (including length 1) are supported
//! - **Numerical robustness**: log-sum-exp recursions, Cholesky-factored
//!   covariances with a regularization retry, probability floors that keep
//!   every state reachable
//! - **Deterministic fits**: all initialization randomness comes from a
//!   seeded ChaCha20 generator owned by the trainer
//! - **Model selection support**: AIC/BIC and free-parameter counts in the
//!   fit summary
//! - **Parallel E-step**: segments fan out across a rayon thread pool with
//!   order-preserving accumulation
//!
//! ## Quick Start
//!
//! ```rust
//! use nalgebra::DMatrix;
//! use trajectory_hmm::{GaussianHmm, HmmConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Three subjects, five visits each, two features per visit
//!     // (e.g. total and enhancing tumor volume)
//!     let observations = DMatrix::from_row_slice(15, 2, &[
//!         22.0, 8.0, 23.0, 8.1, 21.5, 7.8, 22.3, 7.9, 21.8, 7.7,
//!         28.0, 10.0, 30.0, 11.0, 40.0, 16.0, 55.0, 23.0, 70.0, 30.0,
//!         24.0, 9.0, 32.0, 13.0, 38.0, 16.0, 30.0, 11.5, 27.0, 10.0,
//!     ]);
//!     let lengths = [5, 5, 5];
//!
//!     let config = HmmConfig::default();
//!     let (model, summary) = GaussianHmm::fit(&observations, &lengths, 2, &config)?;
//!     println!(
//!         "log-likelihood {:.3} after {} iterations",
//!         summary.log_likelihood, summary.iterations
//!     );
//!
//!     let states = model.decode(&observations, &lengths)?;
//!     assert_eq!(states.len(), 15);
//!     Ok(())
//! }
//! ```
//!
//! ## Scope
//!
//! Emissions are multivariate Gaussian with full covariance; discrete
//! emissions, semi-Markov durations, and streaming updates are out of
//! scope. The engine targets tens of sequences with up to a few hundred
//! observations each and low-dimensional features, favoring clarity and
//! numerical correctness over raw throughput.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod emission_models;
pub mod errors;
pub mod hmm_config;
pub mod hmm_core;
pub mod hmm_results;
pub mod linear_algebra;
pub mod math_utils;

// Re-exports for convenience - main public API
pub use emission_models::EmissionParameters;
pub use errors::{HmmError, HmmResult};
pub use hmm_config::HmmConfig;
pub use hmm_core::GaussianHmm;
pub use hmm_results::{count_free_parameters, FitSummary};
pub use math_utils::log_sum_exp;
