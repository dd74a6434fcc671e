//! Core Gaussian hidden Markov model implementation.
//!
//! This module contains the model container and the sequence algorithms:
//! log-space forward-backward, Baum-Welch parameter estimation over multiple
//! independent segments, and Viterbi decoding.
//!
//! All probability recursions run in log-space. Scaled linear-space variants
//! are faster on short sequences but underflow silently once emission
//! densities get small; with log-sum-exp the worst case is a finite, very
//! negative number that still orders correctly.

use crate::{
    emission_models::EmissionParameters,
    errors::{
        validate_num_states, validate_observations, validate_segment_lengths, HmmError, HmmResult,
    },
    hmm_config::HmmConfig,
    hmm_results::{count_free_parameters, FitSummary},
    linear_algebra::{weighted_covariance, weighted_mean},
    math_utils::{constants, log_sum_exp, normalize_probabilities},
};
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use std::time::Instant;

/// Gaussian-emission hidden Markov model over multivariate observations.
///
/// Hidden states are unlabeled indices `0..K-1`; the engine attaches no
/// semantic meaning to them. Parameters are built by [`GaussianHmm::fit`]
/// and read-only afterwards: decoding and scoring take `&self`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianHmm {
    /// Number of hidden states
    pub num_states: usize,
    /// Observation dimensionality
    pub dim: usize,
    /// Initial state distribution (length K, sums to 1)
    pub initial_probs: Vec<f64>,
    /// Transition probability matrix (K x K, rows sum to 1)
    pub transition_matrix: Vec<Vec<f64>>,
    /// Per-state emission parameters
    pub emission_params: Vec<EmissionParameters>,
}

/// Sufficient statistics gathered from one segment during the E-step.
struct SegmentStats {
    log_likelihood: f64,
    /// Per-timestep state posteriors, linear scale (T x K, rows sum to 1)
    gamma: Vec<Vec<f64>>,
    /// Transition posteriors summed over the segment's timesteps (K x K)
    xi_sums: Vec<Vec<f64>>,
}

/// Contiguous row ranges of each segment within the observation matrix.
fn segment_bounds(lengths: &[usize]) -> Vec<(usize, usize)> {
    let mut bounds = Vec::with_capacity(lengths.len());
    let mut start = 0;
    for &len in lengths {
        bounds.push((start, start + len));
        start += len;
    }
    bounds
}

impl GaussianHmm {
    /// Fits a `num_states`-state model to segmented observations with
    /// Baum-Welch.
    ///
    /// `observations` holds one observation per row; `lengths` partitions the
    /// rows into contiguous independent segments. Returns the fitted model
    /// and a [`FitSummary`]; on error, no model (partial or otherwise) is
    /// returned and nothing the caller holds is mutated.
    pub fn fit(
        observations: &DMatrix<f64>,
        lengths: &[usize],
        num_states: usize,
        config: &HmmConfig,
    ) -> HmmResult<(Self, FitSummary)> {
        validate_num_states(num_states)?;
        validate_observations(observations)?;
        validate_segment_lengths(lengths, observations.nrows())?;

        let n = observations.nrows();
        if n < num_states {
            return Err(HmmError::InsufficientData {
                required: num_states,
                actual: n,
            });
        }

        let rows: Vec<DVector<f64>> = (0..n).map(|i| observations.row(i).transpose()).collect();
        let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
        let mut model = Self::initialize(observations, &rows, num_states, config, &mut rng)?;

        let bounds = segment_bounds(lengths);
        let started = Instant::now();

        let mut prev_log_likelihood = f64::NEG_INFINITY;
        let mut log_likelihood = f64::NEG_INFINITY;
        let mut converged = false;
        let mut iterations = 0;
        let mut degenerate_segments = 0;
        let mut frozen_state_updates = 0;

        for iteration in 0..config.max_iterations {
            // Deadline is enforced at iteration granularity only; a usable
            // parameter set exists at every iteration boundary.
            if let Some(budget) = config.max_fit_time {
                if started.elapsed() >= budget {
                    log::debug!(
                        "training stopped by wall-clock budget after {} iterations",
                        iteration
                    );
                    break;
                }
            }

            let (log_initial, log_transition) = model.log_parameters();

            // E-step: segments are independent given the parameters, so they
            // fan out across the thread pool; fan-in below runs in segment
            // order, which keeps accumulation identical to a sequential run.
            let per_segment: Vec<Option<SegmentStats>> = if config.parallel {
                bounds
                    .par_iter()
                    .map(|&(start, end)| {
                        model.segment_statistics(&rows[start..end], &log_initial, &log_transition)
                    })
                    .collect()
            } else {
                bounds
                    .iter()
                    .map(|&(start, end)| {
                        model.segment_statistics(&rows[start..end], &log_initial, &log_transition)
                    })
                    .collect()
            };

            let k = num_states;
            let mut initial_acc = vec![0.0; k];
            let mut xi_acc = vec![vec![0.0; k]; k];
            let mut gamma_all = vec![vec![0.0; k]; n];
            let mut total_log_likelihood = 0.0;
            let mut valid_segments = 0usize;

            for (seg, stats) in per_segment.into_iter().enumerate() {
                let stats = match stats {
                    Some(stats) => stats,
                    None => {
                        degenerate_segments += 1;
                        log::warn!(
                            "segment {} has zero likelihood under current parameters; \
                             excluded from this iteration",
                            seg
                        );
                        continue;
                    }
                };

                let (start, _) = bounds[seg];
                for j in 0..k {
                    initial_acc[j] += stats.gamma[0][j];
                }
                for j in 0..k {
                    for l in 0..k {
                        xi_acc[j][l] += stats.xi_sums[j][l];
                    }
                }
                for (t, row) in stats.gamma.iter().enumerate() {
                    gamma_all[start + t].copy_from_slice(row);
                }
                total_log_likelihood += stats.log_likelihood;
                valid_segments += 1;
            }

            if valid_segments == 0 {
                log::warn!("every segment was excluded this iteration; stopping training");
                break;
            }

            iterations = iteration + 1;
            log_likelihood = total_log_likelihood;
            log::debug!(
                "iteration {}: log-likelihood {:.6}",
                iteration,
                total_log_likelihood
            );

            if iteration > 0 {
                let improvement = total_log_likelihood - prev_log_likelihood;
                let slack =
                    constants::LOG_LIKELIHOOD_SLACK * (1.0 + total_log_likelihood.abs());
                if improvement < -slack {
                    return Err(HmmError::InternalConsistency {
                        reason: format!(
                            "EM log-likelihood decreased from {:.6} to {:.6}",
                            prev_log_likelihood, total_log_likelihood
                        ),
                    });
                }
                if improvement.abs() < config.convergence_tolerance {
                    converged = true;
                    break;
                }
            }

            // M-step: initial distribution is the mean of the first-timestep
            // posteriors over segments.
            for j in 0..k {
                model.initial_probs[j] = initial_acc[j] / valid_segments as f64;
            }
            normalize_probabilities(&mut model.initial_probs, constants::PROB_FLOOR);

            for j in 0..k {
                let row_mass: f64 = xi_acc[j].iter().sum();
                if row_mass > constants::MIN_STATE_WEIGHT {
                    let row = &mut model.transition_matrix[j];
                    for l in 0..k {
                        row[l] = xi_acc[j][l] / row_mass;
                    }
                    normalize_probabilities(row, constants::PROB_FLOOR);
                }
                // A state with no observed outgoing mass keeps its previous row
            }

            let mut weights = vec![0.0; n];
            for j in 0..k {
                for (i, gamma_row) in gamma_all.iter().enumerate() {
                    weights[i] = gamma_row[j];
                }
                let updated = model.emission_params[j].reestimate(
                    observations,
                    &weights,
                    config.covariance_regularization,
                )?;
                if !updated {
                    frozen_state_updates += 1;
                    log::warn!(
                        "state {} received negligible responsibility; \
                         emission parameters frozen this iteration",
                        j
                    );
                }
            }

            prev_log_likelihood = total_log_likelihood;
        }

        let num_parameters = count_free_parameters(num_states, model.dim);
        let aic = -2.0 * log_likelihood + 2.0 * num_parameters as f64;
        let bic = -2.0 * log_likelihood + num_parameters as f64 * (n as f64).ln();

        let summary = FitSummary {
            log_likelihood,
            iterations,
            converged,
            aic,
            bic,
            num_parameters,
            degenerate_segments,
            frozen_state_updates,
        };

        Ok((model, summary))
    }

    /// Decodes the most likely hidden-state path with Viterbi.
    ///
    /// Returns one state index per observation row, segments concatenated in
    /// input order. Ties in the dynamic program break toward the lowest
    /// state index.
    pub fn decode(
        &self,
        observations: &DMatrix<f64>,
        lengths: &[usize],
    ) -> HmmResult<Vec<usize>> {
        validate_observations(observations)?;
        validate_segment_lengths(lengths, observations.nrows())?;
        self.check_dim(observations)?;

        let n = observations.nrows();
        let rows: Vec<DVector<f64>> = (0..n).map(|i| observations.row(i).transpose()).collect();
        let (log_initial, log_transition) = self.log_parameters();
        let bounds = segment_bounds(lengths);

        let paths: Vec<Vec<usize>> = bounds
            .par_iter()
            .map(|&(start, end)| {
                self.viterbi_segment(&rows[start..end], &log_initial, &log_transition)
            })
            .collect();

        Ok(paths.into_iter().flatten().collect())
    }

    /// Total forward log-likelihood of segmented observations under this
    /// model.
    pub fn score(&self, observations: &DMatrix<f64>, lengths: &[usize]) -> HmmResult<f64> {
        validate_observations(observations)?;
        validate_segment_lengths(lengths, observations.nrows())?;
        self.check_dim(observations)?;

        let n = observations.nrows();
        let rows: Vec<DVector<f64>> = (0..n).map(|i| observations.row(i).transpose()).collect();
        let (log_initial, log_transition) = self.log_parameters();

        let mut total = 0.0;
        for (start, end) in segment_bounds(lengths) {
            let log_b = self.emission_log_matrix(&rows[start..end]);
            let (_, _, segment_ll) = self.forward_backward(&log_b, &log_initial, &log_transition);
            total += segment_ll;
        }
        Ok(total)
    }

    /// Smoothed per-row state posteriors via forward-backward.
    ///
    /// Each returned row has length K and sums to 1. A segment with zero
    /// likelihood under the model yields uniform rows and a warning rather
    /// than NaN.
    pub fn posteriors(
        &self,
        observations: &DMatrix<f64>,
        lengths: &[usize],
    ) -> HmmResult<Vec<Vec<f64>>> {
        validate_observations(observations)?;
        validate_segment_lengths(lengths, observations.nrows())?;
        self.check_dim(observations)?;

        let n = observations.nrows();
        let rows: Vec<DVector<f64>> = (0..n).map(|i| observations.row(i).transpose()).collect();
        let (log_initial, log_transition) = self.log_parameters();

        let mut result = Vec::with_capacity(n);
        for (seg, (start, end)) in segment_bounds(lengths).into_iter().enumerate() {
            match self.segment_statistics(&rows[start..end], &log_initial, &log_transition) {
                Some(stats) => result.extend(stats.gamma),
                None => {
                    log::warn!(
                        "segment {} has zero likelihood under the model; \
                         returning uniform posteriors for it",
                        seg
                    );
                    let uniform = vec![1.0 / self.num_states as f64; self.num_states];
                    result.extend(std::iter::repeat(uniform).take(end - start));
                }
            }
        }
        Ok(result)
    }

    /// Builds the initial parameter set from a seeded clustering pass.
    ///
    /// K-means++ seeding plus a bounded k-means over all observation rows
    /// partitions them into `num_states` groups; per-group sample moments
    /// seed the emissions. The initial distribution is uniform and the
    /// transition rows carry a self-transition persistence bias.
    fn initialize(
        observations: &DMatrix<f64>,
        rows: &[DVector<f64>],
        num_states: usize,
        config: &HmmConfig,
        rng: &mut ChaCha20Rng,
    ) -> HmmResult<Self> {
        let dim = observations.ncols();
        let n = rows.len();

        let initial_probs = vec![1.0 / num_states as f64; num_states];

        let mut transition_matrix = vec![vec![0.0; num_states]; num_states];
        if num_states == 1 {
            transition_matrix[0][0] = 1.0;
        } else {
            for i in 0..num_states {
                for j in 0..num_states {
                    transition_matrix[i][j] = if i == j {
                        0.7
                    } else {
                        0.3 / (num_states - 1) as f64
                    };
                }
            }
        }

        let assignments = kmeans_assignments(rows, num_states, rng);

        // Fallback moments for clusters that ended up empty
        let uniform_weights = vec![1.0; n];
        let global_mean = weighted_mean(observations, &uniform_weights, n as f64);
        let global_cov =
            weighted_covariance(observations, &uniform_weights, &global_mean, n as f64);

        let mut emission_params = Vec::with_capacity(num_states);
        let mut weights = vec![0.0; n];
        for state in 0..num_states {
            for (i, w) in weights.iter_mut().enumerate() {
                *w = if assignments[i] == state { 1.0 } else { 0.0 };
            }
            let cluster_weight: f64 = weights.iter().sum();

            let (mean, covariance) = if cluster_weight > 0.0 {
                let mean = weighted_mean(observations, &weights, cluster_weight);
                let covariance =
                    weighted_covariance(observations, &weights, &mean, cluster_weight);
                (mean, covariance)
            } else {
                (global_mean.clone(), global_cov.clone())
            };

            emission_params.push(EmissionParameters::from_moments(
                mean,
                covariance,
                config.covariance_regularization,
            )?);
        }

        Ok(Self {
            num_states,
            dim,
            initial_probs,
            transition_matrix,
            emission_params,
        })
    }

    /// Log-space copies of the initial distribution and transition matrix.
    ///
    /// Probability floors keep every entry strictly positive, so the logs
    /// are always finite.
    fn log_parameters(&self) -> (Vec<f64>, Vec<Vec<f64>>) {
        let log_initial = self.initial_probs.iter().map(|p| p.ln()).collect();
        let log_transition = self
            .transition_matrix
            .iter()
            .map(|row| row.iter().map(|p| p.ln()).collect())
            .collect();
        (log_initial, log_transition)
    }

    /// Per-row, per-state emission log-densities for one segment (T x K).
    fn emission_log_matrix(&self, rows: &[DVector<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|x| {
                self.emission_params
                    .iter()
                    .map(|params| params.log_likelihood(x))
                    .collect()
            })
            .collect()
    }

    /// Log-space forward-backward over one segment.
    ///
    /// Returns `(log_alpha, log_beta, log_likelihood)` where the segment
    /// log-likelihood is `logΣexp` over the final forward column.
    fn forward_backward(
        &self,
        log_b: &[Vec<f64>],
        log_initial: &[f64],
        log_transition: &[Vec<f64>],
    ) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, f64) {
        let t = log_b.len();
        let k = self.num_states;
        let mut log_alpha = vec![vec![0.0; k]; t];
        let mut log_beta = vec![vec![0.0; k]; t];
        let mut scratch = vec![0.0; k];

        for j in 0..k {
            log_alpha[0][j] = log_initial[j] + log_b[0][j];
        }
        for i in 1..t {
            for j in 0..k {
                for p in 0..k {
                    scratch[p] = log_alpha[i - 1][p] + log_transition[p][j];
                }
                log_alpha[i][j] = log_sum_exp(&scratch) + log_b[i][j];
            }
        }

        let log_likelihood = log_sum_exp(&log_alpha[t - 1]);

        // log_beta[t-1] stays 0; a length-1 segment has no backward recursion
        for i in (0..t.saturating_sub(1)).rev() {
            for j in 0..k {
                for p in 0..k {
                    scratch[p] = log_transition[j][p] + log_b[i + 1][p] + log_beta[i + 1][p];
                }
                log_beta[i][j] = log_sum_exp(&scratch);
            }
        }

        (log_alpha, log_beta, log_likelihood)
    }

    /// E-step statistics for one segment, or `None` if the segment is
    /// numerically impossible under the current parameters.
    fn segment_statistics(
        &self,
        rows: &[DVector<f64>],
        log_initial: &[f64],
        log_transition: &[Vec<f64>],
    ) -> Option<SegmentStats> {
        let t = rows.len();
        let k = self.num_states;

        let log_b = self.emission_log_matrix(rows);
        let (log_alpha, log_beta, log_likelihood) =
            self.forward_backward(&log_b, log_initial, log_transition);
        if !log_likelihood.is_finite() {
            return None;
        }

        let mut gamma = vec![vec![0.0; k]; t];
        for i in 0..t {
            for j in 0..k {
                gamma[i][j] = (log_alpha[i][j] + log_beta[i][j] - log_likelihood).exp();
            }
            normalize_probabilities(&mut gamma[i], 0.0);
        }

        // Transition posteriors accumulate directly into a K x K sum; the
        // full T x K x K tensor is never materialized. A length-1 segment
        // contributes no transition statistics.
        let mut xi_sums = vec![vec![0.0; k]; k];
        for i in 0..t.saturating_sub(1) {
            for j in 0..k {
                for l in 0..k {
                    xi_sums[j][l] += (log_alpha[i][j]
                        + log_transition[j][l]
                        + log_b[i + 1][l]
                        + log_beta[i + 1][l]
                        - log_likelihood)
                        .exp();
                }
            }
        }

        Some(SegmentStats {
            log_likelihood,
            gamma,
            xi_sums,
        })
    }

    /// Viterbi dynamic program over one segment, in log-space with
    /// back-pointers.
    fn viterbi_segment(
        &self,
        rows: &[DVector<f64>],
        log_initial: &[f64],
        log_transition: &[Vec<f64>],
    ) -> Vec<usize> {
        let t = rows.len();
        let k = self.num_states;
        let log_b = self.emission_log_matrix(rows);

        let mut delta = vec![vec![0.0; k]; t];
        let mut psi = vec![vec![0usize; k]; t];

        for j in 0..k {
            delta[0][j] = log_initial[j] + log_b[0][j];
        }

        for i in 1..t {
            for j in 0..k {
                let mut max_val = f64::NEG_INFINITY;
                let mut max_idx = 0;
                // Ascending scan with strict '>' keeps the lowest state on ties
                for p in 0..k {
                    let val = delta[i - 1][p] + log_transition[p][j];
                    if val > max_val {
                        max_val = val;
                        max_idx = p;
                    }
                }
                delta[i][j] = max_val + log_b[i][j];
                psi[i][j] = max_idx;
            }
        }

        let mut best_final_state = 0;
        let mut best_final_prob = f64::NEG_INFINITY;
        for j in 0..k {
            if delta[t - 1][j] > best_final_prob {
                best_final_prob = delta[t - 1][j];
                best_final_state = j;
            }
        }

        let mut path = vec![0usize; t];
        path[t - 1] = best_final_state;
        for i in (0..t - 1).rev() {
            path[i] = psi[i + 1][path[i + 1]];
        }
        path
    }

    fn check_dim(&self, observations: &DMatrix<f64>) -> HmmResult<()> {
        if observations.ncols() != self.dim {
            return Err(HmmError::InvalidInput {
                reason: format!(
                    "observation dimensionality {} does not match model dimensionality {}",
                    observations.ncols(),
                    self.dim
                ),
            });
        }
        Ok(())
    }
}

/// Assigns each observation row to one of `num_clusters` groups via
/// k-means++ seeding and a bounded k-means pass.
///
/// All randomness comes from the caller's RNG, so assignments are
/// deterministic for a fixed seed.
fn kmeans_assignments(
    rows: &[DVector<f64>],
    num_clusters: usize,
    rng: &mut ChaCha20Rng,
) -> Vec<usize> {
    const MAX_KMEANS_ITERATIONS: usize = 100;
    const KMEANS_TOLERANCE: f64 = 1e-6;

    let mut centroids = seed_centroids(rows, num_clusters, rng);
    let mut assignments = vec![0usize; rows.len()];
    let dim = rows[0].len();

    for _ in 0..MAX_KMEANS_ITERATIONS {
        // Assignment step: nearest centroid, lowest index on ties
        for (i, row) in rows.iter().enumerate() {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let dist = (row - centroid).norm_squared();
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            assignments[i] = best;
        }

        // Update step
        let mut sums = vec![DVector::zeros(dim); num_clusters];
        let mut counts = vec![0usize; num_clusters];
        for (row, &c) in rows.iter().zip(assignments.iter()) {
            sums[c] += row;
            counts[c] += 1;
        }

        let mut max_shift = 0.0f64;
        for c in 0..num_clusters {
            if counts[c] > 0 {
                let new_centroid = &sums[c] / counts[c] as f64;
                max_shift = max_shift.max((&new_centroid - &centroids[c]).norm());
                centroids[c] = new_centroid;
            }
            // Empty clusters keep their centroid
        }

        if max_shift < KMEANS_TOLERANCE {
            break;
        }
    }

    assignments
}

/// K-means++ centroid seeding: each new centroid is drawn with probability
/// proportional to its squared distance from the nearest existing one.
fn seed_centroids(
    rows: &[DVector<f64>],
    num_clusters: usize,
    rng: &mut ChaCha20Rng,
) -> Vec<DVector<f64>> {
    let mut centroids = Vec::with_capacity(num_clusters);
    centroids.push(rows[rng.gen_range(0..rows.len())].clone());

    while centroids.len() < num_clusters {
        let mut distances = Vec::with_capacity(rows.len());
        let mut total = 0.0;
        for row in rows {
            let nearest = centroids
                .iter()
                .map(|c| (row - c).norm_squared())
                .fold(f64::INFINITY, f64::min);
            distances.push(nearest);
            total += nearest;
        }

        let target = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut chosen = 0;
        for (i, &dist) in distances.iter().enumerate() {
            cumulative += dist;
            if cumulative >= target {
                chosen = i;
                break;
            }
        }
        centroids.push(rows[chosen].clone());
    }

    centroids
}
