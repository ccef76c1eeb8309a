//! Diagonal-covariance Gaussian mixture model and per-frame scoring.
//!
//! The model is immutable for the lifetime of an accumulation run: it is
//! built once from its parameters, caches the per-component log-normalization
//! constants and inverse variances, and after that only answers scoring
//! queries. Per-frame log-likelihood for component c is
//!
//! ```text
//! log ℓ_c = log(weight_c) - 0.5 * Σ_d [ (x_d - mean_{c,d})² / var_{c,d} + log(2π·var_{c,d}) ]
//! ```
//!
//! with the data-independent part folded into the cached constant so the hot
//! loop is a single fused pass over the dimensions.

use crate::errors::{validate_all_finite, validate_dimension, GmmResult, GmmStatsError};
use crate::math_utils::LOG_2PI;

/// Immutable diagonal-covariance Gaussian mixture model.
#[derive(Debug, Clone)]
pub struct DiagGmm {
    /// Component weights, each > 0
    weights: Vec<f64>,
    /// Per-component mean vectors (C×D)
    means: Vec<Vec<f64>>,
    /// Per-component diagonal variances (C×D), each entry > 0
    vars: Vec<Vec<f64>>,
    /// Cached inverse variances (C×D)
    inv_vars: Vec<Vec<f64>>,
    /// Cached log(weight_c) - 0.5·Σ_d log(2π·var_{c,d})
    gconsts: Vec<f64>,
    /// Feature dimension D
    dim: usize,
}

impl DiagGmm {
    /// Builds a model from weights, means, and diagonal variances,
    /// validating structure and precomputing the scoring constants.
    pub fn new(
        weights: Vec<f64>,
        means: Vec<Vec<f64>>,
        vars: Vec<Vec<f64>>,
    ) -> GmmResult<Self> {
        let num_comps = weights.len();
        if num_comps == 0 {
            return Err(GmmStatsError::InvalidModel {
                reason: "model has zero components".to_string(),
            });
        }
        if means.len() != num_comps || vars.len() != num_comps {
            return Err(GmmStatsError::InvalidModel {
                reason: format!(
                    "component count mismatch: {} weights, {} means, {} vars",
                    num_comps,
                    means.len(),
                    vars.len()
                ),
            });
        }

        let dim = means[0].len();
        if dim == 0 {
            return Err(GmmStatsError::InvalidModel {
                reason: "model has zero feature dimension".to_string(),
            });
        }

        for (c, (mean, var)) in means.iter().zip(vars.iter()).enumerate() {
            if mean.len() != dim || var.len() != dim {
                return Err(GmmStatsError::InvalidModel {
                    reason: format!(
                        "component {} has dim ({}, {}), expected {}",
                        c,
                        mean.len(),
                        var.len(),
                        dim
                    ),
                });
            }
            validate_all_finite(mean, "mean")?;
            validate_all_finite(var, "var")?;
            if var.iter().any(|&v| v <= 0.0) {
                return Err(GmmStatsError::InvalidModel {
                    reason: format!("component {} has a non-positive variance", c),
                });
            }
        }
        for (c, &w) in weights.iter().enumerate() {
            if !w.is_finite() || w <= 0.0 {
                return Err(GmmStatsError::InvalidModel {
                    reason: format!("component {} has non-positive weight {}", c, w),
                });
            }
        }

        let inv_vars: Vec<Vec<f64>> = vars
            .iter()
            .map(|var| var.iter().map(|&v| 1.0 / v).collect())
            .collect();

        let gconsts: Vec<f64> = weights
            .iter()
            .zip(vars.iter())
            .map(|(&w, var)| {
                let log_norm: f64 = var.iter().map(|&v| (LOG_2PI + v.ln())).sum();
                w.ln() - 0.5 * log_norm
            })
            .collect();

        Ok(Self {
            weights,
            means,
            vars,
            inv_vars,
            gconsts,
            dim,
        })
    }

    /// Number of mixture components.
    pub fn num_comps(&self) -> usize {
        self.weights.len()
    }

    /// Feature dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Component weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Component mean vectors.
    pub fn means(&self) -> &[Vec<f64>] {
        &self.means
    }

    /// Component diagonal variances.
    pub fn vars(&self) -> &[Vec<f64>] {
        &self.vars
    }

    /// Log-likelihood of `frame` under a single component.
    ///
    /// Assumes the frame dimension has already been checked.
    fn component_log_likelihood(&self, frame: &[f64], comp: usize) -> f64 {
        let mean = &self.means[comp];
        let inv_var = &self.inv_vars[comp];
        let mut quad = 0.0;
        for d in 0..self.dim {
            let diff = frame[d] - mean[d];
            quad += diff * diff * inv_var[d];
        }
        self.gconsts[comp] - 0.5 * quad
    }

    /// Scores one frame against every component.
    pub fn log_likelihoods(&self, frame: &[f64]) -> GmmResult<Vec<f64>> {
        validate_dimension(self.dim, frame.len())?;
        Ok((0..self.num_comps())
            .map(|c| self.component_log_likelihood(frame, c))
            .collect())
    }

    /// Scores one frame against a restricted candidate subset, in candidate
    /// order.
    ///
    /// An empty candidate set is a broken caller contract and fails as an
    /// internal invariant violation; an out-of-range index is rejected before
    /// any scoring happens.
    pub fn log_likelihoods_preselect(
        &self,
        frame: &[f64],
        candidates: &[usize],
    ) -> GmmResult<Vec<f64>> {
        validate_dimension(self.dim, frame.len())?;
        if candidates.is_empty() {
            return Err(GmmStatsError::InternalInvariant {
                reason: "empty candidate set reached the scorer".to_string(),
            });
        }
        let num_comps = self.num_comps();
        for &c in candidates {
            if c >= num_comps {
                return Err(GmmStatsError::ComponentOutOfRange {
                    index: c,
                    num_comps,
                });
            }
        }
        Ok(candidates
            .iter()
            .map(|&c| self.component_log_likelihood(frame, c))
            .collect())
    }
}
