//! Sufficient-statistics accumulator for diagonal-covariance GMM training.
//!
//! Holds the per-component running sums an M-step needs: occupancy, weighted
//! feature sums, and weighted squared-feature sums. Which buffers are
//! populated is controlled by an update-flags mask; buffers outside the mask
//! are never allocated or written. Accumulation is a commutative sum of
//! independent per-frame contributions, so two accumulators over disjoint
//! data merge by elementwise addition into the same result a single
//! sequential pass would produce.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::diag_gmm::DiagGmm;
use crate::errors::{validate_dimension, GmmResult, GmmStatsError};
use crate::math_utils::softmax_in_place;

/// Selects which accumulator buffers are populated, as a non-empty subset of
/// {weights, means, variances}.
///
/// Mean statistics are also collected when only variances are requested,
/// since the variance update needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UpdateFlags {
    /// Accumulate occupancy for the weight update
    pub weights: bool,
    /// Accumulate weighted feature sums for the mean update
    pub means: bool,
    /// Accumulate weighted squared-feature sums for the variance update
    pub variances: bool,
}

impl UpdateFlags {
    /// All statistic kinds enabled.
    pub fn all() -> Self {
        Self {
            weights: true,
            means: true,
            variances: true,
        }
    }

    /// Whether the mean buffer is needed under this mask.
    pub fn needs_mean_acc(&self) -> bool {
        self.means || self.variances
    }

    /// Whether the variance buffer is needed under this mask.
    pub fn needs_var_acc(&self) -> bool {
        self.variances
    }
}

impl FromStr for UpdateFlags {
    type Err = GmmStatsError;

    /// Parses a flag string over the alphabet `w` (weights), `m` (means),
    /// `v` (variances), e.g. `"mvw"` or `"w"`.
    fn from_str(s: &str) -> GmmResult<Self> {
        let mut flags = Self {
            weights: false,
            means: false,
            variances: false,
        };
        for ch in s.chars() {
            match ch {
                'w' => flags.weights = true,
                'm' => flags.means = true,
                'v' => flags.variances = true,
                other => {
                    return Err(GmmStatsError::InvalidParameter {
                        parameter: "update-flags".to_string(),
                        value: other as u32 as f64,
                        constraint: format!("characters from \"wmv\", got '{}'", other),
                    })
                }
            }
        }
        if !(flags.weights || flags.means || flags.variances) {
            return Err(GmmStatsError::InvalidParameter {
                parameter: "update-flags".to_string(),
                value: 0.0,
                constraint: "non-empty subset of \"wmv\"".to_string(),
            });
        }
        Ok(flags)
    }
}

impl fmt::Display for UpdateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weights {
            write!(f, "w")?;
        }
        if self.means {
            write!(f, "m")?;
        }
        if self.variances {
            write!(f, "v")?;
        }
        Ok(())
    }
}

/// Running sufficient statistics for one diagonal-covariance GMM.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct AccumDiagGmm {
    flags: UpdateFlags,
    num_comps: usize,
    dim: usize,
    /// Per-component total responsibility (C)
    occupancy: Vec<f64>,
    /// Per-component weighted feature sums (C×D); empty when not requested
    mean_acc: Vec<Vec<f64>>,
    /// Per-component weighted squared-feature sums (C×D); empty when not requested
    var_acc: Vec<Vec<f64>>,
}

impl AccumDiagGmm {
    /// Creates a zeroed accumulator sized against `model`, allocating only
    /// the buffers the flag mask requires.
    pub fn new(model: &DiagGmm, flags: UpdateFlags) -> Self {
        let num_comps = model.num_comps();
        let dim = model.dim();
        let mean_acc = if flags.needs_mean_acc() {
            vec![vec![0.0; dim]; num_comps]
        } else {
            Vec::new()
        };
        let var_acc = if flags.needs_var_acc() {
            vec![vec![0.0; dim]; num_comps]
        } else {
            Vec::new()
        };
        Self {
            flags,
            num_comps,
            dim,
            occupancy: vec![0.0; num_comps],
            mean_acc,
            var_acc,
        }
    }

    /// Update-flags mask this accumulator was created with.
    pub fn flags(&self) -> UpdateFlags {
        self.flags
    }

    /// Number of components.
    pub fn num_comps(&self) -> usize {
        self.num_comps
    }

    /// Feature dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Per-component occupancy sums.
    pub fn occupancy(&self) -> &[f64] {
        &self.occupancy
    }

    /// Per-component weighted feature sums; empty if the mask requested
    /// neither means nor variances.
    pub fn mean_acc(&self) -> &[Vec<f64>] {
        &self.mean_acc
    }

    /// Per-component weighted squared-feature sums; empty if variances were
    /// not requested.
    pub fn var_acc(&self) -> &[Vec<f64>] {
        &self.var_acc
    }

    /// Folds one frame's responsibility for a single component into the
    /// statistics.
    ///
    /// A responsibility of exactly zero is a true no-op: no buffer is read
    /// or written, so repeated zero-weight calls cannot drift the sums.
    pub fn accumulate_for_component(
        &mut self,
        frame: &[f64],
        comp: usize,
        responsibility: f64,
    ) -> GmmResult<()> {
        if responsibility == 0.0 {
            return Ok(());
        }
        if comp >= self.num_comps {
            return Err(GmmStatsError::ComponentOutOfRange {
                index: comp,
                num_comps: self.num_comps,
            });
        }
        validate_dimension(self.dim, frame.len())?;

        self.occupancy[comp] += responsibility;
        if self.flags.needs_mean_acc() {
            let mean_row = &mut self.mean_acc[comp];
            for d in 0..self.dim {
                mean_row[d] += responsibility * frame[d];
            }
        }
        if self.flags.needs_var_acc() {
            let var_row = &mut self.var_acc[comp];
            for d in 0..self.dim {
                var_row[d] += responsibility * frame[d] * frame[d];
            }
        }
        Ok(())
    }

    /// Scores `frame` against the full model, normalizes, scales the
    /// posteriors by `frame_weight`, and accumulates every component.
    ///
    /// This is the fast path for frames with no candidate preselection.
    /// Returns the frame's unweighted total log-likelihood; weighting it
    /// into corpus totals is the caller's job.
    pub fn accumulate_from_model(
        &mut self,
        model: &DiagGmm,
        frame: &[f64],
        frame_weight: f64,
    ) -> GmmResult<f64> {
        debug_assert_eq!(model.num_comps(), self.num_comps);
        let mut posteriors = model.log_likelihoods(frame)?;
        let total = softmax_in_place(&mut posteriors);
        for (comp, &post) in posteriors.iter().enumerate() {
            self.accumulate_for_component(frame, comp, frame_weight * post)?;
        }
        Ok(total)
    }

    /// Merges another accumulator into this one by elementwise summation.
    ///
    /// Both accumulators must have been sized against the same model with
    /// the same flag mask. This is the merge step of the per-worker
    /// accumulation scheme: summing private accumulators is the same
    /// commutative operation as within-utterance accumulation.
    pub fn merge(&mut self, other: &AccumDiagGmm) -> GmmResult<()> {
        if self.flags != other.flags {
            return Err(GmmStatsError::InternalInvariant {
                reason: format!(
                    "cannot merge accumulators with flags \"{}\" and \"{}\"",
                    self.flags, other.flags
                ),
            });
        }
        if self.num_comps != other.num_comps {
            return Err(GmmStatsError::InternalInvariant {
                reason: format!(
                    "cannot merge accumulators with {} and {} components",
                    self.num_comps, other.num_comps
                ),
            });
        }
        validate_dimension(self.dim, other.dim)?;

        for (a, b) in self.occupancy.iter_mut().zip(other.occupancy.iter()) {
            *a += b;
        }
        for (row_a, row_b) in self.mean_acc.iter_mut().zip(other.mean_acc.iter()) {
            for (a, b) in row_a.iter_mut().zip(row_b.iter()) {
                *a += b;
            }
        }
        for (row_a, row_b) in self.var_acc.iter_mut().zip(other.var_acc.iter()) {
            for (a, b) in row_a.iter_mut().zip(row_b.iter()) {
                *a += b;
            }
        }
        Ok(())
    }

    /// Total occupancy over all components.
    pub fn total_occupancy(&self) -> f64 {
        self.occupancy.iter().sum()
    }

    /// Structural validation after deserialization: buffer shapes must match
    /// the declared (C, D) and flag mask.
    pub fn validate(&self) -> GmmResult<()> {
        if self.num_comps == 0 || self.dim == 0 {
            return Err(GmmStatsError::InvalidModel {
                reason: "accumulator has zero components or zero dimension".to_string(),
            });
        }
        if self.occupancy.len() != self.num_comps {
            return Err(GmmStatsError::InvalidModel {
                reason: format!(
                    "occupancy has {} entries, expected {}",
                    self.occupancy.len(),
                    self.num_comps
                ),
            });
        }
        let check_matrix = |buf: &[Vec<f64>], needed: bool, name: &str| -> GmmResult<()> {
            if needed {
                if buf.len() != self.num_comps || buf.iter().any(|row| row.len() != self.dim) {
                    return Err(GmmStatsError::InvalidModel {
                        reason: format!("{} buffer has wrong shape", name),
                    });
                }
            } else if !buf.is_empty() {
                return Err(GmmStatsError::InvalidModel {
                    reason: format!("{} buffer present but not requested by flags", name),
                });
            }
            Ok(())
        };
        check_matrix(&self.mean_acc, self.flags.needs_mean_acc(), "mean")?;
        check_matrix(&self.var_acc, self.flags.needs_var_acc(), "variance")?;
        Ok(())
    }
}
