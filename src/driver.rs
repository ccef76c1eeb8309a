//! Per-utterance and per-corpus accumulation loop.
//!
//! The driver owns the control flow: it resolves the optional per-utterance
//! weight and candidate-selection entries up front, then walks the frames,
//! scoring, normalizing, and folding weighted responsibilities into the
//! accumulator. Because both resolution steps complete before any frame is
//! touched, an utterance either contributes all of its frames or none of
//! them; the only partial-contribution mechanism is the zero-weight frame,
//! which is fully inert by construction.
//!
//! Recoverable per-utterance conditions are modeled as [`UtteranceOutcome::
//! Skipped`] values consumed by the corpus loop, not as errors; the error
//! channel is reserved for fatal conditions (malformed stream, dimension
//! mismatch, an empty candidate list reaching the scorer) that abort the
//! whole run.

use std::fmt;

use crate::accumulator::AccumDiagGmm;
use crate::archive::{FeatureEntry, RandomAccessTable};
use crate::diag_gmm::DiagGmm;
use crate::errors::GmmResult;
use crate::math_utils::softmax_in_place;

/// Why an utterance was skipped without touching the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A weights archive is configured but has no entry for this utterance.
    MissingWeights,
    /// The weight vector length does not match the frame count.
    WeightLengthMismatch {
        /// Frame count of the utterance
        expected: usize,
        /// Length of the weight vector found
        actual: usize,
    },
    /// The weight vector contains a negative or NaN entry.
    InvalidWeights,
    /// A selection archive is configured but has no entry for this utterance.
    MissingSelection,
    /// The selection list length does not match the frame count.
    SelectionLengthMismatch {
        /// Frame count of the utterance
        expected: usize,
        /// Length of the selection list found
        actual: usize,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingWeights => write!(f, "no per-frame weights available"),
            SkipReason::WeightLengthMismatch { expected, actual } => write!(
                f,
                "weights have wrong length {} vs. {} frames",
                actual, expected
            ),
            SkipReason::InvalidWeights => write!(f, "weights contain a negative or NaN entry"),
            SkipReason::MissingSelection => write!(f, "no candidate-selection entry available"),
            SkipReason::SelectionLengthMismatch { expected, actual } => write!(
                f,
                "candidate selection has wrong length {} vs. {} frames",
                actual, expected
            ),
        }
    }
}

/// Likelihood and weight totals for one processed utterance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtteranceStats {
    /// Σ over contributing frames of weight × frame log-likelihood
    pub log_like: f64,
    /// Σ over contributing frames of frame weight
    pub weight: f64,
}

impl UtteranceStats {
    /// Weighted average log-likelihood per frame, or `None` when no frame
    /// carried weight.
    pub fn avg_log_like(&self) -> Option<f64> {
        if self.weight == 0.0 {
            None
        } else {
            Some(self.log_like / self.weight)
        }
    }
}

/// Result of driving one utterance through the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum UtteranceOutcome {
    /// All frames processed; totals attached.
    Processed(UtteranceStats),
    /// Resolution failed; nothing was accumulated.
    Skipped(SkipReason),
}

/// Corpus-wide running totals. Reporting only; they never feed back into
/// accumulator state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorpusStats {
    /// Total weighted log-likelihood
    pub total_log_like: f64,
    /// Total frame weight
    pub total_weight: f64,
    /// Utterances processed successfully
    pub num_processed: usize,
    /// Utterances skipped with a recoverable error
    pub num_skipped: usize,
}

impl CorpusStats {
    /// Overall weighted average log-likelihood per frame, or `None` when the
    /// total weight is exactly zero (reported as undefined, not an error).
    pub fn avg_log_like(&self) -> Option<f64> {
        if self.total_weight == 0.0 {
            None
        } else {
            Some(self.total_log_like / self.total_weight)
        }
    }
}

/// Drives accumulation for a stream of utterances against one model.
///
/// The accumulator is exclusively borrowed for the duration of the run;
/// there is no shared or global state. A parallel extension would give each
/// worker a private accumulator and [`AccumDiagGmm::merge`] the results.
pub struct AccumulationDriver<'a> {
    model: &'a DiagGmm,
    acc: &'a mut AccumDiagGmm,
    weights: Option<&'a RandomAccessTable<Vec<f64>>>,
    gselect: Option<&'a RandomAccessTable<Vec<Vec<usize>>>>,
    corpus: CorpusStats,
}

impl<'a> AccumulationDriver<'a> {
    /// Creates a driver over `model` and `acc`, with optional weight and
    /// candidate-selection sources resolved once for the whole run.
    pub fn new(
        model: &'a DiagGmm,
        acc: &'a mut AccumDiagGmm,
        weights: Option<&'a RandomAccessTable<Vec<f64>>>,
        gselect: Option<&'a RandomAccessTable<Vec<Vec<usize>>>>,
    ) -> Self {
        Self {
            model,
            acc,
            weights,
            gselect,
            corpus: CorpusStats::default(),
        }
    }

    /// Corpus totals accumulated so far.
    pub fn corpus_stats(&self) -> &CorpusStats {
        &self.corpus
    }

    /// Processes one utterance, updating the accumulator and corpus totals.
    ///
    /// Returns `Ok(Skipped(..))` for recoverable per-utterance conditions
    /// and `Err` only for fatal ones.
    pub fn process_utterance(
        &mut self,
        key: &str,
        frames: &[Vec<f64>],
    ) -> GmmResult<UtteranceOutcome> {
        let num_frames = frames.len();

        // Resolve weights and selection before touching any frame, so a
        // failing utterance contributes nothing at all.
        let weights: Option<&[f64]> = match self.weights {
            Some(table) => match table.get(key) {
                None => return Ok(self.skip(key, SkipReason::MissingWeights)),
                Some(w) if w.len() != num_frames => {
                    return Ok(self.skip(
                        key,
                        SkipReason::WeightLengthMismatch {
                            expected: num_frames,
                            actual: w.len(),
                        },
                    ))
                }
                Some(w) if w.iter().any(|&x| x.is_nan() || x < 0.0) => {
                    return Ok(self.skip(key, SkipReason::InvalidWeights))
                }
                Some(w) => Some(w.as_slice()),
            },
            None => None,
        };

        let gselect: Option<&[Vec<usize>]> = match self.gselect {
            Some(table) => match table.get(key) {
                None => return Ok(self.skip(key, SkipReason::MissingSelection)),
                Some(lists) if lists.len() != num_frames => {
                    return Ok(self.skip(
                        key,
                        SkipReason::SelectionLengthMismatch {
                            expected: num_frames,
                            actual: lists.len(),
                        },
                    ))
                }
                Some(lists) => Some(lists.as_slice()),
            },
            None => None,
        };

        let mut stats = UtteranceStats {
            log_like: 0.0,
            weight: 0.0,
        };

        for (i, frame) in frames.iter().enumerate() {
            let w = weights.map_or(1.0, |ws| ws[i]);
            if w == 0.0 {
                // A zero-weight frame is fully inert.
                continue;
            }

            let frame_log_like = match gselect {
                Some(lists) => {
                    let candidates = &lists[i];
                    let mut posteriors =
                        self.model.log_likelihoods_preselect(frame, candidates)?;
                    let total = softmax_in_place(&mut posteriors);
                    for (j, &comp) in candidates.iter().enumerate() {
                        self.acc
                            .accumulate_for_component(frame, comp, w * posteriors[j])?;
                    }
                    total
                }
                None => self.acc.accumulate_from_model(self.model, frame, w)?,
            };

            stats.log_like += w * frame_log_like;
            stats.weight += w;
        }

        match stats.avg_log_like() {
            Some(avg) => log::info!(
                "Utterance \"{}\": average log-likelihood {:.6} over {} weighted frames",
                key,
                avg,
                stats.weight
            ),
            None => log::info!(
                "Utterance \"{}\": no weighted frames, log-likelihood undefined",
                key
            ),
        }

        self.corpus.total_log_like += stats.log_like;
        self.corpus.total_weight += stats.weight;
        self.corpus.num_processed += 1;
        Ok(UtteranceOutcome::Processed(stats))
    }

    fn skip(&mut self, key: &str, reason: SkipReason) -> UtteranceOutcome {
        log::warn!("Skipping utterance \"{}\": {}", key, reason);
        self.corpus.num_skipped += 1;
        UtteranceOutcome::Skipped(reason)
    }

    /// Consumes a sequential feature stream to completion and returns the
    /// corpus totals, logging the end-of-run summary.
    ///
    /// Stream errors (I/O failure, malformed line) are fatal and propagate
    /// immediately; end of stream is the normal terminal condition.
    pub fn run<I>(&mut self, stream: I) -> GmmResult<CorpusStats>
    where
        I: IntoIterator<Item = GmmResult<FeatureEntry>>,
    {
        for entry in stream {
            let FeatureEntry { key, frames } = entry?;
            self.process_utterance(&key, &frames)?;
        }

        log::info!(
            "Done {} utterances; {} with errors.",
            self.corpus.num_processed,
            self.corpus.num_skipped
        );
        match self.corpus.avg_log_like() {
            Some(avg) => log::info!(
                "Overall log-likelihood per frame = {:.6} over {} weighted frames.",
                avg,
                self.corpus.total_weight
            ),
            None => log::info!("Overall log-likelihood per frame undefined (zero total weight)."),
        }
        Ok(self.corpus)
    }
}
