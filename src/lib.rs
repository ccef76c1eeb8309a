//! # GMM E-step statistics accumulation
//!
//! This crate computes the expectation-step sufficient statistics needed to
//! train a diagonal-covariance Gaussian mixture model from a stream of
//! feature vectors, as one pass of a maximum-likelihood EM training loop.
//! For every labeled utterance it evaluates per-frame component
//! responsibilities under a fixed model and folds weighted occupancy,
//! first-moment, and second-moment statistics into per-component
//! accumulators, tracking overall data log-likelihood as it goes.
//!
//! ## Pipeline
//!
//! The [`driver::AccumulationDriver`] pulls utterances from a sequential
//! feature archive, the [`diag_gmm::DiagGmm`] scores each frame (optionally
//! restricted to a per-frame candidate subset), the max-shifted softmax in
//! [`math_utils`] turns log-likelihoods into posteriors, and the
//! [`accumulator::AccumDiagGmm`] sums the weighted statistics selected by
//! its update-flags mask. The final accumulator is serialized once at the
//! end of the run.
//!
//! ## Quick start
//!
//! ```rust
//! use gmm_acc_stats::{AccumDiagGmm, AccumulationDriver, DiagGmm, UpdateFlags};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Two 1-D components, ten standard deviations apart.
//!     let model = DiagGmm::new(
//!         vec![0.5, 0.5],
//!         vec![vec![0.0], vec![10.0]],
//!         vec![vec![1.0], vec![1.0]],
//!     )?;
//!
//!     let mut acc = AccumDiagGmm::new(&model, UpdateFlags::all());
//!     let mut driver = AccumulationDriver::new(&model, &mut acc, None, None);
//!     driver.process_utterance("utt1", &[vec![0.1], vec![9.8]])?;
//!
//!     let corpus = driver.corpus_stats();
//!     assert_eq!(corpus.num_processed, 1);
//!     println!(
//!         "average log-likelihood per frame: {:?}",
//!         corpus.avg_log_like()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Error handling
//!
//! Fatal conditions (malformed model or archive, dimension mismatches, an
//! empty candidate set reaching the scorer) surface as
//! [`errors::GmmStatsError`] and abort the run. Recoverable per-utterance
//! conditions (missing or mis-sized weight / selection entries) are modeled
//! as [`driver::UtteranceOutcome::Skipped`] values: the utterance
//! contributes nothing, an error counter increments, and the stream
//! continues.

pub mod accumulator;
pub mod archive;
pub mod config;
pub mod diag_gmm;
pub mod driver;
pub mod errors;
pub mod math_utils;

pub use accumulator::{AccumDiagGmm, UpdateFlags};
pub use archive::{
    read_accumulator, read_gselect_archive, read_model, read_weights_archive, write_accumulator,
    write_model, FeatureEntry, RandomAccessTable, SequentialFeatureReader,
};
pub use config::{AccumulationConfig, OutputFormat};
pub use diag_gmm::DiagGmm;
pub use driver::{
    AccumulationDriver, CorpusStats, SkipReason, UtteranceOutcome, UtteranceStats,
};
pub use errors::{GmmResult, GmmStatsError};
pub use math_utils::{log_sum_exp, softmax_in_place};
