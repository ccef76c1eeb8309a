//! Run configuration for the accumulation driver and the output sink.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::accumulator::UpdateFlags;

/// Serialization format for the accumulator sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// bincode-encoded
    Binary,
    /// pretty-printed JSON
    Text,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Binary
    }
}

/// Configuration for one accumulation run.
///
/// The optional sources are resolved once, at the top of the run: an absent
/// weights path means every frame has weight 1.0, and an absent selection
/// path means every frame is scored against all components.
#[derive(Debug, Clone)]
pub struct AccumulationConfig {
    /// Sink serialization format
    pub output_format: OutputFormat,
    /// Which statistic kinds to accumulate
    pub update_flags: UpdateFlags,
    /// Optional per-utterance frame-weight archive
    pub weights_path: Option<PathBuf>,
    /// Optional per-utterance candidate-selection archive
    pub gselect_path: Option<PathBuf>,
}

impl Default for AccumulationConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            update_flags: UpdateFlags::all(),
            weights_path: None,
            gselect_path: None,
        }
    }
}
