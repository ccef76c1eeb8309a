//! File formats and keyed-archive I/O.
//!
//! Three kinds of storage back one run:
//!
//! - the model file, a single JSON object read once at startup;
//! - keyed archives in JSON-Lines form (one `{"key": ..}` object per line):
//!   the feature archive is consumed sequentially in a single forward pass,
//!   while the weights and candidate-selection archives are small enough to
//!   load eagerly into random-access tables;
//! - the accumulator sink, written exactly once at the end of a successful
//!   run, as pretty JSON or bincode depending on the configured format.
//!
//! Every on-disk object carries a `format` version tag checked on read.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::accumulator::AccumDiagGmm;
use crate::config::OutputFormat;
use crate::diag_gmm::DiagGmm;
use crate::errors::{GmmResult, GmmStatsError};

/// Current on-disk format version for all file kinds.
pub const FORMAT_VERSION: u32 = 1;

fn io_err(path: &Path, err: std::io::Error) -> GmmStatsError {
    GmmStatsError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn format_err(path: &Path, reason: impl ToString) -> GmmStatsError {
    GmmStatsError::ArchiveFormat {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn check_version(path: &Path, format: u32) -> GmmResult<()> {
    if format != FORMAT_VERSION {
        Err(format_err(
            path,
            format!("unsupported format version {} (expected {})", format, FORMAT_VERSION),
        ))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Model file
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct ModelFile {
    format: u32,
    weights: Vec<f64>,
    means: Vec<Vec<f64>>,
    vars: Vec<Vec<f64>>,
}

/// Reads a diagonal-covariance GMM from a JSON model file, validating its
/// structure.
pub fn read_model(path: &Path) -> GmmResult<DiagGmm> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let model: ModelFile =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| format_err(path, e))?;
    check_version(path, model.format)?;
    DiagGmm::new(model.weights, model.means, model.vars)
}

/// Writes a model to a JSON file. Used by tooling and tests; the
/// accumulation run itself only reads models.
pub fn write_model(path: &Path, model: &DiagGmm) -> GmmResult<()> {
    let file = ModelFile {
        format: FORMAT_VERSION,
        weights: model.weights().to_vec(),
        means: model.means().to_vec(),
        vars: model.vars().to_vec(),
    };
    let out = File::create(path).map_err(|e| io_err(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(out), &file).map_err(|e| format_err(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Keyed archives
// ---------------------------------------------------------------------------

/// One utterance's feature matrix: an ordered sequence of D-dimensional
/// frames under an utterance key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEntry {
    /// Utterance identifier
    pub key: String,
    /// Frames in temporal order, each of the model's feature dimension
    pub frames: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WeightsEntry {
    key: String,
    weights: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GselectEntry {
    key: String,
    gselect: Vec<Vec<usize>>,
}

/// Forward-only reader over a JSON-Lines feature archive.
///
/// Yields one [`FeatureEntry`] per non-blank line. A line that fails to
/// parse is a fatal malformed-stream condition, surfaced as an error item;
/// end of file is the normal terminal condition.
pub struct SequentialFeatureReader<R: BufRead> {
    lines: Lines<R>,
    path: String,
    line_no: usize,
}

impl SequentialFeatureReader<BufReader<File>> {
    /// Opens a feature archive file for sequential reading.
    pub fn open(path: &Path) -> GmmResult<Self> {
        let file = File::open(path).map_err(|e| io_err(path, e))?;
        Ok(Self::from_reader(
            BufReader::new(file),
            path.display().to_string(),
        ))
    }
}

impl<R: BufRead> SequentialFeatureReader<R> {
    /// Wraps an arbitrary buffered reader; `path` is used in diagnostics.
    pub fn from_reader(reader: R, path: String) -> Self {
        Self {
            lines: reader.lines(),
            path,
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for SequentialFeatureReader<R> {
    type Item = GmmResult<FeatureEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line_no += 1;
            match self.lines.next()? {
                Err(e) => {
                    return Some(Err(GmmStatsError::Io {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    }))
                }
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    return Some(serde_json::from_str(&line).map_err(|e| {
                        GmmStatsError::ArchiveFormat {
                            path: self.path.clone(),
                            reason: format!("line {}: {}", self.line_no, e),
                        }
                    }))
                }
            }
        }
    }
}

/// Keyed random-access lookup table built from a JSON-Lines archive.
#[derive(Debug, Clone)]
pub struct RandomAccessTable<T> {
    map: HashMap<String, T>,
}

impl<T> RandomAccessTable<T> {
    /// Builds a table from an in-memory map. Archive loading goes through
    /// [`read_weights_archive`] / [`read_gselect_archive`]; this is for
    /// programmatic construction.
    pub fn from_map(map: HashMap<String, T>) -> Self {
        Self { map }
    }

    /// Looks up the entry for an utterance key.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.map.get(key)
    }

    /// Number of keyed entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn read_keyed_archive<E, T>(
    path: &Path,
    into_pair: impl Fn(E) -> (String, T),
) -> GmmResult<RandomAccessTable<T>>
where
    E: DeserializeOwned,
{
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut map = HashMap::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| io_err(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: E = serde_json::from_str(&line)
            .map_err(|e| format_err(path, format!("line {}: {}", idx + 1, e)))?;
        let (key, value) = into_pair(entry);
        if map.insert(key.clone(), value).is_some() {
            return Err(format_err(path, format!("duplicate key \"{}\"", key)));
        }
    }
    Ok(RandomAccessTable { map })
}

/// Loads a per-utterance frame-weights archive into a keyed table.
pub fn read_weights_archive(path: &Path) -> GmmResult<RandomAccessTable<Vec<f64>>> {
    read_keyed_archive(path, |e: WeightsEntry| (e.key, e.weights))
}

/// Loads a per-utterance candidate-selection archive into a keyed table.
pub fn read_gselect_archive(path: &Path) -> GmmResult<RandomAccessTable<Vec<Vec<usize>>>> {
    read_keyed_archive(path, |e: GselectEntry| (e.key, e.gselect))
}

// ---------------------------------------------------------------------------
// Accumulator sink
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, bincode::Encode, bincode::Decode)]
struct AccumFile {
    format: u32,
    acc: AccumDiagGmm,
}

/// Serializes the final accumulator to `path` in the requested format.
pub fn write_accumulator(
    path: &Path,
    acc: &AccumDiagGmm,
    format: OutputFormat,
) -> GmmResult<()> {
    let file = AccumFile {
        format: FORMAT_VERSION,
        acc: acc.clone(),
    };
    match format {
        OutputFormat::Text => {
            let out = File::create(path).map_err(|e| io_err(path, e))?;
            serde_json::to_writer_pretty(BufWriter::new(out), &file)
                .map_err(|e| format_err(path, e))?;
        }
        OutputFormat::Binary => {
            let bytes = bincode::encode_to_vec(&file, bincode::config::standard())
                .map_err(|e| format_err(path, e))?;
            let mut out = File::create(path).map_err(|e| io_err(path, e))?;
            out.write_all(&bytes).map_err(|e| io_err(path, e))?;
        }
    }
    Ok(())
}

/// Reads an accumulator back from `path`, validating its buffer shapes.
pub fn read_accumulator(path: &Path, format: OutputFormat) -> GmmResult<AccumDiagGmm> {
    let file: AccumFile = match format {
        OutputFormat::Text => {
            let input = File::open(path).map_err(|e| io_err(path, e))?;
            serde_json::from_reader(BufReader::new(input)).map_err(|e| format_err(path, e))?
        }
        OutputFormat::Binary => {
            let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
            let (file, _) = bincode::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| format_err(path, e))?;
            file
        }
    };
    check_version(path, file.format)?;
    file.acc.validate()?;
    Ok(file.acc)
}
