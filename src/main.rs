//! Command-line front end: accumulate E-step statistics for training a
//! diagonal-covariance GMM.
//!
//! ```text
//! gmm-acc-stats [options] <model> <feature-archive> <stats-out>
//! ```
//!
//! Exit codes distinguish three outcomes: 0 when at least one utterance was
//! processed, 1 when the run completed but processed zero utterances, and 2
//! on a fatal error (in which case no output is written).

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;

use gmm_acc_stats::{
    archive, AccumDiagGmm, AccumulationConfig, AccumulationDriver, GmmResult, OutputFormat,
    SequentialFeatureReader, UpdateFlags,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum FormatArg {
    Binary,
    Text,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Binary => OutputFormat::Binary,
            FormatArg::Text => OutputFormat::Text,
        }
    }
}

/// Accumulate sufficient statistics for training a diagonal-covariance GMM.
#[derive(Debug, Parser)]
#[command(name = "gmm-acc-stats", version, about)]
struct Args {
    /// Output serialization format for the accumulator
    #[arg(long, value_enum, default_value_t = FormatArg::Binary)]
    format: FormatArg,

    /// Which GMM parameters the statistics will update: subset of "wmv"
    #[arg(long, default_value = "mvw")]
    update_flags: String,

    /// Archive of per-frame candidate component lists, to limit the
    /// components scored on each frame
    #[arg(long)]
    gselect: Option<PathBuf>,

    /// Archive of per-frame weight vectors, one per utterance
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Model file (JSON)
    model: PathBuf,

    /// Feature archive (JSON Lines, sequential)
    features: PathBuf,

    /// Output path for the accumulated statistics
    stats_out: PathBuf,
}

fn run(args: &Args) -> GmmResult<usize> {
    let config = AccumulationConfig {
        output_format: args.format.into(),
        update_flags: UpdateFlags::from_str(&args.update_flags)?,
        weights_path: args.weights.clone(),
        gselect_path: args.gselect.clone(),
    };

    let model = archive::read_model(&args.model)?;
    log::info!(
        "Loaded model with {} components, dimension {}",
        model.num_comps(),
        model.dim()
    );

    let weights = config
        .weights_path
        .as_deref()
        .map(archive::read_weights_archive)
        .transpose()?;
    let gselect = config
        .gselect_path
        .as_deref()
        .map(archive::read_gselect_archive)
        .transpose()?;

    let mut acc = AccumDiagGmm::new(&model, config.update_flags);
    let corpus = {
        let mut driver = AccumulationDriver::new(
            &model,
            &mut acc,
            weights.as_ref(),
            gselect.as_ref(),
        );
        let stream = SequentialFeatureReader::open(&args.features)?;
        driver.run(stream)?
    };

    archive::write_accumulator(&args.stats_out, &acc, config.output_format)?;
    log::info!("Written statistics to {}", args.stats_out.display());

    Ok(corpus.num_processed)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(num_processed) if num_processed > 0 => ExitCode::SUCCESS,
        Ok(_) => {
            log::error!("No utterances processed.");
            ExitCode::from(1)
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(2)
        }
    }
}
