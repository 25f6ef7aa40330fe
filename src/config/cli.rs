//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! audionet train -o audionet.pt --oracle oracle.safetensors clip1.mkv.gz clip2.mp4
//! audionet train -o audionet.pt --oracle oracle.safetensors --config run.yaml --epochs 10 clip.mp4
//! audionet evaluate --model output/models/audionet.pt clip.mp4
//! audionet inspect output/models/audionet.pt
//! ```

use crate::frames::{TailPolicy, DEFAULT_PERIOD_MSEC};
use crate::train::TrainConfig;
use crate::{Error, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Audionet: learn to hear what an image classifier sees
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "audionet")]
#[command(version)]
#[command(about = "Distill a frozen image classifier into an audio network using paired video")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Train a student network on a set of videos
    Train(TrainArgs),

    /// Run a trained student over one video
    Evaluate(EvaluateArgs),

    /// Print the parameters of a saved student
    Inspect(InspectArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TrainArgs {
    /// Model output path, relative to `<output-root>/models`
    #[arg(short, long = "output", value_name = "MODEL")]
    pub output: PathBuf,

    /// Frozen image classifier checkpoint
    #[arg(long, value_name = "CHECKPOINT")]
    pub oracle: PathBuf,

    /// YAML file with training hyperparameters
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory receiving models and statistics
    #[arg(long, default_value = "output")]
    pub output_root: PathBuf,

    /// Override number of epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Override batch size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override learning rate
    #[arg(long)]
    pub lr: Option<f64>,

    /// Override sampling period in milliseconds
    #[arg(long)]
    pub period_ms: Option<u32>,

    /// Random seed for reproducibility
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of parallel shards per batch
    #[arg(long)]
    pub shards: Option<usize>,

    /// Short tail handling: pad, drop or error
    #[arg(long)]
    pub tail_policy: Option<TailPolicy>,

    /// Video sources, optionally gzip-compressed
    #[arg(value_name = "VIDEO", required = true, num_args = 1..)]
    pub videos: Vec<PathBuf>,
}

/// Arguments for the evaluate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct EvaluateArgs {
    /// Trained student artifact
    #[arg(long, value_name = "MODEL")]
    pub model: PathBuf,

    /// Sampling period in milliseconds
    #[arg(long, default_value_t = DEFAULT_PERIOD_MSEC)]
    pub period_ms: u32,

    /// Directory receiving statistics
    #[arg(long, default_value = "output")]
    pub output_root: PathBuf,

    /// Video source to evaluate
    #[arg(value_name = "VIDEO")]
    pub video: PathBuf,
}

/// Arguments for the inspect command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InspectArgs {
    /// Student artifact to describe
    #[arg(value_name = "MODEL")]
    pub model: PathBuf,
}

/// Parse command line arguments
///
/// Help and version requests come back as the clap error so the caller can
/// print them; every other parse failure is an [`Error::Usage`].
pub fn parse_args<I, T>(args: I) -> std::result::Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Parse command line arguments, folding usage failures into [`Error`]
pub fn parse_cli<I, T>(args: I) -> Result<Option<Cli>>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match parse_args(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            Ok(None)
        }
        Err(e) => Err(Error::Usage(e.render().to_string().trim_end().to_string())),
    }
}

/// Apply command-line overrides to a [`TrainConfig`]
pub fn apply_overrides(config: TrainConfig, args: &TrainArgs) -> TrainConfig {
    let mut config = config;
    if let Some(epochs) = args.epochs {
        config = config.with_epochs(epochs);
    }
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if let Some(lr) = args.lr {
        config = config.with_learning_rate(lr);
    }
    if let Some(period) = args.period_ms {
        config = config.with_period_msec(period);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(shards) = args.shards {
        config = config.with_shards(shards);
    }
    if let Some(policy) = args.tail_policy {
        config = config.with_tail_policy(policy);
    }
    config
}
