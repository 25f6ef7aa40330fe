//! Audionet CLI
//!
//! # Usage
//!
//! ```bash
//! # Train a student against a frozen image classifier
//! audionet train -o audionet.pt --oracle oracle.safetensors clip1.mkv.gz clip2.mp4
//!
//! # Train with overrides
//! audionet train -o audionet.pt --oracle oracle.safetensors --config run.yaml --epochs 10 clip.mp4
//!
//! # Per-frame class probabilities for one video
//! audionet evaluate --model output/models/audionet.pt clip.mp4
//!
//! # Show parameter names and shapes
//! audionet inspect output/models/audionet.pt
//! ```

use audionet::config::{
    apply_overrides, load_config, parse_cli, validate_config, Cli, Command, EvaluateArgs,
    InspectArgs, OutputLayout, TrainArgs,
};
use audionet::eval::evaluate;
use audionet::frames::FrameSampler;
use audionet::io::load_model;
use audionet::media::{FfmpegDecoder, MediaDecoder};
use audionet::oracle::{Oracle, PooledLinearOracle};
use audionet::student::{StudentConfig, StudentNetwork};
use audionet::train::{DistillationTrainer, TrainConfig};
use audionet::Result;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(Some(cli)) => cli,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&cli);

    let result = match cli.command {
        Command::Train(args) => run_train(args),
        Command::Evaluate(args) => run_evaluate(args),
        Command::Inspect(args) => run_inspect(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over `-v`/`-q`
fn init_tracing(cli: &Cli) {
    let default_level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => TrainConfig::default(),
    };
    let config = apply_overrides(config, &args);
    validate_config(&config)?;

    let layout = OutputLayout::new(&args.output_root);
    let model_path = layout.model_path(&args.output);
    let stats_path = layout.training_stats_path(&args.output);

    let oracle = PooledLinearOracle::load(&args.oracle)?;

    let student_config = StudentConfig {
        sample_rate: config.audio_sample_rate,
        ..StudentConfig::default()
    }
    .with_num_classes(oracle.num_classes());
    let student = StudentNetwork::seeded(student_config, config.seed)?;

    let mut trainer = DistillationTrainer::new(config, oracle, student)?;
    trainer.load_sources(&FfmpegDecoder::new(), &args.videos)?;
    trainer.train()?;
    trainer.finalize(&model_path, &stats_path)?;
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let student = StudentNetwork::load(&args.model)?;
    let sampler = FrameSampler::new(args.period_ms).with_audio_rate(student.config().sample_rate);

    let mut source = FfmpegDecoder::new().open(&args.video)?;
    let source_id = source.info().source_id.clone();
    let model_file = audionet::media::source_id(&args.model);

    let stats = evaluate(&student, &sampler, source.as_mut(), &model_file)?;
    let stats_path = OutputLayout::new(&args.output_root).evaluation_stats_path(&model_file, &source_id);
    stats.save(&stats_path)?;
    tracing::info!(path = %stats_path.display(), "saved evaluation statistics");
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let model = load_model(&args.model)?;
    println!("Model: {} ({})", model.metadata.name, model.metadata.architecture);
    println!("  Version: {}", model.metadata.version);
    for (key, value) in &model.metadata.custom {
        println!("  {key}: {value}");
    }
    println!();
    for (name, tensor) in &model.parameters {
        println!("  {name}: {:?}", tensor.shape());
    }
    println!("  Total parameters: {}", model.num_elements());
    Ok(())
}
