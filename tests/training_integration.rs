//! End-to-end distillation runs on synthetic sources.
//!
//! Drives the public API the way the CLI does: an oracle checkpoint on
//! disk, a decoder handing out sources, a full training run, artifacts
//! written under an output root, and an evaluation pass on the result.

use audionet::config::OutputLayout;
use audionet::eval::evaluate;
use audionet::frames::{FrameSampler, TailPolicy};
use audionet::media::{MediaDecoder, SyntheticDecoder, SyntheticSource};
use audionet::oracle::{Oracle, PooledLinearOracle};
use audionet::stats::{EvaluationStatistics, TrainingStatistics};
use audionet::student::{StudentConfig, StudentNetwork};
use audionet::train::{DistillationTrainer, Phase, TrainConfig};
use audionet::Error;
use ndarray::{Array1, Array2};
use std::path::Path;

const CLASSES: usize = 5;

fn write_oracle(path: &Path) {
    let weight = Array2::from_shape_fn((CLASSES, 3 * 4), |(k, f)| ((k + 2 * f) % 5) as f32 * 0.5 - 1.0);
    let bias = Array1::from_shape_fn(CLASSES, |k| k as f32 * 0.1);
    PooledLinearOracle::from_parameters(weight, bias, 2, (16, 16))
        .unwrap()
        .save(path)
        .unwrap();
}

fn student_config() -> StudentConfig {
    StudentConfig::default()
        .with_out_channels(4)
        .with_conv(16, 4, 8)
        .with_pool(4, 1, 2)
        .with_num_classes(CLASSES)
}

fn decoder() -> SyntheticDecoder {
    SyntheticDecoder::new()
        .with_source("videos/beach.mkv.gz", 0.8)
        .with(
            "videos/street.mp4",
            SyntheticSource::new("street.mp4", 0.6)
                .with_frame_rate(30.0)
                .with_channels(1),
        )
}

#[test]
fn test_full_run_writes_loadable_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let oracle_path = dir.path().join("oracle.safetensors");
    write_oracle(&oracle_path);

    let oracle = PooledLinearOracle::load(&oracle_path).unwrap();
    assert_eq!(oracle.num_classes(), CLASSES);

    let config = TrainConfig::default()
        .with_epochs(4)
        .with_batch_size(8)
        .with_learning_rate(0.05)
        .with_seed(5)
        .with_shards(2);
    let student = StudentNetwork::seeded(student_config(), config.seed).unwrap();
    let mut trainer = DistillationTrainer::new(config, oracle, student).unwrap();

    let loaded = trainer
        .load_sources(&decoder(), &["videos/beach.mkv.gz", "videos/street.mp4"])
        .unwrap();
    assert_eq!(loaded, 20 + 15);

    trainer.train().unwrap();
    assert_eq!(trainer.phase(), Phase::EpochEnd);

    let layout = OutputLayout::new(dir.path().join("output"));
    let model_path = layout.model_path("audionet.pt");
    let stats_path = layout.training_stats_path("audionet.pt");
    trainer.finalize(&model_path, &stats_path).unwrap();
    assert_eq!(trainer.phase(), Phase::Done);

    let stats = TrainingStatistics::load(&stats_path).unwrap();
    assert_eq!(stats.num_epochs, 4);
    assert_eq!(stats.video_sample_period_msec, 40);
    assert_eq!(stats.batch_size, 8);
    assert_eq!(stats.epochs.len(), 4);
    for epoch in &stats.epochs {
        assert_eq!(epoch.videos["beach.mkv.gz"].kldiv_per_frame.len(), 20);
        assert_eq!(epoch.videos["street.mp4"].kldiv_per_frame.len(), 15);
        assert!(epoch
            .videos
            .values()
            .flat_map(|v| &v.kldiv_per_frame)
            .all(|l| l.is_finite() && *l >= -1e-6));
    }

    let (student, _) = trainer.into_parts();
    let restored = StudentNetwork::load(&model_path).unwrap();
    assert_eq!(restored.config(), student.config());
    assert_eq!(restored.snapshot().params, student.snapshot().params);
}

#[test]
fn test_evaluate_trained_student() {
    let dir = tempfile::tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let student = StudentNetwork::seeded(student_config(), Some(9)).unwrap();
    let model_path = layout.model_path("audionet.pt");
    student.save(&model_path).unwrap();

    let restored = StudentNetwork::load(&model_path).unwrap();
    let mut source = decoder().open(Path::new("videos/beach.mkv.gz")).unwrap();
    let source_id = source.info().source_id.clone();
    let stats = evaluate(&restored, &FrameSampler::new(40), source.as_mut(), "audionet.pt").unwrap();

    let stats_path = layout.evaluation_stats_path("audionet.pt", &source_id);
    stats.save(&stats_path).unwrap();
    assert!(stats_path.ends_with("stats/evaluation/audionet.pt/beach.mkv.gz.stats.json"));

    let reloaded = EvaluationStatistics::load(&stats_path).unwrap();
    assert_eq!(reloaded.frame_probabilities.len(), 20);
    assert_eq!(reloaded.frame_probabilities[0].len(), CLASSES);
    assert_eq!(reloaded.top_k(2).len(), 20);
}

#[test]
fn test_short_audio_policies() {
    let short = || {
        SyntheticDecoder::new().with(
            "clip.mp4",
            SyntheticSource::new("clip.mp4", 0.4).with_audio_shortfall(2000),
        )
    };
    let oracle = || {
        let weight = Array2::from_elem((CLASSES, 12), 0.1);
        PooledLinearOracle::from_parameters(weight, Array1::zeros(CLASSES), 2, (8, 8)).unwrap()
    };
    let run = |policy: TailPolicy| {
        let config = TrainConfig::default()
            .with_epochs(1)
            .with_batch_size(4)
            .with_seed(1)
            .with_tail_policy(policy);
        let student = StudentNetwork::seeded(student_config(), config.seed).unwrap();
        let mut trainer = DistillationTrainer::new(config, oracle(), student).unwrap();
        trainer.load_sources(&short(), &["clip.mp4"])
    };

    assert_eq!(run(TailPolicy::Pad).unwrap(), 10);
    assert!(run(TailPolicy::Drop).unwrap() < 10);
    assert!(matches!(run(TailPolicy::Error), Err(Error::ShapeMismatch { .. })));
}
