//! The distillation training loop

use super::batch::Batch;
use super::shard::run_sharded;
use super::TrainConfig;
use crate::config::validate_config;
use crate::distill::KlDivergenceObjective;
use crate::frames::{FrameSampler, FrameTransform, SampledPair};
use crate::media::MediaDecoder;
use crate::optim::{Optimizer, SGD};
use crate::oracle::Oracle;
use crate::stats::{EpochRecord, EpochRecorder, TrainingStatistics};
use crate::student::StudentNetwork;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::ops::Range;
use std::path::Path;

/// Where a run currently is
///
/// ```text
/// Initializing -> PairingData -> {EpochStart -> BatchStep -> EpochEnd}* -> Finalizing -> Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    PairingData,
    EpochStart,
    BatchStep,
    EpochEnd,
    Finalizing,
    Done,
}

/// Fits a [`StudentNetwork`] to an [`Oracle`] over an in-memory pool of pairs
///
/// # Example
///
/// ```no_run
/// use audionet::media::FfmpegDecoder;
/// use audionet::oracle::PooledLinearOracle;
/// use audionet::student::{StudentConfig, StudentNetwork};
/// use audionet::train::{DistillationTrainer, TrainConfig};
///
/// let config = TrainConfig::default().with_epochs(10).with_seed(0);
/// let oracle = PooledLinearOracle::load("oracle.safetensors").unwrap();
/// let student = StudentNetwork::seeded(StudentConfig::default(), config.seed).unwrap();
///
/// let mut trainer = DistillationTrainer::new(config, oracle, student).unwrap();
/// trainer.load_sources(&FfmpegDecoder::new(), &["clip.mkv.gz"]).unwrap();
/// trainer.train().unwrap();
/// trainer.finalize("output/models/audionet.pt", "output/stats/training/audionet.pt.stats.json").unwrap();
/// ```
pub struct DistillationTrainer<O: Oracle> {
    config: TrainConfig,
    oracle: O,
    transform: FrameTransform,
    sampler: FrameSampler,
    student: StudentNetwork,
    optimizer: SGD,
    objective: KlDivergenceObjective,
    rng: StdRng,
    pool: Vec<SampledPair>,
    batch: Batch,
    statistics: TrainingStatistics,
    steps: usize,
    phase: Phase,
}

impl<O: Oracle> DistillationTrainer<O> {
    /// Bind the optimizer to the student and prepare an empty pool
    pub fn new(config: TrainConfig, oracle: O, student: StudentNetwork) -> Result<Self> {
        validate_config(&config)?;
        if oracle.num_classes() != student.num_classes() {
            return Err(Error::shape(&[oracle.num_classes()], &[student.num_classes()]));
        }
        if student.config().sample_rate != config.audio_sample_rate {
            return Err(Error::ConfigError(format!(
                "student expects {} Hz audio but the run samples at {} Hz",
                student.config().sample_rate,
                config.audio_sample_rate
            )));
        }

        let lr = config.learning_rate as f32;
        let momentum = config.momentum as f32;
        let optimizer = if config.nesterov {
            SGD::nesterov(lr, momentum)
        } else {
            SGD::new(lr, momentum)
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let statistics = TrainingStatistics::new(
            config.num_epochs,
            config.video_sample_period_msec,
            config.batch_size,
            config.learning_rate,
        );

        tracing::debug!(
            classes = oracle.num_classes(),
            student_parameters = student.num_parameters(),
            "trainer initialized"
        );

        Ok(Self {
            transform: oracle.transform(),
            sampler: config.sampler(),
            config,
            oracle,
            student,
            optimizer,
            objective: KlDivergenceObjective::new(),
            rng,
            pool: Vec::new(),
            batch: Batch::default(),
            statistics,
            steps: 0,
            phase: Phase::Initializing,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn student(&self) -> &StudentNetwork {
        &self.student
    }

    pub fn statistics(&self) -> &TrainingStatistics {
        &self.statistics
    }

    pub fn pool(&self) -> &[SampledPair] {
        &self.pool
    }

    /// Optimizer steps taken so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Sample every source into the pool
    ///
    /// Any source that fails to decode aborts the whole pass.
    pub fn load_sources<P: AsRef<Path>>(
        &mut self,
        decoder: &dyn MediaDecoder,
        paths: &[P],
    ) -> Result<usize> {
        self.enter_pairing()?;
        for (i, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            tracing::info!("Load Video {} of {}: {}", i + 1, paths.len(), path.display());
            let pairs = self.sampler.sample_path(decoder, path)?;
            self.add_pairs(pairs)?;
        }
        tracing::info!(pairs = self.pool.len(), sources = paths.len(), "paired data loaded");
        Ok(self.pool.len())
    }

    /// Add already-sampled pairs to the pool
    ///
    /// Frames are resized to the oracle's input size on the way in.
    pub fn add_pairs(&mut self, pairs: Vec<SampledPair>) -> Result<()> {
        self.enter_pairing()?;
        let transform = &self.transform;
        self.pool.extend(pairs.into_iter().map(|mut pair| {
            pair.video_frame = transform.resize(&pair.video_frame);
            pair
        }));
        Ok(())
    }

    fn enter_pairing(&mut self) -> Result<()> {
        match self.phase {
            Phase::Initializing | Phase::PairingData => {
                self.phase = Phase::PairingData;
                Ok(())
            }
            phase => Err(Error::InvalidParameter(format!(
                "cannot add data while in {phase:?}"
            ))),
        }
    }

    /// Run every configured epoch
    pub fn train(&mut self) -> Result<&TrainingStatistics> {
        let num_epochs = self.config.num_epochs;
        for epoch in 0..num_epochs {
            tracing::info!("Epoch {} of {}", epoch + 1, num_epochs);
            let record = self.train_epoch()?;
            tracing::info!(
                mean_kldiv = record.mean_loss().unwrap_or(0.0),
                "Training Time: {:.3} s",
                record.training_time
            );
        }
        Ok(&self.statistics)
    }

    /// One full shuffled pass over the pool
    pub fn train_epoch(&mut self) -> Result<&EpochRecord> {
        match self.phase {
            Phase::PairingData | Phase::EpochEnd => {}
            Phase::Initializing => {
                return Err(Error::InvalidParameter("no sampled pairs to train on".into()))
            }
            phase => {
                return Err(Error::InvalidParameter(format!(
                    "cannot start an epoch while in {phase:?}"
                )))
            }
        }
        if self.pool.is_empty() {
            return Err(Error::InvalidParameter("no sampled pairs to train on".into()));
        }

        self.phase = Phase::EpochStart;
        self.pool.shuffle(&mut self.rng);
        let mut recorder = EpochRecorder::start();

        self.phase = Phase::BatchStep;
        for range in batch_ranges(self.pool.len(), self.config.batch_size) {
            let losses = self.train_step(range)?;
            recorder.record_batch(self.batch.source_ids.iter().map(String::as_str), &losses)?;
        }

        self.phase = Phase::EpochEnd;
        self.statistics.push_epoch(recorder.finish());
        self.statistics
            .epochs
            .last()
            .ok_or_else(|| Error::InvalidParameter("epoch record missing".into()))
    }

    /// Zero gradients, forward both networks, backpropagate, step
    fn train_step(&mut self, range: Range<usize>) -> Result<Vec<f32>> {
        self.batch.refill(&self.pool[range], &self.transform)?;
        self.optimizer.zero_grad(self.student.groups_mut());

        let teacher_probs = self.oracle.classify(&self.batch.frames)?;
        if teacher_probs.dim() != (self.batch.len(), self.oracle.num_classes()) {
            return Err(Error::shape(
                &[self.batch.len(), self.oracle.num_classes()],
                teacher_probs.shape(),
            ));
        }

        let output = run_sharded(
            &self.student,
            &self.objective,
            &self.batch.audio,
            &teacher_probs,
            self.config.shards,
        )?;
        self.student.set_gradients(output.gradients)?;
        self.optimizer.step(self.student.groups_mut());
        self.steps += 1;

        tracing::debug!(
            step = self.steps,
            batch = self.batch.len(),
            loss = output.losses.iter().sum::<f32>(),
            "batch step"
        );
        Ok(output.losses)
    }

    /// Persist the student and the statistics; the run is over afterwards
    pub fn finalize(&mut self, model_path: impl AsRef<Path>, stats_path: impl AsRef<Path>) -> Result<()> {
        if self.phase == Phase::Done {
            return Err(Error::InvalidParameter("run already finalized".into()));
        }
        self.phase = Phase::Finalizing;

        let (model_path, stats_path) = (model_path.as_ref(), stats_path.as_ref());
        self.student.save(model_path)?;
        tracing::info!(path = %model_path.display(), "saved model");
        self.statistics.save(stats_path)?;
        tracing::info!(path = %stats_path.display(), "saved training statistics");

        self.phase = Phase::Done;
        Ok(())
    }

    /// Release the trained student and the collected statistics
    pub fn into_parts(self) -> (StudentNetwork, TrainingStatistics) {
        (self.student, self.statistics)
    }
}

/// Fixed-size slices of `len` items; the last may be short
pub fn batch_ranges(len: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..len)
        .step_by(batch_size)
        .map(move |start| start..(start + batch_size).min(len))
}
