//! Training configuration

use crate::frames::{FrameSampler, TailPolicy, DEFAULT_AUDIO_RATE, DEFAULT_PERIOD_MSEC};
use serde::{Deserialize, Serialize};

/// Hyperparameters for one distillation run
///
/// Built once and handed to the trainer; `with_*` methods return modified copies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    /// Fixed number of passes over the pool
    pub num_epochs: usize,

    /// Sampling window length in milliseconds
    pub video_sample_period_msec: u32,

    pub batch_size: usize,

    pub learning_rate: f64,

    pub momentum: f64,

    pub nesterov: bool,

    /// Audio sample rate the student consumes (Hz)
    pub audio_sample_rate: u32,

    /// Seed for initialization and shuffling (None = OS entropy)
    pub seed: Option<u64>,

    /// Number of parallel shards each batch is split into
    pub shards: usize,

    /// Handling of windows whose audio runs short
    pub tail_policy: TailPolicy,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            num_epochs: 5000,
            video_sample_period_msec: DEFAULT_PERIOD_MSEC,
            batch_size: 512,
            learning_rate: 1e-4,
            momentum: 0.9,
            nesterov: true,
            audio_sample_rate: DEFAULT_AUDIO_RATE,
            seed: None,
            shards: 1,
            tail_policy: TailPolicy::Pad,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    pub fn with_period_msec(mut self, period: u32) -> Self {
        self.video_sample_period_msec = period;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set momentum; `nesterov` requires a positive momentum
    pub fn with_momentum(mut self, momentum: f64, nesterov: bool) -> Self {
        self.momentum = momentum;
        self.nesterov = nesterov;
        self
    }

    pub fn with_audio_rate(mut self, rate: u32) -> Self {
        self.audio_sample_rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_tail_policy(mut self, policy: TailPolicy) -> Self {
        self.tail_policy = policy;
        self
    }

    /// The sampler this configuration describes
    pub fn sampler(&self) -> FrameSampler {
        FrameSampler::new(self.video_sample_period_msec)
            .with_audio_rate(self.audio_sample_rate)
            .with_tail_policy(self.tail_policy)
    }
}
