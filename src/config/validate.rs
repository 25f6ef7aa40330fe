//! Configuration validation

use crate::train::TrainConfig;
use crate::{Error, Result};

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid sample period: {0} ms (must be > 0)")]
    InvalidPeriod(u32),

    #[error("Invalid audio sample rate: {0} Hz (must be > 0)")]
    InvalidSampleRate(u32),

    #[error("Invalid shard count: {0} (must be > 0)")]
    InvalidShards(usize),

    #[error("Invalid learning rate: {0} (must be finite and > 0.0)")]
    InvalidLearningRate(f64),

    #[error("Invalid momentum: {0} (must be in [0, 1))")]
    InvalidMomentum(f64),

    #[error("Nesterov momentum requires momentum > 0")]
    NesterovWithoutMomentum,
}

/// Check a training configuration, reporting the first problem found
pub fn check_config(config: &TrainConfig) -> std::result::Result<(), ValidationError> {
    if config.num_epochs == 0 {
        return Err(ValidationError::InvalidEpochs(config.num_epochs));
    }
    if config.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(config.batch_size));
    }
    if config.video_sample_period_msec == 0 {
        return Err(ValidationError::InvalidPeriod(config.video_sample_period_msec));
    }
    if config.audio_sample_rate == 0 {
        return Err(ValidationError::InvalidSampleRate(config.audio_sample_rate));
    }
    if config.shards == 0 {
        return Err(ValidationError::InvalidShards(config.shards));
    }
    if !config.learning_rate.is_finite() || config.learning_rate <= 0.0 {
        return Err(ValidationError::InvalidLearningRate(config.learning_rate));
    }
    if !(0.0..1.0).contains(&config.momentum) {
        return Err(ValidationError::InvalidMomentum(config.momentum));
    }
    if config.nesterov && config.momentum == 0.0 {
        return Err(ValidationError::NesterovWithoutMomentum);
    }
    Ok(())
}

/// Validate a training configuration
pub fn validate_config(config: &TrainConfig) -> Result<()> {
    check_config(config).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))
}
