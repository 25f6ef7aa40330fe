//! High-level training loop
//!
//! This module provides the distillation run:
//! - Training configuration
//! - Batch stacking with buffer reuse
//! - Sharded gradient computation with an ordered reduction
//! - The [`DistillationTrainer`] state machine
//!
//! # Example
//!
//! ```no_run
//! use audionet::media::SyntheticDecoder;
//! use audionet::oracle::PooledLinearOracle;
//! use audionet::student::{StudentConfig, StudentNetwork};
//! use audionet::train::{DistillationTrainer, TrainConfig};
//!
//! let config = TrainConfig::default().with_epochs(2).with_seed(1);
//! let oracle = PooledLinearOracle::load("oracle.safetensors").unwrap();
//! let student = StudentNetwork::seeded(StudentConfig::default(), config.seed).unwrap();
//! let decoder = SyntheticDecoder::new().with_source("a.mp4", 1.0);
//!
//! let mut trainer = DistillationTrainer::new(config, oracle, student).unwrap();
//! trainer.load_sources(&decoder, &["a.mp4"]).unwrap();
//! for epoch in &trainer.train().unwrap().epochs {
//!     println!("{:.3}s", epoch.training_time);
//! }
//! ```

mod batch;
mod config;
mod shard;
mod trainer;


pub use batch::Batch;
pub use config::TrainConfig;
pub use shard::{run_shard, run_sharded, shard_ranges, ShardOutput};
pub use trainer::{batch_ranges, DistillationTrainer, Phase};
