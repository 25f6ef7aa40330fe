//! Run configuration
//!
//! Hyperparameters come from defaults, then an optional YAML file, then
//! command-line overrides, and are validated once merged.
//!
//! # Example
//!
//! ```yaml
//! num_epochs: 500
//! video_sample_period_msec: 40
//! batch_size: 256
//! learning_rate: 0.0001
//! momentum: 0.9
//! nesterov: true
//! shards: 4
//! ```

mod cli;
mod file;
mod layout;
mod validate;


pub use cli::{
    apply_overrides, parse_args, parse_cli, Cli, Command, EvaluateArgs, InspectArgs, TrainArgs,
};
pub use file::load_config;
pub use layout::{OutputLayout, STATS_SUFFIX};
pub use validate::{check_config, validate_config, ValidationError};
