//! Training hyperparameters from YAML

use crate::error::{Error, Result};
use crate::train::TrainConfig;
use std::fs;
use std::path::Path;

/// Load a [`TrainConfig`] from a YAML file
///
/// Missing fields take their defaults; unknown fields are rejected.
///
/// ```yaml
/// num_epochs: 200
/// batch_size: 128
/// learning_rate: 0.001
/// seed: 42
/// tail_policy: drop
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrainConfig> {
    let yaml_content = fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;

    serde_yaml::from_str(&yaml_content)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))
}
