//! Training and evaluation statistics
//!
//! Plain accumulators serialized to JSON once a run completes. Field names
//! are part of the on-disk format read by the plotting tools.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

/// Losses recorded for one source during one epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Per-pair KL divergence, in the order batches were processed
    pub kldiv_per_frame: Vec<f32>,
}

impl VideoRecord {
    pub fn mean(&self) -> Option<f32> {
        if self.kldiv_per_frame.is_empty() {
            None
        } else {
            Some(self.kldiv_per_frame.iter().sum::<f32>() / self.kldiv_per_frame.len() as f32)
        }
    }
}

/// Everything recorded during one completed epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub videos: BTreeMap<String, VideoRecord>,
    /// Wall-clock seconds spent in the epoch
    pub training_time: f64,
}

impl EpochRecord {
    pub fn num_samples(&self) -> usize {
        self.videos.values().map(|v| v.kldiv_per_frame.len()).sum()
    }

    /// Mean loss over every sample of the epoch
    pub fn mean_loss(&self) -> Option<f32> {
        let n = self.num_samples();
        (n > 0).then(|| {
            let total: f32 = self
                .videos
                .values()
                .flat_map(|v| v.kldiv_per_frame.iter())
                .sum();
            total / n as f32
        })
    }
}

/// Builds the [`EpochRecord`] for the epoch in progress
#[derive(Debug)]
pub struct EpochRecorder {
    started: Instant,
    videos: BTreeMap<String, VideoRecord>,
}

impl Default for EpochRecorder {
    fn default() -> Self {
        Self::start()
    }
}

impl EpochRecorder {
    /// Begin timing a new epoch
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            videos: BTreeMap::new(),
        }
    }

    /// Append one sample's loss to its source's sequence
    pub fn record(&mut self, source_id: &str, loss: f32) {
        match self.videos.get_mut(source_id) {
            Some(video) => video.kldiv_per_frame.push(loss),
            None => {
                self.videos.insert(
                    source_id.to_string(),
                    VideoRecord {
                        kldiv_per_frame: vec![loss],
                    },
                );
            }
        }
    }

    /// Append a batch of losses, pairing each with its source
    pub fn record_batch<'a>(
        &mut self,
        source_ids: impl IntoIterator<Item = &'a str>,
        losses: &[f32],
    ) -> Result<()> {
        let ids: Vec<&str> = source_ids.into_iter().collect();
        if ids.len() != losses.len() {
            return Err(Error::shape(&[ids.len()], &[losses.len()]));
        }
        for (id, &loss) in ids.into_iter().zip(losses) {
            self.record(id, loss);
        }
        Ok(())
    }

    /// Stop the clock and seal the record
    pub fn finish(self) -> EpochRecord {
        EpochRecord {
            videos: self.videos,
            training_time: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Hyperparameters plus one record per completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatistics {
    pub num_epochs: usize,
    pub video_sample_period_msec: u32,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub epochs: Vec<EpochRecord>,
}

impl TrainingStatistics {
    pub fn new(
        num_epochs: usize,
        video_sample_period_msec: u32,
        batch_size: usize,
        learning_rate: f64,
    ) -> Self {
        Self {
            num_epochs,
            video_sample_period_msec,
            batch_size,
            learning_rate,
            epochs: Vec::with_capacity(num_epochs),
        }
    }

    pub fn push_epoch(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    /// Mean loss per epoch for one source, in epoch order
    pub fn mean_loss_per_epoch(&self, source_id: &str) -> Vec<Option<f32>> {
        self.epochs
            .iter()
            .map(|e| e.videos.get(source_id).and_then(VideoRecord::mean))
            .collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_json(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }
}

/// Output of an evaluation pass over one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStatistics {
    pub model_file: String,
    pub sample_period_msec: u32,
    /// Student class probabilities per window, in temporal order
    pub frame_probabilities: Vec<Vec<f32>>,
}

impl EvaluationStatistics {
    /// Indices of the `k` most probable classes for each frame, best first
    pub fn top_k(&self, k: usize) -> Vec<Vec<usize>> {
        self.frame_probabilities
            .iter()
            .map(|probs| {
                let mut order: Vec<usize> = (0..probs.len()).collect();
                order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
                order.truncate(k);
                order
            })
            .collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_json(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(value)
        .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json)?;
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))
}
