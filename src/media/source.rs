//! Decoder traits and decoded media types

use crate::Result;
use image::RgbImage;
use ndarray::Array2;
use std::path::Path;

/// Immutable description of an opened video source
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Identifier used to key statistics (file name of the source)
    pub source_id: String,
    /// Duration in seconds
    pub duration: f64,
    /// Video frames per second
    pub frame_rate: f64,
    /// Native audio sample rate in Hz
    pub audio_sample_rate: u32,
    /// Native audio channel count
    pub audio_channels: usize,
    pub width: u32,
    pub height: u32,
}

/// Decoded audio, resampled to `sample_rate`
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub sample_rate: u32,
    /// Samples laid out as `[num_samples, channels]`
    pub samples: Array2<f32>,
}

impl AudioTrack {
    pub fn num_samples(&self) -> usize {
        self.samples.nrows()
    }

    pub fn channels(&self) -> usize {
        self.samples.ncols()
    }

    /// Mean across channels for samples `[start, end)`, clamped to the track
    pub fn mono_slice(&self, start: usize, end: usize) -> Vec<f32> {
        let end = end.min(self.num_samples());
        let start = start.min(end);
        let channels = self.channels().max(1) as f32;
        self.samples
            .slice(ndarray::s![start..end, ..])
            .rows()
            .into_iter()
            .map(|row| row.sum() / channels)
            .collect()
    }
}

/// An opened, decodable video source
pub trait MediaSource {
    fn info(&self) -> &VideoInfo;

    /// Decode the frames displayed at each of `times` (seconds), in order
    fn frames_at(&mut self, times: &[f64]) -> Result<Vec<RgbImage>>;

    /// Decode the whole audio stream resampled to `sample_rate`
    fn audio(&mut self, sample_rate: u32) -> Result<AudioTrack>;
}

/// Opens video sources by path
pub trait MediaDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>>;
}

/// Statistics key for a source path: its file name, compression suffix included
pub fn source_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
