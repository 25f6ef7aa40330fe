//! In-memory media for tests and demos

use super::source::{source_id, AudioTrack, MediaDecoder, MediaSource, VideoInfo};
use crate::{Error, Result};
use image::{Rgb, RgbImage};
use ndarray::Array2;
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::path::{Path, PathBuf};

/// Procedurally generated video source
///
/// Frames are solid colours that drift with time; audio is a sine tone whose
/// pitch is derived from the source id, so different sources are distinguishable.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    info: VideoInfo,
    tone_hz: f64,
    audio_shortfall: usize,
}

impl SyntheticSource {
    pub fn new(source_id: impl Into<String>, duration: f64) -> Self {
        let source_id = source_id.into();
        let tone_hz = 220.0 + (source_id.bytes().map(u64::from).sum::<u64>() % 500) as f64;
        Self {
            info: VideoInfo {
                source_id,
                duration,
                frame_rate: 25.0,
                audio_sample_rate: 44100,
                audio_channels: 2,
                width: 32,
                height: 24,
            },
            tone_hz,
            audio_shortfall: 0,
        }
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.info.frame_rate = fps;
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.info.width = width;
        self.info.height = height;
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.info.audio_channels = channels;
        self
    }

    /// Make the decoded audio stream end `samples` early
    pub fn with_audio_shortfall(mut self, samples: usize) -> Self {
        self.audio_shortfall = samples;
        self
    }

    fn frame_color(&self, index: usize) -> Rgb<u8> {
        let seed = self.tone_hz as usize;
        Rgb([
            ((index * 7 + seed) % 256) as u8,
            ((index * 13 + seed / 2) % 256) as u8,
            ((index * 29 + seed / 3) % 256) as u8,
        ])
    }
}

impl MediaSource for SyntheticSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frames_at(&mut self, times: &[f64]) -> Result<Vec<RgbImage>> {
        let last = (self.info.duration * self.info.frame_rate).ceil().max(1.0) as usize - 1;
        Ok(times
            .iter()
            .map(|&t| {
                let index = ((t * self.info.frame_rate + 1e-5).floor().max(0.0) as usize).min(last);
                RgbImage::from_pixel(self.info.width, self.info.height, self.frame_color(index))
            })
            .collect())
    }

    fn audio(&mut self, sample_rate: u32) -> Result<AudioTrack> {
        if self.info.audio_channels == 0 {
            return Err(Error::decode(&self.info.source_id, "no audio stream"));
        }
        let channels = self.info.audio_channels;
        let total = (self.info.duration * sample_rate as f64).round() as usize;
        let num_samples = total.saturating_sub(self.audio_shortfall);

        let samples = Array2::from_shape_fn((num_samples, channels), |(i, c)| {
            let t = i as f64 / sample_rate as f64;
            let amplitude = 0.5 / (c + 1) as f64;
            (amplitude * (TAU * self.tone_hz * t).sin()) as f32
        });
        Ok(AudioTrack {
            sample_rate,
            samples,
        })
    }
}

/// Decoder that serves registered [`SyntheticSource`]s by path
#[derive(Debug, Clone, Default)]
pub struct SyntheticDecoder {
    sources: HashMap<PathBuf, SyntheticSource>,
}

impl SyntheticDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source of `duration` seconds under `path`
    pub fn with_source(self, path: impl Into<PathBuf>, duration: f64) -> Self {
        let path = path.into();
        let source = SyntheticSource::new(source_id(&path), duration);
        self.with(path, source)
    }

    pub fn with(mut self, path: impl Into<PathBuf>, source: SyntheticSource) -> Self {
        self.sources.insert(path.into(), source);
        self
    }
}

impl MediaDecoder for SyntheticDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>> {
        self.sources
            .get(path)
            .cloned()
            .map(|s| Box::new(s) as Box<dyn MediaSource>)
            .ok_or_else(|| Error::decode(source_id(path), "file not found"))
    }
}
