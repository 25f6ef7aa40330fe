//! Fixed-period windowing of video sources into (frame, audio) pairs

use crate::media::{MediaDecoder, MediaSource};
use crate::{Error, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Audio sample rate the student consumes
pub const DEFAULT_AUDIO_RATE: u32 = 16000;
/// Default window length in milliseconds
pub const DEFAULT_PERIOD_MSEC: u32 = 40;

/// What to do with a window whose audio ends early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TailPolicy {
    /// Zero-pad the segment to the expected length
    #[default]
    Pad,
    /// Skip the window
    Drop,
    /// Fail with a shape error
    Error,
}

impl FromStr for TailPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pad" => Ok(TailPolicy::Pad),
            "drop" => Ok(TailPolicy::Drop),
            "error" => Ok(TailPolicy::Error),
            _ => Err(format!(
                "Unknown tail policy: {s}. Valid policies: pad, drop, error"
            )),
        }
    }
}

impl fmt::Display for TailPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TailPolicy::Pad => "pad",
            TailPolicy::Drop => "drop",
            TailPolicy::Error => "error",
        };
        f.write_str(name)
    }
}

/// One training example: a frame and the audio around it
#[derive(Debug, Clone)]
pub struct SampledPair {
    pub source_id: String,
    /// Frame at the window midpoint
    pub video_frame: RgbImage,
    /// Mono audio for the window at the sampler's rate
    pub audio_segment: Vec<f32>,
    /// Window start in seconds
    pub timestamp: f64,
}

/// Window geometry for one source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Windows {
    /// Effective period in seconds, clamped to the source duration
    pub period: f64,
    pub count: usize,
    /// Audio samples per window
    pub segment_len: usize,
}

impl Windows {
    pub fn start(&self, index: usize) -> f64 {
        index as f64 * self.period
    }

    pub fn midpoint(&self, index: usize) -> f64 {
        self.start(index) + self.period / 2.0
    }
}

/// Splits sources into non-overlapping windows of `period_msec`
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSampler {
    period_msec: u32,
    audio_rate: u32,
    tail_policy: TailPolicy,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_MSEC)
    }
}

impl FrameSampler {
    pub fn new(period_msec: u32) -> Self {
        Self {
            period_msec,
            audio_rate: DEFAULT_AUDIO_RATE,
            tail_policy: TailPolicy::default(),
        }
    }

    pub fn with_audio_rate(mut self, rate: u32) -> Self {
        self.audio_rate = rate;
        self
    }

    pub fn with_tail_policy(mut self, policy: TailPolicy) -> Self {
        self.tail_policy = policy;
        self
    }

    pub fn period_msec(&self) -> u32 {
        self.period_msec
    }

    pub fn audio_rate(&self) -> u32 {
        self.audio_rate
    }

    pub fn tail_policy(&self) -> TailPolicy {
        self.tail_policy
    }

    /// Samples per window for an unclamped period
    pub fn segment_len(&self) -> usize {
        (self.audio_rate as u64 * self.period_msec as u64 / 1000) as usize
    }

    /// Window geometry for a source of `duration` seconds
    pub fn windows(&self, source_id: &str, duration: f64) -> Result<Windows> {
        if self.period_msec == 0 {
            return Err(Error::InvalidParameter("period must be positive".into()));
        }
        if !(duration > 0.0) || !duration.is_finite() {
            return Err(Error::decode(source_id, format!("invalid duration {duration}")));
        }

        let nominal = self.period_msec as f64 / 1000.0;
        if nominal > duration {
            tracing::warn!(
                source = source_id,
                period_msec = self.period_msec,
                duration,
                "period exceeds duration, clamping to a single window"
            );
            return Ok(Windows {
                period: duration,
                count: 1,
                segment_len: (self.audio_rate as f64 * duration + 1e-9).floor() as usize,
            });
        }

        // Multiples of the period are computed directly so that float error
        // cannot add or drop a trailing window
        let count = (duration / nominal + 1e-9).floor() as usize;
        Ok(Windows {
            period: nominal,
            count,
            segment_len: self.segment_len(),
        })
    }

    /// Sample every window of an opened source
    pub fn sample(&self, source: &mut dyn MediaSource) -> Result<Vec<SampledPair>> {
        let info = source.info().clone();
        let windows = self.windows(&info.source_id, info.duration)?;

        let audio = source.audio(self.audio_rate)?;
        let midpoints: Vec<f64> = (0..windows.count).map(|i| windows.midpoint(i)).collect();
        let frames = source.frames_at(&midpoints)?;
        if frames.len() != windows.count {
            return Err(Error::decode(
                &info.source_id,
                format!("expected {} frames, decoded {}", windows.count, frames.len()),
            ));
        }

        let mut pairs = Vec::with_capacity(windows.count);
        for (index, video_frame) in frames.into_iter().enumerate() {
            let timestamp = windows.start(index);
            let start = (timestamp * self.audio_rate as f64).round() as usize;
            let mut audio_segment = audio.mono_slice(start, start + windows.segment_len);

            if audio_segment.len() < windows.segment_len {
                match self.tail_policy {
                    TailPolicy::Pad => {
                        tracing::warn!(
                            source = %info.source_id,
                            timestamp,
                            got = audio_segment.len(),
                            expected = windows.segment_len,
                            "zero-padding short audio segment"
                        );
                        audio_segment.resize(windows.segment_len, 0.0);
                    }
                    TailPolicy::Drop => {
                        tracing::warn!(source = %info.source_id, timestamp, "dropping short window");
                        continue;
                    }
                    TailPolicy::Error => {
                        return Err(Error::shape(
                            &[windows.segment_len],
                            &[audio_segment.len()],
                        ));
                    }
                }
            }

            pairs.push(SampledPair {
                source_id: info.source_id.clone(),
                video_frame,
                audio_segment,
                timestamp,
            });
        }

        tracing::debug!(source = %info.source_id, pairs = pairs.len(), "sampled source");
        Ok(pairs)
    }

    /// Open `path` with `decoder` and sample it
    pub fn sample_path(&self, decoder: &dyn MediaDecoder, path: &Path) -> Result<Vec<SampledPair>> {
        let mut source = decoder.open(path)?;
        self.sample(source.as_mut())
    }
}
