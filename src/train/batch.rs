//! Stacking sampled pairs into batch tensors

use crate::frames::{FrameTransform, SampledPair};
use crate::{Error, Result};
use ndarray::{Array2, Array4, Axis};

/// Dense tensors for one batch of pairs
///
/// Buffers are reused across [`Batch::refill`] calls while the batch shape
/// stays the same, so a full-size batch allocates once per run.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Source of each row, in batch order
    pub source_ids: Vec<String>,
    /// Mono audio `[B, samples]`
    pub audio: Array2<f32>,
    /// Normalized frames `[B, 3, H, W]`
    pub frames: Array4<f32>,
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            source_ids: Vec::new(),
            audio: Array2::zeros((0, 0)),
            frames: Array4::zeros((0, 0, 0, 0)),
        }
    }
}

impl Batch {
    /// Stack `pairs` into fresh buffers
    pub fn stack(pairs: &[SampledPair], transform: &FrameTransform) -> Result<Self> {
        let mut batch = Self::default();
        batch.refill(pairs, transform)?;
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.source_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_ids.is_empty()
    }

    /// Overwrite this batch with `pairs`
    ///
    /// Fails with a shape error if audio segments differ in length.
    pub fn refill(&mut self, pairs: &[SampledPair], transform: &FrameTransform) -> Result<()> {
        let first = pairs
            .first()
            .ok_or_else(|| Error::InvalidParameter("cannot stack an empty batch".into()))?;
        let samples = first.audio_segment.len();
        if let Some(bad) = pairs.iter().find(|p| p.audio_segment.len() != samples) {
            return Err(Error::shape(
                &[pairs.len(), samples],
                &[pairs.len(), bad.audio_segment.len()],
            ));
        }

        let (width, height) = transform.size();
        let frame_dim = (pairs.len(), 3, height as usize, width as usize);
        if self.audio.dim() != (pairs.len(), samples) {
            self.audio = Array2::zeros((pairs.len(), samples));
        }
        if self.frames.dim() != frame_dim {
            self.frames = Array4::zeros(frame_dim);
        }

        self.source_ids.clear();
        for ((pair, mut audio_row), frame_out) in pairs
            .iter()
            .zip(self.audio.axis_iter_mut(Axis(0)))
            .zip(self.frames.axis_iter_mut(Axis(0)))
        {
            audio_row
                .iter_mut()
                .zip(&pair.audio_segment)
                .for_each(|(dst, &src)| *dst = src);
            if pair.video_frame.dimensions() == (width, height) {
                transform.normalize_into(&pair.video_frame, frame_out)?;
            } else {
                transform.normalize_into(&transform.resize(&pair.video_frame), frame_out)?;
            }
            self.source_ids.push(pair.source_id.clone());
        }
        Ok(())
    }
}
