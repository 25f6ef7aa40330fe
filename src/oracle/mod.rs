//! Frozen image classifier used as the distillation target
//!
//! An [`Oracle`] maps a batch of normalized frames to class probability
//! distributions. Its parameters never receive gradient updates.

mod pooled;

pub use pooled::PooledLinearOracle;

use crate::frames::FrameTransform;
use crate::Result;
use ndarray::{Array2, Array4};

/// A frozen classifier over RGB frames
pub trait Oracle {
    /// Number of output classes
    fn num_classes(&self) -> usize;

    /// Expected frame size as `(width, height)`
    fn input_size(&self) -> (u32, u32);

    /// Preprocessing the classifier was trained with
    fn transform(&self) -> FrameTransform {
        let (width, height) = self.input_size();
        FrameTransform::imagenet(width, height)
    }

    /// Class probabilities for `[B, 3, H, W]` frames; each row sums to 1
    fn classify(&self, frames: &Array4<f32>) -> Result<Array2<f32>>;
}
