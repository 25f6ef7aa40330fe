//! Image preprocessing for the oracle

use crate::{Error, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array4, ArrayViewMut3, Axis};

/// Per-channel mean of the ImageNet training set
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation of the ImageNet training set
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize to the oracle's input size and normalize into CHW float tensors
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTransform {
    width: u32,
    height: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl FrameTransform {
    /// Nearest-neighbour resize plus ImageNet normalization
    pub fn imagenet(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize a frame to the target size; frames already that size are cloned
    pub fn resize(&self, frame: &RgbImage) -> RgbImage {
        if frame.dimensions() == (self.width, self.height) {
            frame.clone()
        } else {
            imageops::resize(frame, self.width, self.height, FilterType::Nearest)
        }
    }

    /// Write the normalized frame into a `[3, H, W]` view
    pub fn normalize_into(&self, frame: &RgbImage, mut out: ArrayViewMut3<f32>) -> Result<()> {
        let (w, h) = frame.dimensions();
        let expected = [3, self.height as usize, self.width as usize];
        if (w, h) != (self.width, self.height) {
            return Err(Error::shape(&expected, &[3, h as usize, w as usize]));
        }
        if out.shape() != expected {
            return Err(Error::shape(&expected, out.shape()));
        }

        for (x, y, pixel) in frame.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel.0[c] as f32 / 255.0;
                out[[c, y as usize, x as usize]] = (value - self.mean[c]) / self.std[c];
            }
        }
        Ok(())
    }

    /// Stack frames into a `[B, 3, H, W]` batch, resizing any that differ in size
    pub fn stack<'a, I>(&self, frames: I) -> Result<Array4<f32>>
    where
        I: IntoIterator<Item = &'a RgbImage>,
        I::IntoIter: ExactSizeIterator,
    {
        let frames = frames.into_iter();
        let mut batch = Array4::zeros((frames.len(), 3, self.height as usize, self.width as usize));
        for (frame, out) in frames.zip(batch.axis_iter_mut(Axis(0))) {
            if frame.dimensions() == (self.width, self.height) {
                self.normalize_into(frame, out)?;
            } else {
                self.normalize_into(&self.resize(frame), out)?;
            }
        }
        Ok(batch)
    }
}
