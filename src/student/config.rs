//! Student architecture hyperparameters

use crate::frames::DEFAULT_AUDIO_RATE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Shape of the audio student: one 1-D convolution over raw mono samples,
/// max pooling, global average pooling, and a dense layer onto the classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentConfig {
    /// Audio sample rate the network expects (Hz)
    pub sample_rate: u32,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub pool_kernel: usize,
    pub pool_stride: usize,
    pub pool_padding: usize,
    pub num_classes: usize,
}

impl Default for StudentConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_AUDIO_RATE,
            out_channels: 16,
            kernel_size: 64,
            stride: 2,
            padding: 32,
            pool_kernel: 8,
            pool_stride: 1,
            pool_padding: 4,
            num_classes: 1000,
        }
    }
}

impl StudentConfig {
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    pub fn with_out_channels(mut self, out_channels: usize) -> Self {
        self.out_channels = out_channels;
        self
    }

    pub fn with_conv(mut self, kernel_size: usize, stride: usize, padding: usize) -> Self {
        self.kernel_size = kernel_size;
        self.stride = stride;
        self.padding = padding;
        self
    }

    pub fn with_pool(mut self, kernel: usize, stride: usize, padding: usize) -> Self {
        self.pool_kernel = kernel;
        self.pool_stride = stride;
        self.pool_padding = padding;
        self
    }

    /// Length after the convolution for an input of `len` samples
    pub fn conv_len(&self, len: usize) -> Option<usize> {
        (len + 2 * self.padding)
            .checked_sub(self.kernel_size)
            .map(|n| n / self.stride + 1)
    }

    /// Length after pooling for an input of `len` samples
    pub fn pooled_len(&self, len: usize) -> Option<usize> {
        self.conv_len(len)
            .and_then(|n| (n + 2 * self.pool_padding).checked_sub(self.pool_kernel))
            .map(|n| n / self.pool_stride + 1)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("out_channels", self.out_channels),
            ("kernel_size", self.kernel_size),
            ("stride", self.stride),
            ("pool_kernel", self.pool_kernel),
            ("pool_stride", self.pool_stride),
            ("num_classes", self.num_classes),
            ("sample_rate", self.sample_rate as usize),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::ConfigError(format!("student {name} must be positive")));
        }
        if self.pool_padding > self.pool_kernel / 2 {
            return Err(Error::ConfigError(format!(
                "student pool_padding {} exceeds half of pool_kernel {}",
                self.pool_padding, self.pool_kernel
            )));
        }
        Ok(())
    }
}
