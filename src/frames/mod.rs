//! Frame sampling
//!
//! Turns decoded sources into [`SampledPair`]s and prepares frames for the oracle.

mod sampler;
mod transform;


pub use sampler::{
    FrameSampler, SampledPair, TailPolicy, Windows, DEFAULT_AUDIO_RATE, DEFAULT_PERIOD_MSEC,
};
pub use transform::{FrameTransform, IMAGENET_MEAN, IMAGENET_STD};
