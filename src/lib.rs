//! # Audionet: Audio Networks Distilled from an Image Classifier
//!
//! Audionet trains an audio network to reproduce, from the sound of a video,
//! the class distribution a frozen image classifier predicts for the
//! matching frame.
//!
//! ## Architecture
//!
//! - **autograd**: Tape-based automatic differentiation
//! - **optim**: SGD with Nesterov momentum over parameter groups
//! - **media**: Video decoding (ffmpeg, gzip containers, synthetic sources)
//! - **frames**: Time-aligned frame/audio pairing and image transforms
//! - **oracle**: Frozen image classifiers
//! - **student**: The trainable 1-D convolutional audio network
//! - **distill**: KL-divergence distillation objective
//! - **train**: Batched, sharded training loop
//! - **stats**: Training and evaluation statistics
//! - **config**: CLI, YAML configuration and validation
//! - **io**: Model saving and loading (SafeTensors, JSON, YAML)

pub mod autograd;
pub mod config;
pub mod distill;
pub mod eval;
pub mod frames;
pub mod io;
pub mod media;
pub mod optim;
pub mod oracle;
pub mod stats;
pub mod student;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Tensor};
pub use error::{Error, Result};
