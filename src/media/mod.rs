//! Media decoding
//!
//! Container parsing and codec work are delegated to an external decoder. This
//! module defines the seam ([`MediaDecoder`] / [`MediaSource`]), the ffmpeg-backed
//! implementation used by the CLI, gzip unwrapping for compressed sources, and a
//! synthetic in-memory source for tests and demos.

mod ffmpeg;
mod gzip;
mod source;
mod synthetic;

pub use ffmpeg::FfmpegDecoder;
pub use gzip::{decompress_to_temp, is_gzip};
pub use source::{source_id, AudioTrack, MediaDecoder, MediaSource, VideoInfo};
pub use synthetic::{SyntheticDecoder, SyntheticSource};
