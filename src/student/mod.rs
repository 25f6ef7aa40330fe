//! Audio student network
//!
//! `Conv1d -> MaxPool1d -> global average -> Linear`, producing unnormalized
//! logits over the oracle's classes from a window of raw mono audio.

mod config;
mod network;


pub use config::StudentConfig;
pub use network::{StudentNetwork, StudentSnapshot};
