//! Model I/O - Loading and saving models
//!
//! Student checkpoints and oracle weights share one on-disk representation:
//! named f32 tensors with full shapes plus string metadata.

mod format;
mod load;
mod model;
mod save;

#[cfg(test)]
mod tests;

pub use format::{ModelFormat, SaveConfig};
pub use load::load_model;
pub use model::{Model, ModelMetadata, ModelState, ParameterInfo};
pub use save::save_model;
