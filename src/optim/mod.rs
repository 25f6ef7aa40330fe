//! Optimizers for training neural networks
//!
//! Parameters are handed to optimizers as [`ParamGroup`]s. A group's
//! [`Capability`] decides whether an optimizer may update it.

mod group;
mod optimizer;
mod sgd;

pub use group::{Capability, ParamGroup};
pub use optimizer::Optimizer;
pub use sgd::SGD;
