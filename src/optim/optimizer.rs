//! Optimizer trait

use super::ParamGroup;

/// Trait for optimization algorithms
///
/// Optimizers consume parameter groups and only ever touch groups whose
/// capability is [`Capability::Trainable`](super::Capability::Trainable).
pub trait Optimizer {
    /// Perform a single optimization step over every trainable group
    fn step(&mut self, groups: &mut [ParamGroup]);

    /// Zero out all gradients of trainable groups
    fn zero_grad(&mut self, groups: &mut [ParamGroup]) {
        for group in groups.iter_mut().filter(|g| g.is_trainable()) {
            for (_, param) in group.params_mut() {
                param.zero_grad();
            }
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}
