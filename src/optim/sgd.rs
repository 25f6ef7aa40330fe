//! Stochastic Gradient Descent optimizer

use super::{Optimizer, ParamGroup};
use ndarray::Array1;
use std::collections::HashMap;

/// SGD optimizer with optional (Nesterov) momentum
///
/// Update rule, per parameter:
///
/// ```text
/// v = momentum * v + g          (v = g on the first step)
/// d = g + momentum * v          (nesterov)   |   d = v   (classic)
/// p = p - lr * d
/// ```
pub struct SGD {
    lr: f32,
    momentum: f32,
    nesterov: bool,
    velocities: HashMap<String, Array1<f32>>,
}

impl SGD {
    /// Create a new SGD optimizer with classic momentum
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            nesterov: false,
            velocities: HashMap::new(),
        }
    }

    /// Create SGD with Nesterov momentum
    pub fn nesterov(lr: f32, momentum: f32) -> Self {
        Self {
            nesterov: true,
            ..Self::new(lr, momentum)
        }
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    pub fn is_nesterov(&self) -> bool {
        self.nesterov
    }
}

impl Optimizer for SGD {
    fn step(&mut self, groups: &mut [ParamGroup]) {
        for group in groups.iter_mut().filter(|g| g.is_trainable()) {
            let prefix = group.name().to_string();
            for (name, param) in group.params_mut() {
                let Some(grad) = param.grad() else {
                    continue;
                };

                let direction = if self.momentum > 0.0 {
                    let key = format!("{prefix}.{name}");
                    let velocity = match self.velocities.remove(&key) {
                        Some(v) => v * self.momentum + &grad,
                        None => grad.clone(),
                    };
                    let direction = if self.nesterov {
                        &grad + &(&velocity * self.momentum)
                    } else {
                        velocity.clone()
                    };
                    self.velocities.insert(key, velocity);
                    direction
                } else {
                    grad
                };

                param.data_mut().scaled_add(-self.lr, &direction);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
