//! Named parameter groups with a trainable/frozen capability

use crate::Tensor;

/// Whether an optimizer may update a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Tensors track gradients and are updated by optimizer steps
    Trainable,
    /// Tensors never track gradients; optimizers skip the group
    Frozen,
}

/// A named set of parameters sharing one capability
///
/// The capability is fixed at construction: building a frozen group re-creates
/// every tensor without gradient tracking, so no tape can be recorded through it.
#[derive(Debug, Clone)]
pub struct ParamGroup {
    name: String,
    capability: Capability,
    params: Vec<(String, Tensor)>,
}

impl ParamGroup {
    fn build(
        name: impl Into<String>,
        capability: Capability,
        params: Vec<(String, Tensor)>,
    ) -> Self {
        let requires_grad = capability == Capability::Trainable;
        let params = params
            .into_iter()
            .map(|(n, t)| (n, t.detach(requires_grad)))
            .collect();
        Self {
            name: name.into(),
            capability,
            params,
        }
    }

    /// Group whose parameters the optimizer updates
    pub fn trainable(name: impl Into<String>, params: Vec<(String, Tensor)>) -> Self {
        Self::build(name, Capability::Trainable, params)
    }

    /// Group held constant for the lifetime of the run
    pub fn frozen(name: impl Into<String>, params: Vec<(String, Tensor)>) -> Self {
        Self::build(name, Capability::Frozen, params)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn is_trainable(&self) -> bool {
        self.capability == Capability::Trainable
    }

    /// Look up a parameter by name
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Named parameters in insertion order
    pub fn params(&self) -> &[(String, Tensor)] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [(String, Tensor)] {
        &mut self.params
    }

    /// Total number of scalar parameters
    pub fn num_elements(&self) -> usize {
        self.params.iter().map(|(_, t)| t.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
