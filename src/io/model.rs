//! Model structure for serialization

use crate::{Error, Result, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Model metadata containing architecture and training information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name/identifier
    pub name: String,

    /// Model architecture type (e.g., "audio-student", "pooled-linear")
    pub architecture: String,

    /// Model version
    pub version: String,

    /// Architecture hyperparameters and other custom fields
    #[serde(default)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl ModelMetadata {
    /// Create new metadata with minimal fields
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            custom: BTreeMap::new(),
        }
    }

    /// Add custom metadata field
    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

/// Information about a model parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Parameter name (e.g., "conv.weight")
    pub name: String,

    /// Parameter shape
    pub shape: Vec<usize>,

    /// Data type; only "f32" is written
    pub dtype: String,
}

/// Serializable model state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub metadata: ModelMetadata,
    pub parameters: Vec<ParameterInfo>,
    /// Flattened parameter data, in `parameters` order
    pub data: Vec<f32>,
}

/// High-level model abstraction for I/O
pub struct Model {
    pub metadata: ModelMetadata,
    pub parameters: Vec<(String, Tensor)>,
}

impl Model {
    pub fn new(metadata: ModelMetadata, parameters: Vec<(String, Tensor)>) -> Self {
        Self {
            metadata,
            parameters,
        }
    }

    /// Get parameter by name
    pub fn get_parameter(&self, name: &str) -> Option<&Tensor> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// Get a parameter that must exist with the given shape
    pub fn expect_parameter(&self, name: &str, shape: &[usize]) -> Result<&Tensor> {
        let tensor = self.get_parameter(name).ok_or_else(|| {
            Error::Serialization(format!(
                "model '{}' has no parameter '{name}'",
                self.metadata.name
            ))
        })?;
        if tensor.shape() != shape {
            return Err(Error::shape(shape, tensor.shape()));
        }
        Ok(tensor)
    }

    /// Read a custom metadata field as an unsigned integer
    pub fn custom_usize(&self, key: &str) -> Result<usize> {
        self.metadata
            .custom
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .ok_or_else(|| Error::Serialization(format!("missing metadata field '{key}'")))
    }

    /// Total number of scalar parameters
    pub fn num_elements(&self) -> usize {
        self.parameters.iter().map(|(_, t)| t.len()).sum()
    }

    /// Convert model to serializable state
    pub fn to_state(&self) -> ModelState {
        let mut data = Vec::with_capacity(self.num_elements());
        let parameters = self
            .parameters
            .iter()
            .map(|(name, tensor)| {
                data.extend(tensor.data().iter().copied());
                ParameterInfo {
                    name: name.clone(),
                    shape: tensor.shape().to_vec(),
                    dtype: "f32".to_string(),
                }
            })
            .collect();

        ModelState {
            metadata: self.metadata.clone(),
            parameters,
            data,
        }
    }

    /// Create model from serializable state
    pub fn from_state(state: ModelState) -> Result<Self> {
        let expected: usize = state
            .parameters
            .iter()
            .map(|p| p.shape.iter().product::<usize>())
            .sum();
        if expected != state.data.len() {
            return Err(Error::shape(&[expected], &[state.data.len()]));
        }

        let mut offset = 0;
        let parameters = state
            .parameters
            .into_iter()
            .map(|info| {
                let size: usize = info.shape.iter().product();
                let values = state.data[offset..offset + size].to_vec();
                offset += size;
                (info.name, Tensor::from_shape_vec(info.shape, values, false))
            })
            .collect();

        Ok(Self {
            metadata: state.metadata,
            parameters,
        })
    }
}
