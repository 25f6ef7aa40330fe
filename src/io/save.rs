//! Model saving functionality

use super::format::{ModelFormat, SaveConfig};
use super::model::Model;
use crate::{Error, Result};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::path::Path;

/// Save a model to a file, creating parent directories as needed
///
/// # Example
///
/// ```no_run
/// use audionet::io::{Model, ModelMetadata, save_model, SaveConfig, ModelFormat};
/// # use audionet::Tensor;
///
/// let params = vec![
///     ("weight".to_string(), Tensor::from_vec(vec![1.0, 2.0], false)),
/// ];
/// let model = Model::new(ModelMetadata::new("my-model", "linear"), params);
/// save_model(&model, "model.json", &SaveConfig::new(ModelFormat::Json)).unwrap();
/// ```
pub fn save_model(model: &Model, path: impl AsRef<Path>, config: &SaveConfig) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let bytes = match config.format {
        ModelFormat::SafeTensors => to_safetensors(model)?,
        ModelFormat::Json => {
            let state = model.to_state();
            let text = if config.pretty {
                serde_json::to_string_pretty(&state)
            } else {
                serde_json::to_string(&state)
            }
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;
            text.into_bytes()
        }
        ModelFormat::Yaml => serde_yaml::to_string(&model.to_state())
            .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}")))?
            .into_bytes(),
    };

    std::fs::write(path, bytes)?;
    tracing::debug!(path = %path.display(), format = ?config.format, "saved model");
    Ok(())
}

/// Encode a model in SafeTensors format
fn to_safetensors(model: &Model) -> Result<Vec<u8>> {
    let tensor_data: Vec<(&str, Vec<u8>, Vec<usize>)> = model
        .parameters
        .iter()
        .map(|(name, tensor)| {
            let bytes = bytemuck::cast_slice::<f32, u8>(tensor.as_slice()).to_vec();
            (name.as_str(), bytes, tensor.shape().to_vec())
        })
        .collect();

    let views = tensor_data
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (*name, view))
                .map_err(|e| Error::Serialization(format!("invalid tensor '{name}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let custom = serde_json::to_string(&model.metadata.custom)
        .map_err(|e| Error::Serialization(format!("metadata serialization failed: {e}")))?;
    let metadata = HashMap::from([
        ("name".to_string(), model.metadata.name.clone()),
        ("architecture".to_string(), model.metadata.architecture.clone()),
        ("version".to_string(), model.metadata.version.clone()),
        ("custom".to_string(), custom),
    ]);

    safetensors::serialize(views, Some(metadata))
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))
}
