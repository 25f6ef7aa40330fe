//! Model loading functionality

use super::format::ModelFormat;
use super::model::{Model, ModelMetadata, ModelState};
use crate::{Error, Result, Tensor};
use safetensors::tensor::Dtype;
use std::path::Path;

/// Load a model from a file
///
/// The format is detected from the file extension; unknown extensions are
/// read as SafeTensors.
///
/// # Example
///
/// ```no_run
/// use audionet::io::load_model;
///
/// let model = load_model("output/models/audionet.pt").unwrap();
/// println!("Loaded model: {}", model.metadata.name);
/// ```
pub fn load_model(path: impl AsRef<Path>) -> Result<Model> {
    let path = path.as_ref();
    let format = ModelFormat::from_path(path);

    let state: ModelState = match format {
        ModelFormat::SafeTensors => return load_safetensors(path),
        ModelFormat::Json => {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?
        }
        ModelFormat::Yaml => {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Serialization(format!("YAML deserialization failed: {e}")))?
        }
    };

    Model::from_state(state)
}

/// Load model from SafeTensors format
fn load_safetensors(path: &Path) -> Result<Model> {
    let data = std::fs::read(path)?;

    let (_, st_metadata) = safetensors::SafeTensors::read_metadata(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;
    let header = st_metadata.metadata().clone().unwrap_or_default();
    let field = |key: &str| header.get(key).cloned().unwrap_or_else(|| "unknown".to_string());

    let mut metadata = ModelMetadata::new(field("name"), field("architecture"));
    if let Some(version) = header.get("version") {
        metadata.version = version.clone();
    }
    if let Some(custom) = header.get("custom") {
        metadata.custom = serde_json::from_str(custom)
            .map_err(|e| Error::Serialization(format!("invalid custom metadata: {e}")))?;
    }

    let safetensors = safetensors::SafeTensors::deserialize(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let mut names = safetensors.names();
    names.sort();

    let parameters = names
        .into_iter()
        .map(|name| {
            let view = safetensors
                .tensor(name)
                .map_err(|e| Error::Serialization(format!("tensor '{name}': {e}")))?;
            if view.dtype() != Dtype::F32 {
                return Err(Error::Serialization(format!(
                    "tensor '{name}' has dtype {:?}, expected F32",
                    view.dtype()
                )));
            }
            // The byte buffer carries no alignment guarantee
            let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
            let tensor = Tensor::from_shape_vec(view.shape().to_vec(), values, false);
            Ok((name.to_string(), tensor))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Model::new(metadata, parameters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{save_model, SaveConfig};

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = load_model("/nonexistent/model.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_load_garbage_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pt");
        std::fs::write(&path, b"not a model").unwrap();
        assert!(matches!(load_model(&path), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_load_rejects_non_f32_tensors() {
        use safetensors::tensor::TensorView;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ints.safetensors");
        let bytes = vec![0u8; 4];
        let view = TensorView::new(Dtype::I32, vec![1], &bytes).unwrap();
        let encoded = safetensors::serialize(vec![("x", view)], None).unwrap();
        std::fs::write(&path, encoded).unwrap();

        assert!(matches!(load_model(&path), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_load_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        let model = Model::new(
            ModelMetadata::new("json", "linear"),
            vec![("w".to_string(), Tensor::from_vec(vec![0.5, -0.5], false))],
        );
        save_model(&model, &path, &SaveConfig::for_path(&path)).unwrap();

        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded.metadata.name, "json");
        assert_eq!(loaded.get_parameter("w").unwrap().data(), model.get_parameter("w").unwrap().data());
    }
}
