//! Integration tests for Model I/O

use super::*;
use crate::Tensor;
use approx::assert_relative_eq;

fn conv_model() -> Model {
    let weight: Vec<f32> = (0..24).map(|i| i as f32 * 0.125 - 1.0).collect();
    let metadata = ModelMetadata::new("audionet", "audio-student")
        .with_custom("kernel_size", serde_json::json!(4))
        .with_custom("out_channels", serde_json::json!(2));
    Model::new(
        metadata,
        vec![
            ("conv.weight".to_string(), Tensor::from_shape_vec(vec![2, 3, 4], weight, false)),
            ("conv.bias".to_string(), Tensor::from_vec(vec![0.25, -0.75], false)),
        ],
    )
}

fn assert_same(original: &Model, loaded: &Model) {
    assert_eq!(original.metadata.name, loaded.metadata.name);
    assert_eq!(original.metadata.architecture, loaded.metadata.architecture);
    assert_eq!(original.metadata.custom, loaded.metadata.custom);
    assert_eq!(original.parameters.len(), loaded.parameters.len());

    for (name, tensor) in &original.parameters {
        let other = loaded.get_parameter(name).unwrap();
        assert_eq!(tensor.shape(), other.shape(), "shape of {name}");
        for (a, b) in tensor.data().iter().zip(other.data().iter()) {
            assert_relative_eq!(a, b);
        }
    }
}

#[test]
fn test_workflow_safetensors_keeps_shapes_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models/audionet.pt");
    let model = conv_model();

    save_model(&model, &path, &SaveConfig::for_path(&path)).unwrap();
    let loaded = load_model(&path).unwrap();

    assert_same(&model, &loaded);
    assert_eq!(loaded.custom_usize("kernel_size").unwrap(), 4);
}

#[test]
fn test_workflow_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audionet.json");
    let model = conv_model();

    save_model(&model, &path, &SaveConfig::for_path(&path)).unwrap();
    assert_same(&model, &load_model(&path).unwrap());
}

#[test]
fn test_workflow_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audionet.yml");
    let model = conv_model();

    save_model(&model, &path, &SaveConfig::for_path(&path)).unwrap();
    assert_same(&model, &load_model(&path).unwrap());
}

#[test]
fn test_large_parameter_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("large.safetensors");
    let values: Vec<f32> = (0..16000).map(|i| (i as f32 * 0.001).sin()).collect();
    let model = Model::new(
        ModelMetadata::new("large", "dense"),
        vec![("dense.weight".to_string(), Tensor::from_shape_vec(vec![1000, 16], values, false))],
    );

    save_model(&model, &path, &SaveConfig::default()).unwrap();
    assert_same(&model, &load_model(&path).unwrap());
}
