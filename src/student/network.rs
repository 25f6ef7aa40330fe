//! The trainable audio network

use super::StudentConfig;
use crate::autograd::{conv1d, global_avg_pool1d, linear, max_pool1d, softmax_rows};
use crate::io::{load_model, save_model, Model, ModelMetadata, SaveConfig};
use crate::optim::ParamGroup;
use crate::{Error, Result, Tensor};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

const ARCHITECTURE: &str = "audio-student";
const CONV_WEIGHT: &str = "conv.weight";
const CONV_BIAS: &str = "conv.bias";
const DENSE_WEIGHT: &str = "dense.weight";
const DENSE_BIAS: &str = "dense.bias";

/// Audio classifier trained to mimic the oracle
pub struct StudentNetwork {
    config: StudentConfig,
    params: ParamGroup,
}

/// Plain-array copy of a network's parameters
///
/// Unlike [`StudentNetwork`], a snapshot is `Send` and can seed replicas on
/// worker threads.
#[derive(Debug, Clone)]
pub struct StudentSnapshot {
    pub config: StudentConfig,
    pub params: Vec<(String, Vec<usize>, Array1<f32>)>,
}

impl StudentNetwork {
    /// Uniform `±1/sqrt(fan_in)` initialization
    pub fn new(config: StudentConfig, rng: &mut impl Rng) -> Result<Self> {
        config.validate()?;
        let conv_fan_in = config.kernel_size;
        let dense_fan_in = config.out_channels;

        let mut uniform = |shape: Vec<usize>, fan_in: usize| {
            let bound = 1.0 / (fan_in as f32).sqrt();
            let size = shape.iter().product();
            let values = (0..size).map(|_| rng.random_range(-bound..bound)).collect();
            Tensor::from_shape_vec(shape, values, true)
        };

        let params = vec![
            (
                CONV_WEIGHT.to_string(),
                uniform(vec![config.out_channels, 1, config.kernel_size], conv_fan_in),
            ),
            (CONV_BIAS.to_string(), uniform(vec![config.out_channels], conv_fan_in)),
            (
                DENSE_WEIGHT.to_string(),
                uniform(vec![config.num_classes, config.out_channels], dense_fan_in),
            ),
            (DENSE_BIAS.to_string(), uniform(vec![config.num_classes], dense_fan_in)),
        ];

        Ok(Self {
            params: ParamGroup::trainable("student", params),
            config,
        })
    }

    /// Initialize from `seed`, or from OS entropy when absent
    pub fn seeded(config: StudentConfig, seed: Option<u64>) -> Result<Self> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(config, &mut rng)
    }

    pub fn config(&self) -> &StudentConfig {
        &self.config
    }

    pub fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    pub fn params(&self) -> &ParamGroup {
        &self.params
    }

    /// The parameter group, as a slice the optimizer can step
    pub fn groups_mut(&mut self) -> &mut [ParamGroup] {
        std::slice::from_mut(&mut self.params)
    }

    pub fn num_parameters(&self) -> usize {
        self.params.num_elements()
    }

    fn param(&self, index: usize) -> &Tensor {
        &self.params.params()[index].1
    }

    /// Logits `[B, classes]` for a batch of mono segments `[B, samples]`
    pub fn forward(&self, audio: &Array2<f32>) -> Result<Tensor> {
        let (batch, samples) = audio.dim();
        if batch == 0 {
            return Err(Error::InvalidParameter("empty audio batch".into()));
        }
        if self.config.pooled_len(samples).is_none() {
            return Err(Error::shape(&[batch, self.config.kernel_size], &[batch, samples]));
        }

        let x = Tensor::from_shape_vec(vec![batch, 1, samples], audio.iter().copied().collect(), false);
        let c = &self.config;
        let h = conv1d(&x, self.param(0), self.param(1), c.stride, c.padding)?;
        let h = max_pool1d(&h, c.pool_kernel, c.pool_stride, c.pool_padding)?;
        let h = global_avg_pool1d(&h)?;
        linear(&h, self.param(2), self.param(3))
    }

    /// Class probabilities `[B, classes]`, without recording gradients
    pub fn predict(&self, audio: &Array2<f32>) -> Result<Array2<f32>> {
        let logits = self.forward(audio)?.detach(false);
        let probs = softmax_rows(&logits)?;
        Array2::from_shape_vec((audio.nrows(), self.num_classes()), probs.data().to_vec())
            .map_err(|e| Error::InvalidParameter(e.to_string()))
    }

    pub fn snapshot(&self) -> StudentSnapshot {
        StudentSnapshot {
            config: self.config.clone(),
            params: self
                .params
                .params()
                .iter()
                .map(|(name, t)| (name.clone(), t.shape().to_vec(), t.data().clone()))
                .collect(),
        }
    }

    /// Rebuild a network with fresh gradient state from a snapshot
    pub fn from_snapshot(snapshot: &StudentSnapshot) -> Self {
        let params = snapshot
            .params
            .iter()
            .map(|(name, shape, data)| {
                (name.clone(), Tensor::with_shape(data.clone(), shape.clone(), true))
            })
            .collect();
        Self {
            config: snapshot.config.clone(),
            params: ParamGroup::trainable("student", params),
        }
    }

    /// Current gradient of every parameter, zeros where none was recorded
    pub fn gradients(&self) -> Vec<Array1<f32>> {
        self.params
            .params()
            .iter()
            .map(|(_, t)| t.grad().unwrap_or_else(|| Array1::zeros(t.len())))
            .collect()
    }

    /// Replace every parameter gradient
    pub fn set_gradients(&self, grads: Vec<Array1<f32>>) -> Result<()> {
        let params = self.params.params();
        if grads.len() != params.len() {
            return Err(Error::shape(&[params.len()], &[grads.len()]));
        }
        for ((_, tensor), grad) in params.iter().zip(grads) {
            if grad.len() != tensor.len() {
                return Err(Error::shape(&[tensor.len()], &[grad.len()]));
            }
            tensor.set_grad(grad);
        }
        Ok(())
    }

    pub fn to_model(&self, name: &str) -> Result<Model> {
        let custom = serde_json::to_value(&self.config)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let mut metadata = ModelMetadata::new(name, ARCHITECTURE);
        if let serde_json::Value::Object(fields) = custom {
            metadata.custom.extend(fields);
        }
        Ok(Model::new(metadata, self.params.params().to_vec()))
    }

    /// Write the network; the format follows the path's extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| ARCHITECTURE.to_string());
        save_model(&self.to_model(&name)?, path, &SaveConfig::for_path(path))
    }

    pub fn from_model(model: &Model) -> Result<Self> {
        if model.metadata.architecture != ARCHITECTURE {
            return Err(Error::Serialization(format!(
                "model '{}' is a '{}', expected '{ARCHITECTURE}'",
                model.metadata.name, model.metadata.architecture
            )));
        }
        let fields: serde_json::Map<String, serde_json::Value> =
            model.metadata.custom.clone().into_iter().collect();
        let config: StudentConfig = serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| Error::Serialization(format!("invalid student metadata: {e}")))?;
        config.validate()?;

        let c = &config;
        let expected = [
            (CONV_WEIGHT, vec![c.out_channels, 1, c.kernel_size]),
            (CONV_BIAS, vec![c.out_channels]),
            (DENSE_WEIGHT, vec![c.num_classes, c.out_channels]),
            (DENSE_BIAS, vec![c.num_classes]),
        ];
        let params = expected
            .into_iter()
            .map(|(name, shape)| {
                let tensor = model.expect_parameter(name, &shape)?;
                Ok((name.to_string(), tensor.detach(true)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            params: ParamGroup::trainable("student", params),
            config,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_model(&load_model(path)?)
    }
}

impl std::fmt::Debug for StudentNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudentNetwork")
            .field("config", &self.config)
            .field("num_parameters", &self.num_parameters())
            .finish()
    }
}
