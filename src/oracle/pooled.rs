//! Linear probe over average-pooled colour patches

use super::Oracle;
use crate::autograd::{linear, softmax_rows};
use crate::io::{load_model, save_model, Model, ModelMetadata, SaveConfig};
use crate::optim::ParamGroup;
use crate::{Error, Result, Tensor};
use ndarray::{Array1, Array2, Array4, Axis};
use std::path::Path;

const ARCHITECTURE: &str = "pooled-linear";
const WEIGHT: &str = "classifier.weight";
const BIAS: &str = "classifier.bias";

/// Frozen classifier: each channel is average-pooled onto a `grid x grid`
/// lattice, then a linear layer and softmax produce class probabilities.
///
/// Checkpoints hold `classifier.weight [classes, 3*grid*grid]` and
/// `classifier.bias [classes]`, with `grid`, `input_width` and `input_height`
/// in the metadata.
pub struct PooledLinearOracle {
    params: ParamGroup,
    grid: usize,
    num_classes: usize,
    input_size: (u32, u32),
}

impl PooledLinearOracle {
    /// Build from explicit weights
    ///
    /// `weight` is `[classes, 3*grid*grid]`, `bias` is `[classes]`.
    pub fn from_parameters(
        weight: Array2<f32>,
        bias: Array1<f32>,
        grid: usize,
        input_size: (u32, u32),
    ) -> Result<Self> {
        let (classes, features) = weight.dim();
        if grid == 0 || input_size.0 < grid as u32 || input_size.1 < grid as u32 {
            return Err(Error::InvalidParameter(format!(
                "grid {grid} does not fit input size {input_size:?}"
            )));
        }
        if classes == 0 {
            return Err(Error::InvalidParameter("oracle must have at least one class".into()));
        }
        if features != 3 * grid * grid {
            return Err(Error::shape(&[classes, 3 * grid * grid], &[classes, features]));
        }
        if bias.len() != classes {
            return Err(Error::shape(&[classes], &[bias.len()]));
        }

        let weight = Tensor::from_shape_vec(vec![classes, features], weight.iter().copied().collect(), false);
        let bias = Tensor::new(bias, false);
        Ok(Self {
            params: ParamGroup::frozen(
                "oracle",
                vec![(WEIGHT.to_string(), weight), (BIAS.to_string(), bias)],
            ),
            grid,
            num_classes: classes,
            input_size,
        })
    }

    /// Load a checkpoint written by [`PooledLinearOracle::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let model = load_model(path)?;
        if model.metadata.architecture != ARCHITECTURE {
            return Err(Error::Serialization(format!(
                "{} holds a '{}' model, expected '{ARCHITECTURE}'",
                path.display(),
                model.metadata.architecture
            )));
        }

        let grid = model.custom_usize("grid")?;
        let width = input_dim(&model, "input_width")?;
        let height = input_dim(&model, "input_height")?;
        let weight = model
            .get_parameter(WEIGHT)
            .ok_or_else(|| Error::Serialization(format!("missing {WEIGHT}")))?;
        let [classes, features] = <[usize; 2]>::try_from(weight.shape())
            .map_err(|_| Error::shape(&[0, 3 * grid * grid], weight.shape()))?;
        let bias = model.expect_parameter(BIAS, &[classes])?;

        let weight = Array2::from_shape_vec((classes, features), weight.data().to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let oracle = Self::from_parameters(weight, bias.data().clone(), grid, (width, height))?;

        tracing::info!(
            path = %path.display(),
            classes,
            grid,
            "loaded oracle"
        );
        Ok(oracle)
    }

    /// Write the oracle as a checkpoint
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let metadata = ModelMetadata::new("oracle", ARCHITECTURE)
            .with_custom("grid", serde_json::json!(self.grid))
            .with_custom("input_width", serde_json::json!(self.input_size.0))
            .with_custom("input_height", serde_json::json!(self.input_size.1));
        let model = Model::new(metadata, self.params.params().to_vec());
        save_model(&model, path, &SaveConfig::for_path(path))
    }

    pub fn grid(&self) -> usize {
        self.grid
    }

    pub fn params(&self) -> &ParamGroup {
        &self.params
    }

    /// Average-pool each frame onto the grid: `[B, 3*grid*grid]`
    fn pool(&self, frames: &Array4<f32>) -> Array2<f32> {
        let (batch, channels, height, width) = frames.dim();
        let g = self.grid;
        let mut features = Array2::zeros((batch, channels * g * g));

        for (b, frame) in frames.axis_iter(Axis(0)).enumerate() {
            for c in 0..channels {
                for gy in 0..g {
                    let (y0, y1) = (gy * height / g, (gy + 1) * height / g);
                    for gx in 0..g {
                        let (x0, x1) = (gx * width / g, (gx + 1) * width / g);
                        let cell = frame.slice(ndarray::s![c, y0..y1, x0..x1]);
                        features[[b, (c * g + gy) * g + gx]] = cell.mean().unwrap_or(0.0);
                    }
                }
            }
        }
        features
    }
}

/// Read a frame dimension from checkpoint metadata
fn input_dim(model: &Model, key: &str) -> Result<u32> {
    let value = model.custom_usize(key)?;
    u32::try_from(value)
        .map_err(|_| Error::InvalidParameter(format!("{key} {value} does not fit in u32")))
}

impl Oracle for PooledLinearOracle {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn classify(&self, frames: &Array4<f32>) -> Result<Array2<f32>> {
        let (batch, channels, height, width) = frames.dim();
        let (w, h) = self.input_size;
        if (channels, height, width) != (3, h as usize, w as usize) {
            return Err(Error::shape(
                &[batch, 3, h as usize, w as usize],
                frames.shape(),
            ));
        }

        let features = self.pool(frames);
        let x = Tensor::from_shape_vec(
            vec![batch, features.ncols()],
            features.into_raw_vec_and_offset().0,
            false,
        );
        let (weight, bias) = (&self.params.params()[0].1, &self.params.params()[1].1);
        let probs = softmax_rows(&linear(&x, weight, bias)?)?;

        Array2::from_shape_vec((batch, self.num_classes), probs.data().to_vec())
            .map_err(|e| Error::InvalidParameter(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, Array};

    fn oracle(classes: usize, grid: usize) -> PooledLinearOracle {
        let features = 3 * grid * grid;
        let weight = Array::from_shape_fn((classes, features), |(k, f)| {
            ((k * 7 + f * 3) % 11) as f32 * 0.1 - 0.5
        });
        PooledLinearOracle::from_parameters(weight, Array1::zeros(classes), grid, (8, 8)).unwrap()
    }

    #[test]
    fn test_rows_are_distributions() {
        let o = oracle(5, 2);
        let frames = Array4::from_shape_fn((3, 3, 8, 8), |(b, c, y, x)| {
            (b + c) as f32 * 0.3 - (y * x) as f32 * 0.01
        });
        let probs = o.classify(&frames).unwrap();

        assert_eq!(probs.dim(), (3, 5));
        for row in probs.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5);
            assert!(row.iter().all(|&p| p > 0.0));
        }
    }

    #[test]
    fn test_pool_averages_cells() {
        let o = oracle(2, 2);
        let mut frames = Array4::<f32>::zeros((1, 3, 8, 8));
        // Top-left quadrant of the red channel set to 1
        frames.slice_mut(ndarray::s![0, 0, 0..4, 0..4]).fill(1.0);
        frames.slice_mut(ndarray::s![0, 2, 4..8, 0..8]).fill(2.0);

        let pooled = o.pool(&frames);
        assert_eq!(pooled.row(0).to_vec(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn test_bias_only_oracle() {
        let weight = Array2::zeros((3, 3));
        let bias = arr1(&[0.0, (2.0f32).ln(), 0.0]);
        let o = PooledLinearOracle::from_parameters(weight, bias, 1, (4, 4)).unwrap();
        let probs = o.classify(&Array4::zeros((1, 3, 4, 4))).unwrap();
        assert_abs_diff_eq!(probs[[0, 1]], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(probs[[0, 0]], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_wrong_frame_size_is_shape_error() {
        let o = oracle(4, 2);
        let result = o.classify(&Array4::zeros((1, 3, 4, 4)));
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_feature_count_must_match_grid() {
        let result = PooledLinearOracle::from_parameters(Array2::zeros((2, 10)), Array1::zeros(2), 2, (8, 8));
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_parameters_are_frozen() {
        let o = oracle(2, 1);
        assert!(!o.params().is_trainable());
        assert!(o.params().params().iter().all(|(_, t)| !t.requires_grad()));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oracle.safetensors");
        let original = oracle(6, 2);
        original.save(&path).unwrap();

        let loaded = PooledLinearOracle::load(&path).unwrap();
        assert_eq!(loaded.num_classes(), 6);
        assert_eq!(loaded.grid(), 2);
        assert_eq!(loaded.input_size(), (8, 8));

        let frames = Array4::from_shape_fn((2, 3, 8, 8), |(b, c, y, x)| (b * 3 + c + y + x) as f32 * 0.05);
        let a = original.classify(&frames).unwrap();
        let b = loaded.classify(&frames).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_oversized_input_dimension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oracle.safetensors");
        let metadata = ModelMetadata::new("oracle", ARCHITECTURE)
            .with_custom("grid", serde_json::json!(1))
            .with_custom("input_width", serde_json::json!(1u64 << 33))
            .with_custom("input_height", serde_json::json!(8));
        let model = Model::new(
            metadata,
            vec![
                (WEIGHT.into(), Tensor::from_shape_vec(vec![2, 3], vec![0.0; 6], false)),
                (BIAS.into(), Tensor::from_shape_vec(vec![2], vec![0.0; 2], false)),
            ],
        );
        save_model(&model, &path, &SaveConfig::default()).unwrap();

        assert!(matches!(
            PooledLinearOracle::load(&path),
            Err(Error::InvalidParameter(ref msg)) if msg.contains("input_width")
        ));
    }

    #[test]
    fn test_load_rejects_other_architectures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("student.safetensors");
        let model = Model::new(
            ModelMetadata::new("student", "audio-student"),
            vec![("w".into(), Tensor::from_vec(vec![1.0], false))],
        );
        save_model(&model, &path, &SaveConfig::default()).unwrap();
        assert!(matches!(
            PooledLinearOracle::load(&path),
            Err(Error::Serialization(_))
        ));
    }
}
