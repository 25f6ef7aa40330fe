//! Knowledge Distillation
//!
//! The student is fit to the oracle's soft labels: each sample's loss is the
//! KL divergence from the oracle's class distribution to the student's.
//!
//! ## Example
//!
//! ```
//! use audionet::distill::KlDivergenceObjective;
//! use audionet::{backward, Tensor};
//! use ndarray::array;
//!
//! let objective = KlDivergenceObjective::new();
//! let teacher = array![[0.5, 0.5], [0.9, 0.1]];
//! let logits = Tensor::from_shape_vec(vec![2, 2], vec![0.0, 0.0, 0.0, 0.0], true);
//!
//! let per_sample = objective.per_sample(&teacher, &logits).unwrap();
//! let mut total = objective.total(&per_sample);
//! backward(&mut total, None);
//! assert!(logits.grad().is_some());
//! ```

mod loss;


pub use loss::KlDivergenceObjective;
