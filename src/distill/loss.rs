//! Distillation objective

use crate::autograd::{kl_div_rows, log_softmax_rows, sum};
use crate::{Error, Result, Tensor};
use ndarray::Array2;

/// KL divergence from the oracle's distribution to the student's
///
/// # Formula
///
/// ```text
/// loss_b = Σ_k p[b,k] * (ln p[b,k] - log_softmax(z)[b,k])
/// ```
///
/// where `p` is the oracle's probability row and `z` the student's logits.
/// Terms with `p == 0` contribute zero. Gradients flow only into `z`.
///
/// # Example
///
/// ```
/// use audionet::distill::KlDivergenceObjective;
/// use audionet::Tensor;
/// use ndarray::array;
///
/// let objective = KlDivergenceObjective::new();
/// let teacher = array![[0.7, 0.2, 0.1]];
/// let student = Tensor::from_shape_vec(vec![1, 3], vec![2.0, 0.5, -1.0], true);
/// let losses = objective.per_sample(&teacher, &student).unwrap();
/// assert!(losses.data()[0] >= 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct KlDivergenceObjective;

impl KlDivergenceObjective {
    pub fn new() -> Self {
        Self
    }

    /// Per-sample divergence, a `[batch]` tensor with no reduction
    ///
    /// `teacher_probs` is `[batch, classes]`; `student_logits` must match it.
    pub fn per_sample(&self, teacher_probs: &Array2<f32>, student_logits: &Tensor) -> Result<Tensor> {
        let (batch, classes) = teacher_probs.dim();
        if student_logits.shape() != [batch, classes] {
            return Err(Error::shape(&[batch, classes], student_logits.shape()));
        }

        let targets = Tensor::from_shape_vec(
            vec![batch, classes],
            teacher_probs.iter().copied().collect(),
            false,
        );
        kl_div_rows(&log_softmax_rows(student_logits)?, &targets)
    }

    /// Batch objective: the sum of per-sample losses
    pub fn total(&self, per_sample: &Tensor) -> Tensor {
        sum(per_sample)
    }
}
