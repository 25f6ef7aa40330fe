//! Autograd operations with backward passes
//!
//! All ops work on row-major tensors and validate shapes up front, returning
//! `Error::ShapeMismatch` rather than panicking on inconsistent inputs.

use super::{BackwardOp, Tensor};
use crate::{Error, Result};
use ndarray::{Array1, ArrayView2, Axis};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<Array1<f32>>>>;

/// Extract the dimensions of a rank-`N` tensor
fn dims<const N: usize>(t: &Tensor) -> Result<[usize; N]> {
    <[usize; N]>::try_from(t.shape()).map_err(|_| {
        Error::InvalidParameter(format!(
            "expected a rank {N} tensor, got shape {:?}",
            t.shape()
        ))
    })
}

fn view2(t: &Tensor, rows: usize, cols: usize) -> ArrayView2<'_, f32> {
    ArrayView2::from_shape((rows, cols), t.as_slice()).expect("shape validated by caller")
}

fn flatten<D: ndarray::Dimension>(a: ndarray::Array<f32, D>) -> Array1<f32> {
    a.iter().copied().collect()
}

/// Recurse into the backward op of every input
fn propagate(inputs: &[&Tensor]) {
    for input in inputs {
        if let Some(op) = input.backward_op() {
            op.backward();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ConvGeometry {
    batch: usize,
    in_channels: usize,
    length: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    out_len: usize,
}

impl ConvGeometry {
    /// Kernel taps that land inside the unpadded input for output position `t`
    fn taps(&self, t: usize) -> std::ops::Range<usize> {
        let base = t * self.stride;
        let lo = self.padding.saturating_sub(base);
        let hi = (self.length + self.padding).saturating_sub(base).min(self.kernel);
        lo..hi.max(lo)
    }

    fn input_pos(&self, t: usize, k: usize) -> usize {
        t * self.stride + k - self.padding
    }
}

/// 1-D convolution
///
/// * `x` - input `[batch, in_channels, length]`
/// * `weight` - kernels `[out_channels, in_channels, kernel]`
/// * `bias` - `[out_channels]`
///
/// Returns `[batch, out_channels, (length + 2*padding - kernel) / stride + 1]`.
/// Padding is zero-valued.
pub fn conv1d(
    x: &Tensor,
    weight: &Tensor,
    bias: &Tensor,
    stride: usize,
    padding: usize,
) -> Result<Tensor> {
    let [batch, in_channels, length] = dims::<3>(x)?;
    let [out_channels, w_in, kernel] = dims::<3>(weight)?;
    if w_in != in_channels {
        return Err(Error::shape(
            &[out_channels, in_channels, kernel],
            weight.shape(),
        ));
    }
    if bias.shape() != [out_channels] {
        return Err(Error::shape(&[out_channels], bias.shape()));
    }
    if stride == 0 {
        return Err(Error::InvalidParameter("conv1d stride must be > 0".into()));
    }
    if length + 2 * padding < kernel {
        return Err(Error::shape(&[kernel], &[length + 2 * padding]));
    }

    let geom = ConvGeometry {
        batch,
        in_channels,
        length,
        out_channels,
        kernel,
        stride,
        padding,
        out_len: (length + 2 * padding - kernel) / stride + 1,
    };

    let xs = x.as_slice();
    let ws = weight.as_slice();
    let bs = bias.as_slice();
    let mut out = vec![0.0; batch * out_channels * geom.out_len];

    for b in 0..batch {
        for o in 0..out_channels {
            let out_row = &mut out[(b * out_channels + o) * geom.out_len..][..geom.out_len];
            for (t, slot) in out_row.iter_mut().enumerate() {
                let mut acc = bs[o];
                let taps = geom.taps(t);
                for c in 0..in_channels {
                    let w_row = &ws[(o * in_channels + c) * kernel..][..kernel];
                    let x_row = &xs[(b * in_channels + c) * length..][..length];
                    for k in taps.clone() {
                        acc += w_row[k] * x_row[geom.input_pos(t, k)];
                    }
                }
                *slot = acc;
            }
        }
    }

    let requires_grad = x.requires_grad() || weight.requires_grad() || bias.requires_grad();
    let mut result = Tensor::from_shape_vec(
        vec![batch, out_channels, geom.out_len],
        out,
        requires_grad,
    );

    if requires_grad {
        let backward_op = Rc::new(Conv1dBackward {
            x: x.clone(),
            weight: weight.clone(),
            bias: bias.clone(),
            geom,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct Conv1dBackward {
    x: Tensor,
    weight: Tensor,
    bias: Tensor,
    geom: ConvGeometry,
    result_grad: GradCell,
}

impl BackwardOp for Conv1dBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let g = &self.geom;
            let xs = self.x.as_slice();
            let ws = self.weight.as_slice();
            let mut grad_x = vec![0.0; xs.len()];
            let mut grad_w = vec![0.0; ws.len()];
            let mut grad_b = vec![0.0; g.out_channels];

            for b in 0..g.batch {
                for o in 0..g.out_channels {
                    let row = (b * g.out_channels + o) * g.out_len;
                    for t in 0..g.out_len {
                        let dy = grad[row + t];
                        if dy == 0.0 {
                            continue;
                        }
                        grad_b[o] += dy;
                        let taps = g.taps(t);
                        for c in 0..g.in_channels {
                            let w_off = (o * g.in_channels + c) * g.kernel;
                            let x_off = (b * g.in_channels + c) * g.length;
                            for k in taps.clone() {
                                let pos = x_off + g.input_pos(t, k);
                                // ∂L/∂w = ∂L/∂y * x, ∂L/∂x = ∂L/∂y * w
                                grad_w[w_off + k] += dy * xs[pos];
                                grad_x[pos] += dy * ws[w_off + k];
                            }
                        }
                    }
                }
            }

            if self.x.requires_grad() {
                self.x.accumulate_grad(Array1::from(grad_x));
            }
            if self.weight.requires_grad() {
                self.weight.accumulate_grad(Array1::from(grad_w));
            }
            if self.bias.requires_grad() {
                self.bias.accumulate_grad(Array1::from(grad_b));
            }

            propagate(&[&self.x, &self.weight, &self.bias]);
        }
    }
}

/// 1-D max pooling over the last axis of `[batch, channels, length]`
///
/// Padded positions behave as negative infinity. `padding` may be at most
/// half the kernel so every window sees at least one real sample.
pub fn max_pool1d(x: &Tensor, kernel: usize, stride: usize, padding: usize) -> Result<Tensor> {
    let [batch, channels, length] = dims::<3>(x)?;
    if kernel == 0 || stride == 0 {
        return Err(Error::InvalidParameter(
            "max_pool1d kernel and stride must be > 0".into(),
        ));
    }
    if padding > kernel / 2 {
        return Err(Error::InvalidParameter(format!(
            "max_pool1d padding {padding} exceeds half of kernel {kernel}"
        )));
    }
    if length + 2 * padding < kernel {
        return Err(Error::shape(&[kernel], &[length + 2 * padding]));
    }

    let out_len = (length + 2 * padding - kernel) / stride + 1;
    let rows = batch * channels;
    let xs = x.as_slice();
    let mut out = Vec::with_capacity(rows * out_len);
    let mut argmax = Vec::with_capacity(rows * out_len);

    for r in 0..rows {
        let row = &xs[r * length..][..length];
        for t in 0..out_len {
            let start = t * stride;
            let lo = start.saturating_sub(padding);
            let hi = (start + kernel).saturating_sub(padding).min(length);
            let mut best = lo;
            for i in lo..hi {
                if row[i] > row[best] {
                    best = i;
                }
            }
            out.push(row[best]);
            argmax.push(r * length + best);
        }
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::from_shape_vec(vec![batch, channels, out_len], out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MaxPoolBackward {
            x: x.clone(),
            argmax,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct MaxPoolBackward {
    x: Tensor,
    argmax: Vec<usize>,
    result_grad: GradCell,
}

impl BackwardOp for MaxPoolBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                // Gradient routes only to the winning input of each window
                let mut grad_x = Array1::zeros(self.x.len());
                for (&src, &dy) in self.argmax.iter().zip(grad.iter()) {
                    grad_x[src] += dy;
                }
                self.x.accumulate_grad(grad_x);
            }

            propagate(&[&self.x]);
        }
    }
}

/// Average over the whole last axis: `[batch, channels, length] -> [batch, channels]`
pub fn global_avg_pool1d(x: &Tensor) -> Result<Tensor> {
    let [batch, channels, length] = dims::<3>(x)?;
    if length == 0 {
        return Err(Error::shape(&[batch, channels, 1], x.shape()));
    }

    let data = view2(x, batch * channels, length).mean_axis(Axis(1));
    let data = data.ok_or_else(|| Error::shape(&[batch, channels, 1], x.shape()))?;

    let requires_grad = x.requires_grad();
    let mut result = Tensor::with_shape(data, vec![batch, channels], requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AvgPoolBackward {
            x: x.clone(),
            length,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct AvgPoolBackward {
    x: Tensor,
    length: usize,
    result_grad: GradCell,
}

impl BackwardOp for AvgPoolBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let scale = 1.0 / self.length as f32;
                let grad_x: Array1<f32> = grad
                    .iter()
                    .flat_map(|&dy| std::iter::repeat(dy * scale).take(self.length))
                    .collect();
                self.x.accumulate_grad(grad_x);
            }

            propagate(&[&self.x]);
        }
    }
}

/// Affine projection `y = x @ W^T + b`
///
/// * `x` - `[batch, in_features]`
/// * `weight` - `[out_features, in_features]`
/// * `bias` - `[out_features]`
pub fn linear(x: &Tensor, weight: &Tensor, bias: &Tensor) -> Result<Tensor> {
    let [batch, in_features] = dims::<2>(x)?;
    let [out_features, w_in] = dims::<2>(weight)?;
    if w_in != in_features {
        return Err(Error::shape(&[out_features, in_features], weight.shape()));
    }
    if bias.shape() != [out_features] {
        return Err(Error::shape(&[out_features], bias.shape()));
    }

    let xv = view2(x, batch, in_features);
    let wv = view2(weight, out_features, in_features);
    let y = xv.dot(&wv.t()) + bias.data();

    let requires_grad = x.requires_grad() || weight.requires_grad() || bias.requires_grad();
    let mut result = Tensor::with_shape(flatten(y), vec![batch, out_features], requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LinearBackward {
            x: x.clone(),
            weight: weight.clone(),
            bias: bias.clone(),
            batch,
            in_features,
            out_features,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct LinearBackward {
    x: Tensor,
    weight: Tensor,
    bias: Tensor,
    batch: usize,
    in_features: usize,
    out_features: usize,
    result_grad: GradCell,
}

impl BackwardOp for LinearBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let gv = ArrayView2::from_shape(
                (self.batch, self.out_features),
                grad.as_slice().expect("gradient storage is contiguous"),
            )
            .expect("gradient matches output shape");

            // ∂L/∂x = ∂L/∂y @ W
            if self.x.requires_grad() {
                let wv = view2(&self.weight, self.out_features, self.in_features);
                self.x.accumulate_grad(flatten(gv.dot(&wv)));
            }
            // ∂L/∂W = ∂L/∂y^T @ x
            if self.weight.requires_grad() {
                let xv = view2(&self.x, self.batch, self.in_features);
                self.weight.accumulate_grad(flatten(gv.t().dot(&xv)));
            }
            if self.bias.requires_grad() {
                self.bias.accumulate_grad(gv.sum_axis(Axis(0)));
            }

            propagate(&[&self.x, &self.weight, &self.bias]);
        }
    }
}

/// Row-wise softmax over `[batch, classes]`
pub fn softmax_rows(x: &Tensor) -> Result<Tensor> {
    let [batch, classes] = dims::<2>(x)?;
    if classes == 0 {
        return Err(Error::shape(&[batch, 1], x.shape()));
    }
    let mut data = x.data().clone();
    for mut row in data
        .as_slice_mut()
        .expect("fresh clone is contiguous")
        .chunks_mut(classes)
        .map(ndarray::ArrayViewMut1::from)
    {
        let max_val = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max_val).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::with_shape(data, vec![batch, classes], requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SoftmaxRowsBackward {
            a: x.clone(),
            output: result.data().clone(),
            classes,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct SoftmaxRowsBackward {
    a: Tensor,
    output: Array1<f32>,
    classes: usize,
    result_grad: GradCell,
}

impl BackwardOp for SoftmaxRowsBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂x = y ⊙ (∂L/∂y - (y · ∂L/∂y)), per row
                let mut grad_a = Array1::zeros(self.output.len());
                for start in (0..self.output.len()).step_by(self.classes) {
                    let range = start..start + self.classes;
                    let y = self.output.slice(ndarray::s![range.clone()]);
                    let g = grad_output.slice(ndarray::s![range.clone()]);
                    let dot = (&y * &g).sum();
                    grad_a
                        .slice_mut(ndarray::s![range])
                        .assign(&(&y * &(&g - dot)));
                }
                self.a.accumulate_grad(grad_a);
            }

            propagate(&[&self.a]);
        }
    }
}

/// Row-wise log-softmax over `[batch, classes]`
///
/// Computed as `x - logsumexp(x)` for numerical stability.
pub fn log_softmax_rows(x: &Tensor) -> Result<Tensor> {
    let [batch, classes] = dims::<2>(x)?;
    if classes == 0 {
        return Err(Error::shape(&[batch, 1], x.shape()));
    }

    let mut data = Vec::with_capacity(x.len());
    for row in x.as_slice().chunks(classes) {
        let max_val = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let lse = max_val + row.iter().map(|&v| (v - max_val).exp()).sum::<f32>().ln();
        data.extend(row.iter().map(|&v| v - lse));
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::from_shape_vec(vec![batch, classes], data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LogSoftmaxRowsBackward {
            a: x.clone(),
            output: result.data().clone(),
            classes,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct LogSoftmaxRowsBackward {
    a: Tensor,
    output: Array1<f32>,
    classes: usize,
    result_grad: GradCell,
}

impl BackwardOp for LogSoftmaxRowsBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂x_i = g_i - softmax(x)_i * Σ_j g_j
                let out = self.output.as_slice().expect("output is contiguous");
                let grad = grad_output.as_slice().expect("gradient is contiguous");
                let mut grad_a = Vec::with_capacity(out.len());
                for (log_p, g) in out.chunks(self.classes).zip(grad.chunks(self.classes)) {
                    let g_sum: f32 = g.iter().sum();
                    grad_a.extend(
                        log_p
                            .iter()
                            .zip(g)
                            .map(|(&lp, &gi)| gi - lp.exp() * g_sum),
                    );
                }
                self.a.accumulate_grad(Array1::from(grad_a));
            }

            propagate(&[&self.a]);
        }
    }
}

/// Per-row KL divergence between target probabilities and predicted log-probabilities
///
/// `out[b] = Σ_k p[b,k] * (ln p[b,k] - log_q[b,k])`, with terms where `p == 0`
/// contributing zero. Targets are treated as constants: no gradient flows into `p`.
///
/// Returns a `[batch]` tensor (no reduction across the batch).
pub fn kl_div_rows(log_q: &Tensor, p: &Tensor) -> Result<Tensor> {
    let [batch, classes] = dims::<2>(log_q)?;
    if p.shape() != log_q.shape() {
        return Err(Error::shape(log_q.shape(), p.shape()));
    }

    let data: Vec<f32> = log_q
        .as_slice()
        .chunks(classes.max(1))
        .zip(p.as_slice().chunks(classes.max(1)))
        .take(batch)
        .map(|(lq, pr)| {
            lq.iter()
                .zip(pr)
                .filter(|&(_, &pi)| pi > 0.0)
                .map(|(&lqi, &pi)| pi * (pi.ln() - lqi))
                .sum()
        })
        .collect();

    let requires_grad = log_q.requires_grad();
    let mut result = Tensor::from_shape_vec(vec![batch], data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(KlDivRowsBackward {
            log_q: log_q.clone(),
            p: p.data().clone(),
            classes,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct KlDivRowsBackward {
    log_q: Tensor,
    p: Array1<f32>,
    classes: usize,
    result_grad: GradCell,
}

impl BackwardOp for KlDivRowsBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.log_q.requires_grad() {
                // ∂out_b/∂log_q[b,k] = -p[b,k]
                let grad_q: Array1<f32> = self
                    .p
                    .iter()
                    .enumerate()
                    .map(|(i, &pi)| -pi * grad[i / self.classes])
                    .collect();
                self.log_q.accumulate_grad(grad_q);
            }

            propagate(&[&self.log_q]);
        }
    }
}

/// Sum all elements
pub fn sum(a: &Tensor) -> Tensor {
    let data = Array1::from(vec![a.data().sum()]);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SumBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SumBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for SumBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂sum * 1 (broadcast)
                let grad_a = Array1::from(vec![grad[0]; self.a.len()]);
                self.a.accumulate_grad(grad_a);
            }

            propagate(&[&self.a]);
        }
    }
}
