//! Tests for autograd operations with gradient checking

use super::*;
use approx::assert_abs_diff_eq;
use proptest::prelude::*;

/// Finite difference gradient checker
///
/// Computes numerical gradient using central difference:
/// f'(x) ≈ (f(x + h) - f(x - h)) / (2h)
fn finite_difference<F>(f: F, x: &[f32], epsilon: f32) -> Vec<f32>
where
    F: Fn(&[f32]) -> f32,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + epsilon;
        x_minus[i] = x[i] - epsilon;

        let f_plus = f(&x_plus);
        let f_minus = f(&x_minus);

        grad[i] = (f_plus - f_minus) / (2.0 * epsilon);

        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }

    grad
}

/// Weighted sum so that every output position gets a distinct upstream gradient
fn weighted_total(t: &Tensor) -> f32 {
    t.data()
        .iter()
        .enumerate()
        .map(|(i, &v)| v * (1.0 + 0.1 * i as f32))
        .sum()
}

fn weighted_grad(t: &Tensor) -> ndarray::Array1<f32> {
    (0..t.len()).map(|i| 1.0 + 0.1 * i as f32).collect()
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_tensor_creation() {
        let t = Tensor::from_shape_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], true);
        assert_eq!(t.len(), 6);
        assert_eq!(t.shape(), &[2, 3]);
        assert!(t.requires_grad());
        assert!(t.grad().is_none());
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_tensor_shape_must_cover_data() {
        Tensor::from_shape_vec(vec![2, 2], vec![1.0, 2.0, 3.0], false);
    }

    #[test]
    fn test_tensor_grad_accumulation() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);

        t.accumulate_grad(ndarray::arr1(&[1.0, 1.0, 1.0]));
        assert_eq!(t.grad().unwrap()[0], 1.0);

        t.accumulate_grad(ndarray::arr1(&[1.0, 1.0, 1.0]));
        assert_eq!(t.grad().unwrap()[0], 2.0);

        t.zero_grad();
        assert!(t.grad().is_none());
    }

    #[test]
    fn test_detach_has_independent_grad() {
        let t = Tensor::from_vec(vec![1.0, 2.0], true);
        let d = t.detach(true);
        d.set_grad(ndarray::arr1(&[5.0, 5.0]));
        assert!(t.grad().is_none());
        assert_eq!(d.data(), t.data());
    }

    #[test]
    fn test_conv1d_forward_known_values() {
        // One batch, one channel, kernel [1, -1], stride 1, no padding: a difference filter
        let x = Tensor::from_shape_vec(vec![1, 1, 4], vec![1.0, 3.0, 6.0, 10.0], false);
        let w = Tensor::from_shape_vec(vec![1, 1, 2], vec![1.0, -1.0], false);
        let b = Tensor::from_shape_vec(vec![1], vec![0.5], false);

        let y = conv1d(&x, &w, &b, 1, 0).unwrap();
        assert_eq!(y.shape(), &[1, 1, 3]);
        assert_abs_diff_eq!(y.data()[0], -1.5);
        assert_abs_diff_eq!(y.data()[1], -2.5);
        assert_abs_diff_eq!(y.data()[2], -3.5);
    }

    #[test]
    fn test_conv1d_output_length_with_stride_and_padding() {
        // Student geometry: kernel 64, stride 2, padding 32 on 640 samples -> 321
        let x = Tensor::zeros(vec![2, 1, 640], false);
        let w = Tensor::zeros(vec![4, 1, 64], false);
        let b = Tensor::zeros(vec![4], false);
        let y = conv1d(&x, &w, &b, 2, 32).unwrap();
        assert_eq!(y.shape(), &[2, 4, 321]);
    }

    #[test]
    fn test_conv1d_rejects_channel_mismatch() {
        let x = Tensor::zeros(vec![1, 2, 8], false);
        let w = Tensor::zeros(vec![1, 1, 3], false);
        let b = Tensor::zeros(vec![1], false);
        assert!(matches!(
            conv1d(&x, &w, &b, 1, 0),
            Err(crate::Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_conv1d_weight_gradient_matches_finite_difference() {
        let x_data = vec![0.3, -1.2, 0.8, 2.0, -0.5, 0.1, 0.9, -0.7, 1.1, 0.4];
        let w_data = vec![0.2, -0.4, 0.6, 0.1, 0.3, -0.2];
        let shape_x = vec![1, 2, 5];
        let shape_w = vec![1, 2, 3];

        let x = Tensor::from_shape_vec(shape_x.clone(), x_data.clone(), false);
        let w = Tensor::from_shape_vec(shape_w.clone(), w_data.clone(), true);
        let b = Tensor::from_shape_vec(vec![1], vec![0.05], true);

        let mut y = conv1d(&x, &w, &b, 2, 1).unwrap();
        let upstream = weighted_grad(&y);
        backward(&mut y, Some(upstream));

        let numeric = finite_difference(
            |wv| {
                let w = Tensor::from_shape_vec(shape_w.clone(), wv.to_vec(), false);
                let b = Tensor::from_shape_vec(vec![1], vec![0.05], false);
                weighted_total(&conv1d(&x, &w, &b, 2, 1).unwrap())
            },
            &w_data,
            1e-3,
        );

        let analytic = w.grad().unwrap();
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert_abs_diff_eq!(*a, *n, epsilon = 1e-2);
        }
        assert!(b.grad().is_some());
    }

    #[test]
    fn test_max_pool_routes_gradient_to_argmax() {
        let x = Tensor::from_shape_vec(vec![1, 1, 4], vec![1.0, 5.0, 2.0, 0.0], true);
        let mut y = max_pool1d(&x, 2, 2, 0).unwrap();
        assert_eq!(y.data().to_vec(), vec![5.0, 2.0]);

        backward(&mut y, Some(ndarray::arr1(&[1.0, 3.0])));
        assert_eq!(x.grad().unwrap().to_vec(), vec![0.0, 1.0, 3.0, 0.0]);
    }

    #[test]
    fn test_max_pool_padding_never_wins() {
        // All-negative input: padded slots must not produce zeros
        let x = Tensor::from_shape_vec(vec![1, 1, 3], vec![-3.0, -1.0, -2.0], false);
        let y = max_pool1d(&x, 2, 1, 1).unwrap();
        assert_eq!(y.shape(), &[1, 1, 4]);
        assert_eq!(y.data().to_vec(), vec![-3.0, -1.0, -1.0, -2.0]);
    }

    #[test]
    fn test_max_pool_rejects_oversized_padding() {
        let x = Tensor::zeros(vec![1, 1, 8], false);
        assert!(max_pool1d(&x, 4, 1, 3).is_err());
    }

    #[test]
    fn test_global_avg_pool_forward_backward() {
        let x = Tensor::from_shape_vec(vec![1, 2, 2], vec![1.0, 3.0, 2.0, 6.0], true);
        let mut y = global_avg_pool1d(&x).unwrap();
        assert_eq!(y.shape(), &[1, 2]);
        assert_eq!(y.data().to_vec(), vec![2.0, 4.0]);

        backward(&mut y, Some(ndarray::arr1(&[1.0, 2.0])));
        assert_eq!(x.grad().unwrap().to_vec(), vec![0.5, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_linear_gradients_match_finite_difference() {
        let x_data = vec![0.5, -1.0, 2.0, 0.25, 1.5, -0.75];
        let w_data = vec![0.1, 0.2, -0.3, 0.4, -0.5, 0.6, 0.7, -0.8, 0.9, 0.05, 0.15, -0.25];
        let x = Tensor::from_shape_vec(vec![2, 3], x_data.clone(), true);
        let w = Tensor::from_shape_vec(vec![4, 3], w_data.clone(), true);
        let b = Tensor::from_shape_vec(vec![4], vec![0.0, 0.1, 0.2, 0.3], true);

        let mut y = linear(&x, &w, &b).unwrap();
        assert_eq!(y.shape(), &[2, 4]);
        let upstream = weighted_grad(&y);
        backward(&mut y, Some(upstream));

        let bias = vec![0.0, 0.1, 0.2, 0.3];
        let numeric_w = finite_difference(
            |wv| {
                let x = Tensor::from_shape_vec(vec![2, 3], x_data.clone(), false);
                let w = Tensor::from_shape_vec(vec![4, 3], wv.to_vec(), false);
                let b = Tensor::from_shape_vec(vec![4], bias.clone(), false);
                weighted_total(&linear(&x, &w, &b).unwrap())
            },
            &w_data,
            1e-3,
        );
        let numeric_x = finite_difference(
            |xv| {
                let x = Tensor::from_shape_vec(vec![2, 3], xv.to_vec(), false);
                let w = Tensor::from_shape_vec(vec![4, 3], w_data.clone(), false);
                let b = Tensor::from_shape_vec(vec![4], bias.clone(), false);
                weighted_total(&linear(&x, &w, &b).unwrap())
            },
            &x_data,
            1e-3,
        );

        for (a, n) in w.grad().unwrap().iter().zip(numeric_w.iter()) {
            assert_abs_diff_eq!(*a, *n, epsilon = 1e-2);
        }
        for (a, n) in x.grad().unwrap().iter().zip(numeric_x.iter()) {
            assert_abs_diff_eq!(*a, *n, epsilon = 1e-2);
        }
        // Bias gradient is the column sum of the upstream gradient
        let gb = b.grad().unwrap();
        assert_abs_diff_eq!(gb[0], 1.0 + 1.4, epsilon = 1e-5);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = Tensor::from_shape_vec(vec![2, 3], vec![1.0, 2.0, 3.0, -5.0, 0.0, 5.0], false);
        let y = softmax_rows(&x).unwrap();
        for row in y.as_slice().chunks(3) {
            assert_abs_diff_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        }
        assert!(y.backward_op().is_none());
    }

    #[test]
    fn test_log_softmax_matches_log_of_softmax() {
        let x = Tensor::from_shape_vec(vec![1, 4], vec![0.5, -1.0, 3.0, 2.0], false);
        let ls = log_softmax_rows(&x).unwrap();
        let s = softmax_rows(&x).unwrap();
        for (a, b) in ls.data().iter().zip(s.data().iter()) {
            assert_abs_diff_eq!(*a, b.ln(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_kl_div_chain_gradient_matches_finite_difference() {
        let z_data = vec![0.2, -0.4, 1.0, 0.3, 0.9, -1.1];
        let p = Tensor::from_shape_vec(vec![2, 3], vec![0.6, 0.3, 0.1, 0.0, 0.5, 0.5], false);

        let z = Tensor::from_shape_vec(vec![2, 3], z_data.clone(), true);
        let log_q = log_softmax_rows(&z).unwrap();
        let per_row = kl_div_rows(&log_q, &p).unwrap();
        assert_eq!(per_row.shape(), &[2]);
        let mut total = sum(&per_row);
        backward(&mut total, None);

        let numeric = finite_difference(
            |zv| {
                let z = Tensor::from_shape_vec(vec![2, 3], zv.to_vec(), false);
                let lq = log_softmax_rows(&z).unwrap();
                kl_div_rows(&lq, &p).unwrap().data().sum()
            },
            &z_data,
            1e-3,
        );

        for (a, n) in z.grad().unwrap().iter().zip(numeric.iter()) {
            assert_abs_diff_eq!(*a, *n, epsilon = 1e-2);
        }
        // Targets are constants
        assert!(p.grad().is_none());
    }

    #[test]
    fn test_kl_div_rejects_mismatched_shapes() {
        let lq = Tensor::zeros(vec![2, 3], false);
        let p = Tensor::zeros(vec![2, 4], false);
        assert!(matches!(
            kl_div_rows(&lq, &p),
            Err(crate::Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_sum_backward_broadcasts() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        let mut s = sum(&a);
        assert_abs_diff_eq!(s.data()[0], 6.0);
        backward(&mut s, None);
        assert_eq!(a.grad().unwrap().to_vec(), vec![1.0, 1.0, 1.0]);
    }
}

proptest! {
    /// Row-wise KL divergence is non-negative for any logits/target pair
    #[test]
    fn prop_kl_div_non_negative(
        logits in prop::collection::vec(-10.0f32..10.0, 8),
        target in prop::collection::vec(-10.0f32..10.0, 8),
    ) {
        let z = Tensor::from_shape_vec(vec![2, 4], logits, false);
        let t = Tensor::from_shape_vec(vec![2, 4], target, false);
        let p = softmax_rows(&t).unwrap();
        let lq = log_softmax_rows(&z).unwrap();
        let kl = kl_div_rows(&lq, &p).unwrap();
        for &v in kl.data().iter() {
            prop_assert!(v >= -1e-4);
            prop_assert!(v.is_finite());
        }
    }

    /// Conv output length follows the usual formula for all valid geometries
    #[test]
    fn prop_conv1d_output_length(
        length in 8usize..64,
        kernel in 1usize..8,
        stride in 1usize..4,
        padding in 0usize..4,
    ) {
        let x = Tensor::zeros(vec![1, 1, length], false);
        let w = Tensor::zeros(vec![2, 1, kernel], false);
        let b = Tensor::zeros(vec![2], false);
        let y = conv1d(&x, &w, &b, stride, padding).unwrap();
        prop_assert_eq!(y.shape()[2], (length + 2 * padding - kernel) / stride + 1);
    }
}
