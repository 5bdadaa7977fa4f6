//! Dilated "valid" 1-D convolution kernels over (batch, channels, time) tensors.
//!
//! Taps are stored tap-major: `taps[k]` is the (out, in) matrix applied to the
//! input shifted by `k * dilation`. Every routine here accumulates one
//! `general_mat_mul` per (batch item, tap).

use ndarray::{linalg, s, Array1, Array3, ArrayView1, ArrayView3, ArrayViewMut1, ArrayViewMut3, Axis};

/// Number of samples consumed by a kernel of `kernel_size` taps spaced `dilation` apart.
pub fn kernel_span(kernel_size: usize, dilation: usize) -> usize {
    (kernel_size - 1) * dilation
}

/// y[b, o, t] = bias[o] + sum_k sum_i taps[k, o, i] * x[b, i, t + k * dilation]
///
/// The output is shorter than the input by `(kernel_size - 1) * dilation`.
pub fn conv1d(
    x: ArrayView3<f32>,
    taps: ArrayView3<f32>,
    bias: Option<ArrayView1<f32>>,
    dilation: usize,
) -> Array3<f32> {
    let (batch, in_channels, width) = x.dim();
    let (kernel_size, out_channels, tap_in) = taps.dim();
    assert_eq!(in_channels, tap_in, "conv1d input has {in_channels} channels, kernel expects {tap_in}");
    let span = kernel_span(kernel_size, dilation);
    assert!(width > span, "conv1d input width {width} does not cover kernel span {span}");
    let out_width = width - span;

    let mut y = Array3::zeros((batch, out_channels, out_width));
    for (xb, mut yb) in x.outer_iter().zip(y.outer_iter_mut()) {
        for (k, tap) in taps.outer_iter().enumerate() {
            let start = k * dilation;
            let window = xb.slice(s![.., start..start + out_width]);
            linalg::general_mat_mul(1.0, &tap, &window, 1.0, &mut yb);
        }
        if let Some(bias) = bias {
            yb += &bias.insert_axis(Axis(1));
        }
    }
    y
}

/// Accumulates d(loss)/d(taps) and d(loss)/d(bias) for an output gradient `dy`.
pub fn conv1d_accumulate_param_grads(
    x: ArrayView3<f32>,
    dy: ArrayView3<f32>,
    mut grad_taps: ArrayViewMut3<f32>,
    grad_bias: Option<ArrayViewMut1<f32>>,
    dilation: usize,
) {
    let out_width = dy.len_of(Axis(2));
    for (xb, dyb) in x.outer_iter().zip(dy.outer_iter()) {
        for (k, mut grad_tap) in grad_taps.outer_iter_mut().enumerate() {
            let start = k * dilation;
            let window = xb.slice(s![.., start..start + out_width]);
            linalg::general_mat_mul(1.0, &dyb, &window.t(), 1.0, &mut grad_tap);
        }
    }
    if let Some(mut grad_bias) = grad_bias {
        grad_bias += &sum_over_batch_and_time(dy);
    }
}

/// d(loss)/d(x) for an output gradient `dy`; `width` is the original input width.
pub fn conv1d_input_grad(
    dy: ArrayView3<f32>,
    taps: ArrayView3<f32>,
    dilation: usize,
    width: usize,
) -> Array3<f32> {
    let (batch, _, out_width) = dy.dim();
    let in_channels = taps.len_of(Axis(2));
    let mut dx = Array3::zeros((batch, in_channels, width));
    for (dyb, mut dxb) in dy.outer_iter().zip(dx.outer_iter_mut()) {
        for (k, tap) in taps.outer_iter().enumerate() {
            let start = k * dilation;
            let mut window = dxb.slice_mut(s![.., start..start + out_width]);
            linalg::general_mat_mul(1.0, &tap.t(), &dyb, 1.0, &mut window);
        }
    }
    dx
}

fn sum_over_batch_and_time(dy: ArrayView3<f32>) -> Array1<f32> {
    dy.sum_axis(Axis(2)).sum_axis(Axis(0))
}

/// The last `width` time steps of a (batch, channels, time) tensor.
pub fn tail(x: ArrayView3<f32>, width: usize) -> ArrayView3<f32> {
    let len = x.len_of(Axis(2));
    assert!(width <= len, "cannot take the last {width} samples of a {len}-sample stream");
    x.slice_move(s![.., .., len - width..])
}
