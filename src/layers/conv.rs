use ndarray::{Array1, Array3, ArrayView3, Axis};
use rand::Rng;

use crate::error::{Error, Result};
use crate::math::conv::{conv1d, conv1d_accumulate_param_grads, conv1d_input_grad, kernel_span};
use crate::optim::{Parameter, Parameterized};

/// A learnable dilated 1-D convolution with no implicit padding.
///
/// Weights are kept tap-major, shape (kernel, out, in), so each tap is a
/// ready-made matrix for the forward product. Model files store them as
/// (out, in, kernel) row-major followed by the bias; `export_weights` and
/// `import_weights` translate between the two.
#[derive(Debug, Clone)]
pub struct Conv1d {
    kernel_size: usize,
    dilation: usize,
    taps: Array3<f32>,
    bias: Option<Array1<f32>>,
    grad_taps: Array3<f32>,
    grad_bias: Option<Array1<f32>>,
}

impl Conv1d {
    /// Weights uniform in +-sqrt(1 / (in_channels * kernel_size)), bias zero.
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        dilation: usize,
        bias: bool,
        rng: &mut R,
    ) -> Conv1d {
        assert!(kernel_size >= 1, "kernel_size must be at least 1");
        let scale = (1.0 / (in_channels * kernel_size) as f32).sqrt();
        let shape = (kernel_size, out_channels, in_channels);
        let taps = Array3::from_shape_simple_fn(shape, || rng.gen_range(-scale..=scale));

        Conv1d {
            kernel_size,
            dilation,
            taps,
            bias: bias.then(|| Array1::zeros(out_channels)),
            grad_taps: Array3::zeros(shape),
            grad_bias: bias.then(|| Array1::zeros(out_channels)),
        }
    }

    /// A 1x1 convolution: a per-sample channel mix.
    pub fn pointwise<R: Rng>(in_channels: usize, out_channels: usize, bias: bool, rng: &mut R) -> Conv1d {
        Conv1d::new(in_channels, out_channels, 1, 1, bias, rng)
    }

    /// Samples lost between input and output.
    pub fn span(&self) -> usize {
        kernel_span(self.kernel_size, self.dilation)
    }

    pub fn forward(&self, x: ArrayView3<f32>) -> Array3<f32> {
        conv1d(x, self.taps.view(), self.bias.as_ref().map(|b| b.view()), self.dilation)
    }

    /// Accumulates parameter gradients for output gradient `dy` given the
    /// input `x` the forward pass saw, and returns the input gradient.
    pub fn backward(&mut self, x: ArrayView3<f32>, dy: ArrayView3<f32>) -> Array3<f32> {
        self.accumulate_grads(x, dy);
        conv1d_input_grad(dy, self.taps.view(), self.dilation, x.len_of(Axis(2)))
    }

    /// Parameter gradients only, for inputs that need no gradient of their own.
    pub fn accumulate_grads(&mut self, x: ArrayView3<f32>, dy: ArrayView3<f32>) {
        conv1d_accumulate_param_grads(
            x,
            dy,
            self.grad_taps.view_mut(),
            self.grad_bias.as_mut().map(|g| g.view_mut()),
            self.dilation,
        );
    }

    pub fn zero_grad(&mut self) {
        self.grad_taps.fill(0.0);
        if let Some(g) = self.grad_bias.as_mut() {
            g.fill(0.0);
        }
    }

    /// Weight plus bias element count.
    pub fn num_params(&self) -> usize {
        self.taps.len() + self.bias.as_ref().map_or(0, |b| b.len())
    }

    /// Appends weights in (out, in, kernel) row-major order, then the bias.
    pub fn export_weights(&self, out: &mut Vec<f32>) {
        export_in_file_order(&self.taps, self.bias.as_ref(), out);
    }

    /// Appends accumulated gradients in the same order as `export_weights`.
    pub fn export_gradients(&self, out: &mut Vec<f32>) {
        export_in_file_order(&self.grad_taps, self.grad_bias.as_ref(), out);
    }

    /// Reads this conv's values from `weights[*offset..]` and advances `offset`.
    pub fn import_weights(&mut self, weights: &[f32], offset: &mut usize) -> Result<()> {
        let needed = *offset + self.num_params();
        if weights.len() < needed {
            return Err(Error::WeightsTooShort { expected: needed, got: weights.len() });
        }

        let mut values = weights[*offset..needed].iter().copied();
        let file_order = self.taps.view_mut().permuted_axes([1, 2, 0]);
        for (w, v) in file_order.into_iter().zip(values.by_ref()) {
            *w = v;
        }
        if let Some(bias) = self.bias.as_mut() {
            for (b, v) in bias.iter_mut().zip(values.by_ref()) {
                *b = v;
            }
        }

        *offset = needed;
        Ok(())
    }
}

fn export_in_file_order(taps: &Array3<f32>, bias: Option<&Array1<f32>>, out: &mut Vec<f32>) {
    out.extend(taps.view().permuted_axes([1, 2, 0]).iter().copied());
    if let Some(bias) = bias {
        out.extend(bias.iter().copied());
    }
}

impl Parameterized for Conv1d {
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        let mut params = vec![Parameter {
            value: self.taps.view_mut().into_dyn(),
            grad: self.grad_taps.view().into_dyn(),
        }];
        if let (Some(bias), Some(grad)) = (self.bias.as_mut(), self.grad_bias.as_ref()) {
            params.push(Parameter { value: bias.view_mut().into_dyn(), grad: grad.view().into_dyn() });
        }
        params
    }
}
