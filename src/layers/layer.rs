use ndarray::{s, Array3, ArrayView3, Axis, Zip};
use rand::Rng;

use crate::activation::{sigmoid, Activation, ActivationFunction};
use crate::layers::conv::Conv1d;
use crate::math::tail;
use crate::optim::{Parameter, Parameterized};

/// One dilated causal block: main conv + conditioning mix, (gated) activation,
/// and a 1x1 residual mix.
#[derive(Debug, Clone)]
pub struct Layer {
    conv: Conv1d,
    input_mixer: Conv1d,
    conv1x1: Conv1d,
    activation: Activation,
    channels: usize,
    gated: bool,
    cache: Option<LayerCache>,
}

/// What the backward pass needs from a training-mode forward pass.
#[derive(Debug, Clone)]
struct LayerCache {
    x: Array3<f32>,
    z: Array3<f32>,
    post_activation: Array3<f32>,
}

impl Layer {
    pub fn new<R: Rng>(
        condition_size: usize,
        channels: usize,
        kernel_size: usize,
        dilation: usize,
        activation: ActivationFunction,
        gated: bool,
        rng: &mut R,
    ) -> Layer {
        let mid_channels = if gated { 2 * channels } else { channels };
        Layer {
            conv: Conv1d::new(channels, mid_channels, kernel_size, dilation, true, rng),
            input_mixer: Conv1d::pointwise(condition_size, mid_channels, false, rng),
            conv1x1: Conv1d::pointwise(channels, channels, true, rng),
            activation: activation.resolve(),
            channels,
            gated,
            cache: None,
        }
    }

    /// Samples this layer removes from the residual stream.
    pub fn span(&self) -> usize {
        self.conv.span()
    }

    /// Returns `(residual for the next layer, head contribution)`.
    ///
    /// `x` is (batch, channels, T), `h` the conditioning stream (batch,
    /// condition_size, T' >= T). The head contribution is the post-activation
    /// signal trimmed to its last `out_length` samples.
    pub fn forward(
        &mut self,
        x: ArrayView3<f32>,
        h: ArrayView3<f32>,
        out_length: usize,
        training: bool,
    ) -> (Array3<f32>, Array3<f32>) {
        let mut z = self.conv.forward(x);
        let width = z.len_of(Axis(2));
        z += &self.input_mixer.forward(tail(h, width));

        let post_activation = self.activate(z.view());
        let mut x_next = tail(x, width).to_owned();
        x_next += &self.conv1x1.forward(post_activation.view());
        let head = tail(post_activation.view(), out_length).to_owned();

        self.cache = training.then(|| LayerCache { x: x.to_owned(), z, post_activation });
        (x_next, head)
    }

    /// Backpropagates the residual gradient `dx_next` and head gradient `d_head`,
    /// accumulating parameter gradients. Returns the gradient for `x`.
    pub fn backward(
        &mut self,
        dx_next: ArrayView3<f32>,
        d_head: ArrayView3<f32>,
        h: ArrayView3<f32>,
    ) -> Array3<f32> {
        let Some(cache) = self.cache.take() else {
            panic!("Layer::backward called without a training-mode forward pass");
        };
        let width = cache.z.len_of(Axis(2));
        let out_length = d_head.len_of(Axis(2));

        let mut d_post = self.conv1x1.backward(cache.post_activation.view(), dx_next);
        {
            let mut head_region = d_post.slice_mut(s![.., .., width - out_length..]);
            head_region += &d_head;
        }

        let dz = self.activation_grad(cache.z.view(), d_post.view());
        self.input_mixer.accumulate_grads(tail(h, width), dz.view());

        let mut dx = self.conv.backward(cache.x.view(), dz.view());
        let x_width = dx.len_of(Axis(2));
        {
            let mut residual = dx.slice_mut(s![.., .., x_width - width..]);
            residual += &dx_next;
        }
        dx
    }

    fn activate(&self, z: ArrayView3<f32>) -> Array3<f32> {
        let f = self.activation.function;
        if !self.gated {
            return z.mapv(f);
        }
        let (a, g) = z.split_at(Axis(1), self.channels);
        let mut out = a.mapv(f);
        out.zip_mut_with(&g, |o, &g| *o *= sigmoid(g));
        out
    }

    fn activation_grad(&self, z: ArrayView3<f32>, d_post: ArrayView3<f32>) -> Array3<f32> {
        let Activation { function: f, derivative: df } = self.activation;
        if !self.gated {
            let mut dz = d_post.to_owned();
            dz.zip_mut_with(&z, |d, &z| *d *= df(z));
            return dz;
        }

        let mut dz = Array3::zeros(z.raw_dim());
        let (a, g) = z.split_at(Axis(1), self.channels);
        let (da, dg) = dz.view_mut().split_at(Axis(1), self.channels);
        Zip::from(da)
            .and(dg)
            .and(a)
            .and(g)
            .and(d_post)
            .for_each(|da, dg, &a, &g, &d| {
                let gate = sigmoid(g);
                *da = d * gate * df(a);
                *dg = d * f(a) * gate * (1.0 - gate);
            });
        dz
    }

    pub fn zero_grad(&mut self) {
        self.conv.zero_grad();
        self.input_mixer.zero_grad();
        self.conv1x1.zero_grad();
    }

    pub fn num_params(&self) -> usize {
        self.convs().map(Conv1d::num_params).sum()
    }

    /// The layer's convolutions in serialization order.
    pub fn convs(&self) -> impl Iterator<Item = &Conv1d> {
        [&self.conv, &self.input_mixer, &self.conv1x1].into_iter()
    }

    pub fn convs_mut(&mut self) -> impl Iterator<Item = &mut Conv1d> {
        [&mut self.conv, &mut self.input_mixer, &mut self.conv1x1].into_iter()
    }
}

impl Parameterized for Layer {
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        self.convs_mut().flat_map(|conv| conv.parameters()).collect()
    }
}
