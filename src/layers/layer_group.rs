use ndarray::{s, Array3, ArrayView3, Axis};
use rand::Rng;

use crate::error::Result;
use crate::layers::conv::Conv1d;
use crate::layers::layer::Layer;
use crate::math::tail;
use crate::network::config::LayerGroupConfig;
use crate::optim::{Parameter, Parameterized};

/// A stack of [`Layer`]s sharing channel count and kernel size, with one
/// layer per dilation.
///
/// The group rechannels its residual input, runs the layers while summing
/// their head contributions onto the incoming head accumulator, and mixes
/// the sum down to `head_size` channels.
#[derive(Debug, Clone)]
pub struct LayerGroup {
    config: LayerGroupConfig,
    rechannel: Conv1d,
    layers: Vec<Layer>,
    head_rechannel: Conv1d,
    cache: Option<GroupCache>,
}

#[derive(Debug, Clone)]
struct GroupCache {
    input: Array3<f32>,
    head_sum: Array3<f32>,
    prev_head_width: Option<usize>,
}

impl LayerGroup {
    pub fn new<R: Rng>(config: &LayerGroupConfig, rng: &mut R) -> LayerGroup {
        let rechannel = Conv1d::pointwise(config.input_size, config.channels, false, rng);
        let layers = config
            .dilations
            .iter()
            .map(|&dilation| {
                Layer::new(
                    config.condition_size,
                    config.channels,
                    config.kernel_size,
                    dilation,
                    config.activation,
                    config.gated,
                    rng,
                )
            })
            .collect();
        let head_rechannel = Conv1d::pointwise(config.channels, config.head_size, config.head_bias, rng);

        LayerGroup { config: config.clone(), rechannel, layers, head_rechannel, cache: None }
    }

    pub fn config(&self) -> &LayerGroupConfig {
        &self.config
    }

    pub fn receptive_field(&self) -> usize {
        self.config.receptive_field()
    }

    /// Runs the group over residual input `x` (batch, input_size, T) with the
    /// conditioning stream `h`.
    ///
    /// `head_input` is the previous group's head output, or `None` for the
    /// first group. Returns `(head_out, residual_out)`, both
    /// `T - receptive_field + 1` samples wide.
    pub fn forward(
        &mut self,
        x: ArrayView3<f32>,
        h: ArrayView3<f32>,
        head_input: Option<Array3<f32>>,
        training: bool,
    ) -> (Array3<f32>, Array3<f32>) {
        let width = x.len_of(Axis(2));
        let rf = self.receptive_field();
        assert!(width >= rf, "layer group needs {rf} input samples, got {width}");
        let out_length = width - (rf - 1);

        let prev_head_width = head_input.as_ref().map(|head| head.len_of(Axis(2)));
        let mut head_sum = head_input;
        let mut stream = self.rechannel.forward(x);
        for layer in &mut self.layers {
            let (next, head_term) = layer.forward(stream.view(), h, out_length, training);
            stream = next;
            head_sum = Some(match head_sum {
                None => head_term,
                Some(prev) => tail(prev.view(), out_length).to_owned() + &head_term,
            });
        }
        let Some(head_sum) = head_sum else {
            panic!("layer group has no layers");
        };

        let head_out = self.head_rechannel.forward(head_sum.view());
        self.cache = training.then(|| GroupCache { input: x.to_owned(), head_sum, prev_head_width });
        (head_out, stream)
    }

    /// Returns `(gradient for x, gradient for head_input)`; the latter is
    /// `None` when the forward pass had no head input.
    pub fn backward(
        &mut self,
        d_head_out: ArrayView3<f32>,
        d_residual_out: ArrayView3<f32>,
        h: ArrayView3<f32>,
    ) -> (Array3<f32>, Option<Array3<f32>>) {
        let Some(cache) = self.cache.take() else {
            panic!("LayerGroup::backward called without a training-mode forward pass");
        };

        let d_head_sum = self.head_rechannel.backward(cache.head_sum.view(), d_head_out);
        let mut d_stream = d_residual_out.to_owned();
        for layer in self.layers.iter_mut().rev() {
            d_stream = layer.backward(d_stream.view(), d_head_sum.view(), h);
        }
        let d_input = self.rechannel.backward(cache.input.view(), d_stream.view());

        // The incoming head was trimmed to its tail before the first add.
        let d_prev_head = cache.prev_head_width.map(|prev_width| {
            let (batch, channels, width) = d_head_sum.dim();
            let mut d_prev = Array3::zeros((batch, channels, prev_width));
            d_prev.slice_mut(s![.., .., prev_width - width..]).assign(&d_head_sum);
            d_prev
        });
        (d_input, d_prev_head)
    }

    pub fn zero_grad(&mut self) {
        self.convs_mut().for_each(Conv1d::zero_grad);
    }

    pub fn num_params(&self) -> usize {
        self.convs().map(Conv1d::num_params).sum()
    }

    /// Every convolution in serialization order: rechannel, each layer's
    /// (conv, input_mixer, conv1x1), head_rechannel.
    pub fn convs(&self) -> impl Iterator<Item = &Conv1d> {
        std::iter::once(&self.rechannel)
            .chain(self.layers.iter().flat_map(|layer| layer.convs()))
            .chain(std::iter::once(&self.head_rechannel))
    }

    pub fn convs_mut(&mut self) -> impl Iterator<Item = &mut Conv1d> {
        std::iter::once(&mut self.rechannel)
            .chain(self.layers.iter_mut().flat_map(|layer| layer.convs_mut()))
            .chain(std::iter::once(&mut self.head_rechannel))
    }

    pub fn export_weights(&self, out: &mut Vec<f32>) {
        self.convs().for_each(|conv| conv.export_weights(out));
    }

    pub fn export_gradients(&self, out: &mut Vec<f32>) {
        self.convs().for_each(|conv| conv.export_gradients(out));
    }

    pub fn import_weights(&mut self, weights: &[f32], offset: &mut usize) -> Result<()> {
        for conv in self.convs_mut() {
            conv.import_weights(weights, offset)?;
        }
        Ok(())
    }
}

impl Parameterized for LayerGroup {
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        self.convs_mut().flat_map(|conv| conv.parameters()).collect()
    }
}
