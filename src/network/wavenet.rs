use log::{debug, warn};
use ndarray::{Array2, Array3, ArrayView2, Axis, Ix3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::layers::LayerGroup;
use crate::network::config::ModelConfig;
use crate::network::metadata::{ExportDate, ModelMetadata};
use crate::network::model_file::{ModelFile, ARCHITECTURE, FILE_VERSION};
use crate::optim::{Parameter, Parameterized};

/// A stack of layer groups mapping a mono signal to a mono signal.
///
/// The model input is both the first group's residual input and the
/// conditioning stream of every group; head signals chain from group to
/// group. Output is `receptive_field - 1` samples shorter than the input.
#[derive(Debug, Clone)]
pub struct WaveNetModel {
    config: ModelConfig,
    metadata: ModelMetadata,
    sample_rate: u32,
    groups: Vec<LayerGroup>,
    training: bool,
    cache: Option<ModelCache>,
}

#[derive(Debug, Clone)]
struct ModelCache {
    input: Array3<f32>,
    residual_dim: Ix3,
}

impl WaveNetModel {
    /// Builds a freshly initialised model; the same seed gives the same weights.
    pub fn new(config: ModelConfig, metadata: ModelMetadata, sample_rate: u32, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let groups = config.layers.iter().map(|group| LayerGroup::new(group, &mut rng)).collect();

        let model = WaveNetModel { config, metadata, sample_rate, groups, training: false, cache: None };
        debug!(
            "built WaveNet model: {} groups, receptive field {}, {} parameters",
            model.groups.len(),
            model.receptive_field(),
            model.num_params()
        );
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ModelMetadata {
        &mut self.metadata
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn receptive_field(&self) -> usize {
        self.config.receptive_field()
    }

    /// Output length for an input of `input_len` samples, if it is long enough.
    pub fn output_len(&self, input_len: usize) -> Option<usize> {
        (input_len + 1).checked_sub(self.receptive_field()).filter(|&len| len > 0)
    }

    /// Switches between training mode (forward caches activations for
    /// `backward`) and evaluation mode (no caches).
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        if !training {
            self.cache = None;
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// (batch, time) in, (batch, time - receptive_field + 1) out.
    pub fn forward(&mut self, input: ArrayView2<f32>) -> Array2<f32> {
        let training = self.training;
        let x = input.insert_axis(Axis(1));

        let mut head: Option<Array3<f32>> = None;
        let mut residual: Option<Array3<f32>> = None;
        for group in &mut self.groups {
            let stream = match &residual {
                Some(r) => r.view(),
                None => x.view(),
            };
            let (group_head, next) = group.forward(stream, x, head.take(), training);
            head = Some(group_head);
            residual = Some(next);
        }
        let (Some(head), Some(residual)) = (head, residual) else {
            panic!("model has no layer groups");
        };
        assert_eq!(head.len_of(Axis(1)), 1, "final head must have exactly one channel");

        self.cache = training.then(|| ModelCache { input: x.to_owned(), residual_dim: residual.raw_dim() });
        head.index_axis_move(Axis(1), 0)
    }

    /// Accumulates parameter gradients for `d_output`, the loss gradient with
    /// respect to the last `forward` output.
    pub fn backward(&mut self, d_output: ArrayView2<f32>) {
        let Some(cache) = self.cache.take() else {
            panic!("WaveNetModel::backward called without a training-mode forward pass");
        };

        let mut d_head = Some(d_output.insert_axis(Axis(1)).to_owned());
        let mut d_residual = Array3::zeros(cache.residual_dim);
        for group in self.groups.iter_mut().rev() {
            let Some(d_group_head) = d_head.take() else {
                panic!("missing head gradient for a group that received a head input");
            };
            let (d_input, d_prev_head) = group.backward(d_group_head.view(), d_residual.view(), cache.input.view());
            d_residual = d_input;
            d_head = d_prev_head;
        }
    }

    pub fn zero_grad(&mut self) {
        self.groups.iter_mut().for_each(LayerGroup::zero_grad);
    }

    /// Element count of every weight and bias tensor.
    pub fn num_params(&self) -> usize {
        self.groups.iter().map(LayerGroup::num_params).sum()
    }

    /// Length of the flat weight vector: parameters plus the trailing `head_scale`.
    pub fn num_weights(&self) -> usize {
        self.num_params() + 1
    }

    /// Flat weight vector: each group's convs in serialization order, then `head_scale`.
    pub fn export_weights(&self) -> Vec<f32> {
        let mut weights = Vec::with_capacity(self.num_weights());
        for group in &self.groups {
            group.export_weights(&mut weights);
        }
        weights.push(self.config.head_scale);
        weights
    }

    /// Accumulated gradients in `export_weights` order, without `head_scale`.
    pub fn export_gradients(&self) -> Vec<f32> {
        let mut gradients = Vec::with_capacity(self.num_params());
        for group in &self.groups {
            group.export_gradients(&mut gradients);
        }
        gradients
    }

    /// Inverse of [`export_weights`](Self::export_weights). Leaves the model
    /// untouched if `weights` is too short.
    pub fn import_weights(&mut self, weights: &[f32]) -> Result<()> {
        let expected = self.num_weights();
        if weights.len() < expected {
            return Err(Error::WeightsTooShort { expected, got: weights.len() });
        }

        let mut offset = 0;
        for group in &mut self.groups {
            group.import_weights(weights, &mut offset)?;
        }
        self.config.head_scale = weights[offset];
        offset += 1;

        if offset < weights.len() {
            warn!("ignoring {} trailing values in weight vector", weights.len() - offset);
        }
        Ok(())
    }

    /// Snapshot for saving, stamped with the current local time.
    pub fn to_model_file(&self) -> ModelFile {
        let mut metadata = self.metadata.clone();
        metadata.date = Some(ExportDate::now());
        ModelFile {
            version: FILE_VERSION.to_string(),
            metadata,
            architecture: ARCHITECTURE.to_string(),
            config: self.config.clone(),
            weights: self.export_weights(),
            sample_rate: self.sample_rate,
        }
    }

    pub fn from_model_file(file: ModelFile) -> Result<Self> {
        if file.architecture != ARCHITECTURE {
            return Err(Error::UnsupportedArchitecture { architecture: file.architecture });
        }
        let mut model = WaveNetModel::new(file.config, file.metadata, file.sample_rate, 0)?;
        model.import_weights(&file.weights)?;
        Ok(model)
    }

    pub fn to_json_string(&self) -> Result<String> {
        self.to_model_file().to_json_string()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        WaveNetModel::from_model_file(ModelFile::from_json_str(json)?)
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        self.to_model_file().save_json(path)
    }

    pub fn load_json(path: &str) -> Result<Self> {
        WaveNetModel::from_model_file(ModelFile::load_json(path)?)
    }
}

impl Parameterized for WaveNetModel {
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        self.groups.iter_mut().flat_map(|group| group.parameters()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::config::ModelPreset;
    use ndarray::Array;

    #[test]
    fn preset_parameter_counts() {
        let model = WaveNetModel::new(ModelPreset::Standard.config(), ModelMetadata::default(), 48_000, 1).unwrap();
        assert_eq!(model.num_params(), 13_801);
        assert_eq!(model.export_weights().len(), 13_802);

        let lite = WaveNetModel::new(ModelPreset::Lite.config(), ModelMetadata::default(), 48_000, 1).unwrap();
        assert_eq!(lite.num_params(), 6_553);

        let plus = WaveNetModel::new(ModelPreset::StandardPlus.config(), ModelMetadata::default(), 48_000, 1).unwrap();
        assert_eq!(plus.num_params(), 30_493);
    }

    #[test]
    fn second_group_reads_first_group_residual() {
        let mut model = WaveNetModel::new(ModelPreset::Feather.config(), ModelMetadata::default(), 48_000, 5).unwrap();
        let rf = model.receptive_field();
        let input = Array::from_shape_fn((2, rf + 31), |(b, t)| ((b * 7 + t) as f32 * 0.05).sin());

        let output = model.forward(input.view());
        assert_eq!(output.dim(), (2, 32));
        assert!(output.iter().all(|v| v.is_finite()));

        model.set_training(true);
        let trained = model.forward(input.view());
        assert_eq!(trained, output);
        model.backward(Array2::ones(trained.raw_dim()).view());
    }

    #[test]
    fn same_seed_same_weights() {
        let a = WaveNetModel::new(ModelPreset::Feather.config(), ModelMetadata::default(), 48_000, 3).unwrap();
        let b = WaveNetModel::new(ModelPreset::Feather.config(), ModelMetadata::default(), 48_000, 3).unwrap();
        assert_eq!(a.export_weights(), b.export_weights());
    }

    #[test]
    fn eval_forward_keeps_no_cache() {
        let mut model = WaveNetModel::new(ModelPreset::Feather.config(), ModelMetadata::default(), 48_000, 3).unwrap();
        let rf = model.receptive_field();
        let input = Array::zeros((1, rf + 4));
        let out = model.forward(input.view());
        assert_eq!(out.dim(), (1, 5));
        assert!(model.cache.is_none());
        assert_eq!(model.output_len(rf + 4), Some(5));
        assert_eq!(model.output_len(rf - 1), None);
    }

    #[test]
    fn import_keeps_head_scale_and_warns_on_extra() {
        let mut model = WaveNetModel::new(ModelPreset::Feather.config(), ModelMetadata::default(), 48_000, 3).unwrap();
        let mut weights = model.export_weights();
        *weights.last_mut().unwrap() = 0.5;
        weights.push(9.0);
        model.import_weights(&weights).unwrap();
        assert_eq!(model.config().head_scale, 0.5);
        assert_eq!(model.export_weights(), weights[..weights.len() - 1]);
    }
}
