use amp_nn::{
    ActivationFunction, Error, LayerGroupConfig, LossFunction, ModelConfig, ModelMetadata, ModelPreset,
    WaveNetModel,
};
use approx::assert_abs_diff_eq;
use ndarray::{Array, Array2};

fn group(
    input_size: usize,
    head_size: usize,
    channels: usize,
    kernel_size: usize,
    dilations: &[usize],
    gated: bool,
    head_bias: bool,
) -> LayerGroupConfig {
    LayerGroupConfig {
        input_size,
        condition_size: 1,
        head_size,
        channels,
        kernel_size,
        dilations: dilations.to_vec(),
        activation: ActivationFunction::Tanh,
        gated,
        head_bias,
    }
}

fn build(config: ModelConfig, seed: u64) -> WaveNetModel {
    WaveNetModel::new(config, ModelMetadata::default(), 48_000, seed).unwrap()
}

fn test_input(batch: usize, len: usize) -> Array2<f32> {
    Array::from_shape_fn((batch, len), |(b, t)| (0.05 * t as f32 + b as f32).sin() * 0.6)
}

fn small_gated_config() -> ModelConfig {
    ModelConfig::new(vec![
        group(1, 2, 3, 2, &[1, 2], true, false),
        group(3, 1, 2, 3, &[1], false, true),
    ])
}

#[test]
fn single_group_receptive_field() {
    let model = build(ModelConfig::new(vec![group(1, 1, 4, 3, &[1, 2, 4], false, true)]), 0);
    assert_eq!(model.receptive_field(), 15);
}

#[test]
fn output_length_drops_receptive_field() {
    let mut model = build(small_gated_config(), 1);
    let rf = model.receptive_field();
    assert_eq!(rf, 6);
    for len in [rf, rf + 1, rf + 37] {
        let out = model.forward(test_input(2, len).view());
        assert_eq!(out.dim(), (2, len - (rf - 1)));
    }
}

#[test]
fn weight_round_trip_reproduces_output() {
    let mut source = build(ModelPreset::Feather.config(), 5);
    let mut target = build(ModelPreset::Feather.config(), 6);
    let input = test_input(1, source.receptive_field() + 50);

    let weights = source.export_weights();
    assert_eq!(weights.len(), source.num_params() + 1);
    target.import_weights(&weights).unwrap();
    assert_eq!(target.export_weights(), weights);

    let expected = source.forward(input.view());
    let actual = target.forward(input.view());
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*a, *e, epsilon = 1e-6);
    }
}

#[test]
fn short_weight_vector_is_rejected() {
    let mut model = build(small_gated_config(), 2);
    let before = model.export_weights();
    let err = model.import_weights(&before[..before.len() - 1]).unwrap_err();
    match err {
        Error::WeightsTooShort { expected, got } => {
            assert_eq!(expected, before.len());
            assert_eq!(got, before.len() - 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(model.export_weights(), before);
}

#[test]
fn zero_input_gives_bias_only_response() {
    let config = ModelConfig::new(vec![
        group(1, 4, 4, 3, &[1, 2, 4, 8], false, false),
        group(4, 1, 4, 3, &[1, 2, 4, 8], false, true),
    ]);
    let mut model = build(config, 7);
    // Group 1: rechannel 4, four layers of (52 + 4 + 20), head 16.
    // Group 2 starts at 324: rechannel 16, layers from 340, head at 644.
    assert_eq!(model.num_weights(), 650);

    let (c, beta) = (0.3_f32, -0.25_f32);
    let mut weights = vec![0.0; model.num_weights()];
    for layer in 0..4 {
        let bias_start = 340 + 76 * layer + 48;
        weights[bias_start..bias_start + 4].fill(c);
    }
    weights[644..648].fill(1.0);
    weights[648] = beta;
    weights[649] = 0.02;
    model.import_weights(&weights).unwrap();

    let rf = model.receptive_field();
    assert_eq!(rf, 61);
    let out = model.forward(Array2::zeros((1, rf + 9)).view());
    assert_eq!(out.dim(), (1, 10));
    // Four layers x four channels of tanh(c), summed by unit head weights.
    let expected = beta + 16.0 * c.tanh();
    for &v in out.iter() {
        assert_abs_diff_eq!(v, expected, epsilon = 1e-5);
    }
}

#[test]
fn json_round_trip_keeps_model() {
    let metadata = ModelMetadata {
        name: "Tweed -- Bassman".into(),
        gear_make: "Tweed".into(),
        gear_model: "Bassman".into(),
        loss_test_esr: Some(0.012),
        ..ModelMetadata::default()
    };
    let mut model = WaveNetModel::new(small_gated_config(), metadata, 44_100, 9).unwrap();
    let json = model.to_json_string().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["architecture"], "WaveNet");
    assert_eq!(value["config"]["layers"][0]["activation"], "Tanh");
    assert!(value["metadata"]["date"]["year"].as_i64().unwrap() >= 2024);
    assert!(value["metadata"].get("loss_test_mse").is_none());

    let mut loaded = WaveNetModel::from_json_str(&json).unwrap();
    assert_eq!(loaded.sample_rate(), 44_100);
    assert_eq!(loaded.config(), model.config());
    assert_eq!(loaded.metadata().loss_test_esr, Some(0.012));
    assert_eq!(loaded.export_weights(), model.export_weights());

    let input = test_input(1, 40);
    assert_eq!(loaded.forward(input.view()), model.forward(input.view()));
}

#[test]
fn model_file_errors_are_descriptive() {
    let model = build(small_gated_config(), 3);
    let mut file = model.to_model_file();

    file.architecture = "LSTM".into();
    assert!(matches!(
        WaveNetModel::from_model_file(file.clone()),
        Err(Error::UnsupportedArchitecture { .. })
    ));

    file.architecture = "WaveNet".into();
    file.weights.truncate(10);
    assert!(matches!(WaveNetModel::from_model_file(file.clone()), Err(Error::WeightsTooShort { .. })));

    file.config.layers[0].input_size = 2;
    assert!(matches!(WaveNetModel::from_model_file(file), Err(Error::InvalidConfig { .. })));

    assert!(matches!(WaveNetModel::from_json_str("{\"version\": 1}"), Err(Error::Json(_))));
}

#[test]
fn gradients_match_finite_differences() {
    let mut model = build(small_gated_config(), 11);
    let input = test_input(2, 18);
    let target = Array::from_shape_fn((2, 13), |(b, t)| (0.2 * t as f32 - b as f32).cos() * 0.3);
    let loss_fn = LossFunction::Mse;

    model.set_training(true);
    model.zero_grad();
    let predicted = model.forward(input.view());
    model.backward(loss_fn.derivative(predicted.view(), target.view()).view());
    let analytic = model.export_gradients();
    model.set_training(false);

    let weights = model.export_weights();
    assert_eq!(analytic.len(), weights.len() - 1);

    let h = 1e-2_f32;
    let mut loss_at = |weights: &[f32]| {
        model.import_weights(weights).unwrap();
        let predicted = model.forward(input.view());
        loss_fn.loss(predicted.view(), target.view())
    };
    for index in (0..analytic.len()).step_by(3) {
        let mut shifted = weights.clone();
        shifted[index] = weights[index] + h;
        let up = loss_at(&shifted);
        shifted[index] = weights[index] - h;
        let down = loss_at(&shifted);
        let numeric = (up - down) / (2.0 * h);
        let tolerance = 2e-3 + 5e-2 * numeric.abs();
        assert!(
            (analytic[index] - numeric).abs() <= tolerance,
            "parameter {index}: analytic {} vs numeric {numeric}",
            analytic[index]
        );
    }
}
