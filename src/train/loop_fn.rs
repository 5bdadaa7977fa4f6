use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info};
use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::loss::LossFunction;
use crate::network::{ModelConfig, ModelMetadata, WaveNetModel};
use crate::optim::{AdamW, Optimizer};
use crate::train::capture::AlignedCapture;
use crate::train::context::TrainingProgressContext;
use crate::train::data_loader::DataLoader;
use crate::train::train_config::TrainingConfig;

/// Slots in the rolling training-loss average.
const LOSS_WINDOW: usize = 16;

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingOutcome {
    /// Every stage ran and the model was published.
    Completed,
    /// The quit flag stopped the run; no model was published.
    Cancelled,
}

/// A validated, freshly initialised run that has not started yet.
///
/// Everything that can be wrong with the inputs is reported by
/// [`TrainingRun::prepare`]; [`TrainingRun::run`] then only stops on
/// completion or cancellation.
#[derive(Debug)]
pub struct TrainingRun {
    model: WaveNetModel,
    config: TrainingConfig,
}

impl TrainingRun {
    pub fn prepare(
        capture: &AlignedCapture,
        model_config: ModelConfig,
        metadata: ModelMetadata,
        config: TrainingConfig,
    ) -> Result<TrainingRun> {
        capture.validate()?;
        let model = WaveNetModel::new(model_config, metadata, capture.sample_rate, config.seed)?;
        let rf = model.receptive_field();
        config.validate(rf, capture.signal_dry_train.len())?;
        if let Some((dry, _)) = capture.test_pair() {
            if dry.len() < rf {
                return Err(Error::SignalTooShort { len: dry.len(), required: rf });
            }
        }
        Ok(TrainingRun { model, config })
    }

    /// Runs every stage, publishing progress into `context`. On completion
    /// the model, carrying its final test metrics, is published as well.
    pub fn run(mut self, context: &TrainingProgressContext) -> Result<TrainingOutcome> {
        let capture = context.capture();
        let rf = self.model.receptive_field();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let iters_total = self.config.steps_total();
        context.begin(iters_total, self.config.stages[0].test_interval);
        info!(
            "training {} parameters over {} stages, {} steps",
            self.model.num_params(),
            self.config.stages.len(),
            iters_total
        );

        let started = Instant::now();
        let mut loss_window = [1.0_f32; LOSS_WINDOW];
        let mut iters_done = 0;

        for (index, stage) in self.config.stages.iter().enumerate() {
            let loader = DataLoader::new(
                &capture.signal_dry_train,
                &capture.signal_wet_train,
                stage.input_sample_width,
                rf,
            )?;
            let schedule = stage.learning_rate_schedule();
            let mut optimizer = AdamW::new(stage.weight_decay);
            let stage_steps = stage.steps_total();
            info!(
                "stage {}/{}: {} warmup + {} main steps, {} candidate windows of {} samples",
                index + 1,
                self.config.stages.len(),
                stage.steps_warmup,
                stage.steps_main,
                loader.offsets().len(),
                loader.input_width()
            );

            for step in 0..stage_steps {
                if context.quit_requested() {
                    info!("training cancelled after {iters_done} of {iters_total} steps");
                    return Ok(TrainingOutcome::Cancelled);
                }

                self.model.set_training(true);
                let batch_size = stage.batch_size.at(step as f32 / stage_steps as f32);
                let (inputs, targets) = loader.make_batch(batch_size, &mut rng);
                let loss = train_step(
                    &mut self.model,
                    &mut optimizer,
                    &inputs,
                    &targets,
                    stage.loss_fn,
                    schedule.at(step),
                );

                loss_window[iters_done % LOSS_WINDOW] = loss;
                iters_done += 1;
                let smoothed = loss_window.iter().sum::<f32>() / LOSS_WINDOW as f32;
                context.record_step(iters_done, loss, smoothed);

                if (step + 1) % stage.test_interval == 0 {
                    if let Some((dry, wet)) = capture.test_pair() {
                        let (predicted, target) = evaluate(&mut self.model, dry, wet);
                        let test_loss = stage.loss_fn.loss(predicted.view(), target.view());
                        debug!("step {iters_done}: train {smoothed:.5}, test {test_loss:.5}");
                        context.record_test(iters_done, test_loss);
                    }
                }
            }
        }

        if let Some((dry, wet)) = capture.test_pair() {
            let (predicted, target) = evaluate(&mut self.model, dry, wet);
            let metadata = self.model.metadata_mut();
            metadata.loss_test_mse = Some(LossFunction::Mse.loss(predicted.view(), target.view()));
            metadata.loss_test_rmse = Some(LossFunction::Rmse.loss(predicted.view(), target.view()));
            metadata.loss_test_esr = Some(LossFunction::Esr.loss(predicted.view(), target.view()));
            info!(
                "test metrics: mse {:.6}, rmse {:.6}, esr {:.6}",
                metadata.loss_test_mse.unwrap_or_default(),
                metadata.loss_test_rmse.unwrap_or_default(),
                metadata.loss_test_esr.unwrap_or_default()
            );
        }
        self.model.set_training(false);
        info!("training finished: {iters_done} steps in {:.1?}", started.elapsed());
        context.publish_model(self.model);
        Ok(TrainingOutcome::Completed)
    }
}

/// One optimizer update; returns the batch loss before the update.
fn train_step(
    model: &mut WaveNetModel,
    optimizer: &mut AdamW,
    inputs: &Array2<f32>,
    targets: &Array2<f32>,
    loss_fn: LossFunction,
    learning_rate: f32,
) -> f32 {
    model.zero_grad();
    let predicted = model.forward(inputs.view());
    let loss = loss_fn.loss(predicted.view(), targets.view());
    let grad = loss_fn.derivative(predicted.view(), targets.view());
    model.backward(grad.view());
    optimizer.step(model, learning_rate);
    loss
}

/// Evaluation-mode prediction over a whole dry signal, paired with the wet
/// samples it lines up with.
fn evaluate(model: &mut WaveNetModel, dry: &[f32], wet: &[f32]) -> (Array2<f32>, Array2<f32>) {
    model.set_training(false);
    let rf = model.receptive_field();
    let predicted = model.forward(ArrayView1::from(dry).insert_axis(Axis(0)));
    let target = ArrayView1::from(&wet[rf - 1..]).insert_axis(Axis(0)).to_owned();
    (predicted, target)
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Validates on the calling thread, then trains to completion on it.
///
/// # Arguments
/// - `context`      : shared progress state; also supplies the capture
/// - `model_config` : architecture of the model to train from scratch
/// - `metadata`     : carried into the published model
/// - `config`       : training stages and the seed
///
/// # Errors
/// Invalid captures, configs or stages are reported before the first step.
/// Cancellation is not an error: it returns [`TrainingOutcome::Cancelled`].
pub fn run_training_loop(
    context: &TrainingProgressContext,
    model_config: ModelConfig,
    metadata: ModelMetadata,
    config: TrainingConfig,
) -> Result<TrainingOutcome> {
    TrainingRun::prepare(context.capture(), model_config, metadata, config)?.run(context)
}

/// Validates on the calling thread, then trains on a background thread
/// named `amp-nn-training`.
///
/// # Arguments
/// Same as [`run_training_loop`], except the context is shared with the
/// caller, which polls [`TrainingProgressContext::snapshot`] meanwhile.
///
/// The trained model appears in `context` once the run completes; collect it
/// with [`join_training`].
pub fn spawn_training(
    context: Arc<TrainingProgressContext>,
    model_config: ModelConfig,
    metadata: ModelMetadata,
    config: TrainingConfig,
) -> Result<JoinHandle<Result<TrainingOutcome>>> {
    let run = TrainingRun::prepare(context.capture(), model_config, metadata, config)?;
    let handle = thread::Builder::new()
        .name("amp-nn-training".into())
        .spawn(move || run.run(&context))?;
    Ok(handle)
}

/// Waits for a run started by [`spawn_training`] and returns its model.
///
/// A panicked thread becomes [`Error::TrainingPanicked`] and a cancelled run
/// becomes [`Error::TrainingCancelled`], so only a finished model is `Ok`.
pub fn join_training(
    handle: JoinHandle<Result<TrainingOutcome>>,
    context: &TrainingProgressContext,
) -> Result<Arc<WaveNetModel>> {
    let outcome = handle.join().map_err(|_| Error::TrainingPanicked)??;
    match (outcome, context.model()) {
        (TrainingOutcome::Completed, Some(model)) => Ok(model),
        _ => {
            let progress = context.snapshot();
            Err(Error::TrainingCancelled { iters_done: progress.iters_done, iters_total: progress.iters_total })
        }
    }
}
