use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::network::WaveNetModel;
use crate::train::capture::AlignedCapture;
use crate::train::summary::TrainingSummary;

/// State shared between the training thread and any number of pollers.
///
/// The capture is fixed at construction and read without locking. Progress
/// counters, losses, the summary and the finished model sit behind one
/// mutex. Cancellation is a separate flag so requesting it never waits on
/// the lock.
#[derive(Debug)]
pub struct TrainingProgressContext {
    capture: AlignedCapture,
    quit: AtomicBool,
    state: Mutex<ProgressState>,
}

#[derive(Debug)]
struct ProgressState {
    iters_done: usize,
    iters_total: usize,
    loss_train: f32,
    loss_test: f32,
    summary: TrainingSummary,
    model: Option<Arc<WaveNetModel>>,
}

/// A consistent copy of the polled progress fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub iters_done: usize,
    pub iters_total: usize,
    /// Mean of the recent training losses.
    pub loss_train: f32,
    /// Latest held-out loss.
    pub loss_test: f32,
    /// A trained model has been published.
    pub finished: bool,
}

impl ProgressSnapshot {
    /// Completed share of all steps, in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        if self.iters_total == 0 {
            return 0.0;
        }
        (self.iters_done as f32 / self.iters_total as f32).min(1.0)
    }
}

impl TrainingProgressContext {
    pub fn new(capture: AlignedCapture) -> Self {
        TrainingProgressContext {
            capture,
            quit: AtomicBool::new(false),
            state: Mutex::new(ProgressState {
                iters_done: 0,
                iters_total: 1,
                loss_train: 1.0,
                loss_test: 1.0,
                summary: TrainingSummary::default(),
                model: None,
            }),
        }
    }

    pub fn capture(&self) -> &AlignedCapture {
        &self.capture
    }

    /// Asks the training loop to stop at its next step boundary.
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Relaxed);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.lock();
        ProgressSnapshot {
            iters_done: state.iters_done,
            iters_total: state.iters_total,
            loss_train: state.loss_train,
            loss_test: state.loss_test,
            finished: state.model.is_some(),
        }
    }

    /// The trained model, once training has completed.
    pub fn model(&self) -> Option<Arc<WaveNetModel>> {
        self.lock().model.clone()
    }

    pub fn summary(&self) -> TrainingSummary {
        self.lock().summary.clone()
    }

    pub(crate) fn begin(&self, iters_total: usize, test_interval: usize) {
        let mut state = self.lock();
        state.iters_done = 0;
        state.iters_total = iters_total;
        state.summary = TrainingSummary::new(test_interval);
        state.model = None;
    }

    pub(crate) fn record_step(&self, iters_done: usize, loss: f32, smoothed: f32) {
        let mut state = self.lock();
        state.iters_done = iters_done;
        state.loss_train = smoothed;
        state.summary.losses_train.push(loss);
    }

    pub(crate) fn record_test(&self, at_step: usize, loss: f32) {
        let mut state = self.lock();
        state.loss_test = loss;
        state.summary.losses_test.push(loss);
        state.summary.test_steps.push(at_step);
    }

    pub(crate) fn publish_model(&self, model: WaveNetModel) {
        self.lock().model = Some(Arc::new(model));
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        // Writers only store plain values, so a poisoned state is still coherent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
