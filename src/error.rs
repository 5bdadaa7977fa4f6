use thiserror::Error;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid model config: {reason}")]
    InvalidConfig { reason: String },

    #[error("Unsupported architecture '{architecture}' (expected \"WaveNet\")")]
    UnsupportedArchitecture { architecture: String },

    #[error("Weight vector too short: model needs {expected} values, got {got}")]
    WeightsTooShort { expected: usize, got: usize },

    #[error("Invalid training stage {stage}: {reason}")]
    InvalidStage { stage: usize, reason: String },

    #[error("Dry and wet signals differ in length ({dry} vs {wet} samples)")]
    SignalLengthMismatch { dry: usize, wet: usize },

    #[error("Signal too short: {len} samples available, {required} required")]
    SignalTooShort { len: usize, required: usize },

    #[error("Training cancelled after {iters_done} of {iters_total} steps")]
    TrainingCancelled { iters_done: usize, iters_total: usize },

    #[error("Training thread panicked")]
    TrainingPanicked,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig { reason: reason.into() }
    }

    pub(crate) fn invalid_stage(stage: usize, reason: impl Into<String>) -> Self {
        Error::InvalidStage { stage, reason: reason.into() }
    }
}
