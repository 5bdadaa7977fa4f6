pub mod activation;
pub mod error;
pub mod layers;
pub mod loss;
pub mod math;
pub mod network;
pub mod optim;
pub mod train;

// Convenience re-exports
pub use activation::ActivationFunction;
pub use error::{Error, Result};
pub use loss::LossFunction;
pub use network::{LayerGroupConfig, ModelConfig, ModelFile, ModelMetadata, ModelPreset, WaveNetModel};
pub use optim::AdamW;
pub use train::{
    join_training, run_training_loop, spawn_training, AlignedCapture, BatchSize, ProgressSnapshot, TrainingConfig,
    TrainingOutcome, TrainingProgressContext, TrainingStage, TrainingSummary,
};
