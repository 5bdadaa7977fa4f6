pub mod capture;
pub mod context;
pub mod data_loader;
pub mod loop_fn;
pub mod schedule;
pub mod summary;
pub mod train_config;

pub use capture::AlignedCapture;
pub use context::{ProgressSnapshot, TrainingProgressContext};
pub use data_loader::DataLoader;
pub use loop_fn::{join_training, run_training_loop, spawn_training, TrainingOutcome, TrainingRun};
pub use schedule::{BatchSize, LearningRateSchedule};
pub use summary::TrainingSummary;
pub use train_config::{TrainingConfig, TrainingStage};
