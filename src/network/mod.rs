pub mod config;
pub mod metadata;
pub mod model_file;
pub mod wavenet;

pub use config::{LayerGroupConfig, ModelConfig, ModelPreset};
pub use metadata::{ExportDate, ModelMetadata};
pub use model_file::ModelFile;
pub use wavenet::WaveNetModel;
