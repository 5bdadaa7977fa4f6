use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::config::ModelConfig;
use crate::network::metadata::ModelMetadata;

/// Model file format version written on export.
pub const FILE_VERSION: &str = "0.5.4";

/// The only architecture this crate reads or writes.
pub const ARCHITECTURE: &str = "WaveNet";

/// On-disk model document: config, flat weights and metadata.
///
/// Unknown keys are ignored; every listed key is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub version: String,
    pub metadata: ModelMetadata,
    pub architecture: String,
    pub config: ModelConfig,
    pub weights: Vec<f32>,
    pub sample_rate: u32,
}

impl ModelFile {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<ModelFile> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: &str) -> Result<ModelFile> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
