use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::ModelMetadata;

/// A time-aligned dry/wet recording, as handed over by the alignment step.
///
/// Train signals are required; the held-out test pair is optional but must
/// be complete when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedCapture {
    pub signal_dry_train: Vec<f32>,
    pub signal_wet_train: Vec<f32>,
    #[serde(default)]
    pub signal_dry_test: Option<Vec<f32>>,
    #[serde(default)]
    pub signal_wet_test: Option<Vec<f32>>,
    pub sample_rate: u32,
    #[serde(default)]
    pub gear_make: String,
    #[serde(default)]
    pub gear_model: String,
}

impl AlignedCapture {
    /// Default model metadata: named "<make> -- <model>", empty comment.
    pub fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: format!("{} -- {}", self.gear_make, self.gear_model),
            gear_make: self.gear_make.clone(),
            gear_model: self.gear_model.clone(),
            ..ModelMetadata::default()
        }
    }

    /// The held-out `(dry, wet)` pair, if both halves are present.
    pub fn test_pair(&self) -> Option<(&[f32], &[f32])> {
        match (&self.signal_dry_test, &self.signal_wet_test) {
            (Some(dry), Some(wet)) => Some((dry.as_slice(), wet.as_slice())),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (dry, wet) = (self.signal_dry_train.len(), self.signal_wet_train.len());
        if dry != wet {
            return Err(Error::SignalLengthMismatch { dry, wet });
        }
        let test_len = |signal: &Option<Vec<f32>>| signal.as_ref().map_or(0, Vec::len);
        let (dry, wet) = (test_len(&self.signal_dry_test), test_len(&self.signal_wet_test));
        if dry != wet || self.signal_dry_test.is_some() != self.signal_wet_test.is_some() {
            return Err(Error::SignalLengthMismatch { dry, wet });
        }
        Ok(())
    }

    pub fn load_json(path: &str) -> Result<AlignedCapture> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_name_joins_make_and_model() {
        let capture = AlignedCapture {
            gear_make: "Fender".into(),
            gear_model: "Deluxe Reverb".into(),
            ..AlignedCapture::default()
        };
        let metadata = capture.metadata();
        assert_eq!(metadata.name, "Fender -- Deluxe Reverb");
        assert_eq!(metadata.comment, "");
        assert!(metadata.date.is_none());
    }

    #[test]
    fn half_a_test_pair_is_rejected() {
        let capture = AlignedCapture {
            signal_dry_train: vec![0.0; 4],
            signal_wet_train: vec![0.0; 4],
            signal_dry_test: Some(Vec::new()),
            ..AlignedCapture::default()
        };
        assert!(capture.test_pair().is_none());
        assert!(matches!(capture.validate(), Err(Error::SignalLengthMismatch { .. })));
    }
}
