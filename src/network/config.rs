use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};

/// Shape of one layer group, exactly as stored under `config.layers` in a
/// model file.
///
/// The order of `dilations` is the physical layer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerGroupConfig {
    pub input_size: usize,
    pub condition_size: usize,
    pub head_size: usize,
    pub channels: usize,
    pub kernel_size: usize,
    pub dilations: Vec<usize>,
    pub activation: ActivationFunction,
    pub gated: bool,
    pub head_bias: bool,
}

impl LayerGroupConfig {
    /// `1 + (kernel_size - 1) * sum(dilations)`
    pub fn receptive_field(&self) -> usize {
        1 + (self.kernel_size.saturating_sub(1)) * self.dilations.iter().sum::<usize>()
    }
}

fn default_head_scale() -> f32 {
    0.02
}

/// Declarative network shape: an ordered list of layer groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub layers: Vec<LayerGroupConfig>,
    /// Post-head network. Always `null`; kept so files match the format.
    #[serde(default)]
    pub head: Option<serde_json::Value>,
    /// Carried through the weight vector for file compatibility. The forward
    /// pass does not apply it.
    #[serde(default = "default_head_scale")]
    pub head_scale: f32,
}

impl ModelConfig {
    pub fn new(layers: Vec<LayerGroupConfig>) -> Self {
        ModelConfig { layers, head: None, head_scale: default_head_scale() }
    }

    /// `1 + sum(group_receptive_field - 1)`: groups add context, they don't multiply it.
    pub fn receptive_field(&self) -> usize {
        1 + self.layers.iter().map(|g| g.receptive_field() - 1).sum::<usize>()
    }

    /// Checks that the groups chain into a 1-in, 1-out model.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::invalid_config("at least one layer group is required"));
        }
        if self.head.as_ref().is_some_and(|head| !head.is_null()) {
            return Err(Error::invalid_config("a post-head network is not supported"));
        }

        for (index, group) in self.layers.iter().enumerate() {
            let sizes = [
                ("input_size", group.input_size),
                ("condition_size", group.condition_size),
                ("head_size", group.head_size),
                ("channels", group.channels),
                ("kernel_size", group.kernel_size),
            ];
            if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
                return Err(Error::invalid_config(format!("group {index}: {name} must be positive")));
            }
            if group.dilations.is_empty() {
                return Err(Error::invalid_config(format!("group {index}: dilations must not be empty")));
            }
            if group.dilations.contains(&0) {
                return Err(Error::invalid_config(format!("group {index}: dilations must be positive")));
            }
            if group.condition_size != 1 {
                return Err(Error::invalid_config(format!(
                    "group {index}: condition_size is {}, but the conditioning stream is the 1-channel input",
                    group.condition_size
                )));
            }

            match index.checked_sub(1).map(|prev| &self.layers[prev]) {
                None if group.input_size != 1 => {
                    return Err(Error::invalid_config(format!(
                        "group 0: input_size is {}, but the model input has 1 channel",
                        group.input_size
                    )));
                }
                Some(prev) if group.input_size != prev.channels => {
                    return Err(Error::invalid_config(format!(
                        "group {index}: input_size {} does not match the previous group's {} channels",
                        group.input_size, prev.channels
                    )));
                }
                Some(prev) if group.channels != prev.head_size => {
                    return Err(Error::invalid_config(format!(
                        "group {index}: channels {} does not match the previous group's head_size {}",
                        group.channels, prev.head_size
                    )));
                }
                _ => {}
            }
        }

        let last = &self.layers[self.layers.len() - 1];
        if last.head_size != 1 {
            return Err(Error::invalid_config(format!(
                "the last group's head_size is {}, but the model output has 1 channel",
                last.head_size
            )));
        }
        Ok(())
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: &str) -> Result<ModelConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Ready-made two-group architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPreset {
    Standard,
    Lite,
    Feather,
    StandardPlus,
}

const POW2_DILATIONS: [usize; 10] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512];

impl ModelPreset {
    pub const ALL: [ModelPreset; 4] =
        [ModelPreset::Standard, ModelPreset::Lite, ModelPreset::Feather, ModelPreset::StandardPlus];

    pub fn label(self) -> &'static str {
        match self {
            ModelPreset::Standard => "NAM A1 Standard - 13801p",
            ModelPreset::Lite => "NAM A1 Lite - 6553p",
            ModelPreset::Feather => "NAM A1 Feather",
            ModelPreset::StandardPlus => "Toan A1 Standard Plus - 30493p",
        }
    }

    /// The command-line spelling.
    pub fn name(self) -> &'static str {
        match self {
            ModelPreset::Standard => "standard",
            ModelPreset::Lite => "lite",
            ModelPreset::Feather => "feather",
            ModelPreset::StandardPlus => "standard-plus",
        }
    }

    pub fn config(self) -> ModelConfig {
        match self {
            ModelPreset::Standard => full_depth(8, 16),
            ModelPreset::Lite => split_depth(6, 12),
            ModelPreset::Feather => split_depth(4, 8),
            ModelPreset::StandardPlus => full_depth(12, 24),
        }
    }
}

/// Both groups span dilations 1..=512.
fn full_depth(head_size: usize, channels: usize) -> ModelConfig {
    ModelConfig::new(vec![
        group(1, head_size, channels, POW2_DILATIONS.to_vec(), false),
        group(channels, 1, head_size, POW2_DILATIONS.to_vec(), true),
    ])
}

/// A shallow first group (1..=64) and a deep second one (128, 256, 512, 1..=512).
fn split_depth(head_size: usize, channels: usize) -> ModelConfig {
    let second: Vec<usize> = POW2_DILATIONS[7..].iter().chain(&POW2_DILATIONS).copied().collect();
    ModelConfig::new(vec![
        group(1, head_size, channels, POW2_DILATIONS[..7].to_vec(), false),
        group(channels, 1, head_size, second, true),
    ])
}

fn group(
    input_size: usize,
    head_size: usize,
    channels: usize,
    dilations: Vec<usize>,
    head_bias: bool,
) -> LayerGroupConfig {
    LayerGroupConfig {
        input_size,
        condition_size: 1,
        head_size,
        channels,
        kernel_size: 3,
        dilations,
        activation: ActivationFunction::Tanh,
        gated: false,
        head_bias,
    }
}

impl fmt::Display for ModelPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ModelPreset::ALL.into_iter().find(|preset| preset.name() == s).ok_or_else(|| {
            let names: Vec<&str> = ModelPreset::ALL.iter().map(|p| p.name()).collect();
            format!("unknown preset '{s}' (expected one of: {})", names.join(", "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for preset in ModelPreset::ALL {
            preset.config().validate().unwrap();
            assert_eq!(preset.name().parse::<ModelPreset>().unwrap(), preset);
        }
        assert!("huge".parse::<ModelPreset>().is_err());
    }

    #[test]
    fn labels_carry_parameter_counts() {
        assert_eq!(ModelPreset::Standard.label(), "NAM A1 Standard - 13801p");
        assert_eq!(ModelPreset::Lite.label(), "NAM A1 Lite - 6553p");
        assert_eq!(ModelPreset::Feather.label(), "NAM A1 Feather");
        assert_eq!(ModelPreset::StandardPlus.label(), "Toan A1 Standard Plus - 30493p");
    }

    #[test]
    fn split_depth_second_group_dilations() {
        let config = ModelPreset::Lite.config();
        assert_eq!(config.layers[0].dilations, vec![1, 2, 4, 8, 16, 32, 64]);
        assert_eq!(
            config.layers[1].dilations,
            vec![128, 256, 512, 1, 2, 4, 8, 16, 32, 64, 128, 256, 512]
        );
    }

    #[test]
    fn receptive_field_adds_across_groups() {
        // Each group: 1 + 2 * 1023 = 2047; model: 1 + 2 * 2046.
        assert_eq!(ModelPreset::Standard.config().receptive_field(), 4093);
    }

    #[test]
    fn validate_rejects_broken_chains() {
        let mut config = ModelPreset::Standard.config();
        config.layers[1].input_size = 3;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));

        let mut config = ModelPreset::Standard.config();
        config.layers[1].head_size = 2;
        assert!(config.validate().is_err());

        let mut config = ModelPreset::Standard.config();
        config.layers[0].dilations.clear();
        assert!(config.validate().is_err());

        let mut config = ModelPreset::Feather.config();
        config.layers[0].condition_size = 2;
        assert!(config.validate().is_err());

        assert!(ModelConfig::new(Vec::new()).validate().is_err());
    }

    #[test]
    fn head_scale_defaults_when_missing() {
        let json = r#"{"layers": []}"#;
        let config: ModelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.head_scale, 0.02);
        assert!(config.head.is_none());
    }
}
