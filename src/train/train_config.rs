use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loss::LossFunction;
use crate::train::schedule::{BatchSize, LearningRateSchedule};

/// One training phase. Stages run in order against the same model, each with
/// a fresh optimizer and learning-rate schedule.
///
/// # Fields
/// - `steps_warmup`       : linear learning-rate ramp steps; `0` skips the ramp
/// - `steps_main`         : cosine-decay steps after the warmup
/// - `test_interval`      : measure the held-out loss every this many steps
/// - `batch_size`         : fixed or progress-keyed batch size
/// - `input_sample_width` : window width in samples; must exceed the receptive field
/// - `learn_rate_hi/lo`   : peak and final learning rate
/// - `weight_decay`       : AdamW decoupled decay
/// - `loss_fn`            : loss minimised during this stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingStage {
    pub steps_warmup: usize,
    pub steps_main: usize,
    pub test_interval: usize,
    pub batch_size: BatchSize,
    pub input_sample_width: usize,
    pub learn_rate_hi: f32,
    pub learn_rate_lo: f32,
    pub weight_decay: f32,
    pub loss_fn: LossFunction,
}

impl Default for TrainingStage {
    fn default() -> Self {
        TrainingStage {
            steps_warmup: 50,
            steps_main: 600,
            test_interval: 25,
            batch_size: BatchSize::Fixed(64),
            input_sample_width: 8192 + 2048,
            learn_rate_hi: 8e-4,
            learn_rate_lo: 1.5e-4,
            weight_decay: 7.5e-3,
            loss_fn: LossFunction::Rmse,
        }
    }
}

impl TrainingStage {
    pub fn steps_total(&self) -> usize {
        self.steps_warmup + self.steps_main
    }

    pub fn learning_rate_schedule(&self) -> LearningRateSchedule {
        LearningRateSchedule::new(self.learn_rate_hi, self.learn_rate_lo, self.steps_warmup, self.steps_main)
    }

    /// Checks this stage (at position `index`) against a model receptive
    /// field and the training signal length.
    pub fn validate(&self, index: usize, receptive_field: usize, train_len: usize) -> Result<()> {
        let invalid = |reason: String| Err(Error::invalid_stage(index, reason));

        if self.steps_total() == 0 {
            return invalid("stage has no steps".into());
        }
        if self.test_interval == 0 {
            return invalid("test_interval must be positive".into());
        }
        match &self.batch_size {
            BatchSize::Schedule(steps) if steps.is_empty() => {
                return invalid("batch size schedule is empty".into());
            }
            BatchSize::Schedule(steps) if steps.windows(2).any(|w| w[0].0 > w[1].0) => {
                return invalid("batch size schedule thresholds must be ascending".into());
            }
            _ => {}
        }
        if self.batch_size.sizes().contains(&0) {
            return invalid("batch sizes must be positive".into());
        }
        if !(self.learn_rate_hi > 0.0 && self.learn_rate_lo > 0.0) {
            return invalid("learning rates must be positive".into());
        }
        if self.learn_rate_lo > self.learn_rate_hi {
            return invalid(format!(
                "learn_rate_lo {} exceeds learn_rate_hi {}",
                self.learn_rate_lo, self.learn_rate_hi
            ));
        }
        if self.input_sample_width <= receptive_field {
            return invalid(format!(
                "input_sample_width {} must exceed the receptive field {receptive_field}",
                self.input_sample_width
            ));
        }
        if self.input_sample_width > train_len {
            return invalid(format!(
                "input_sample_width {} exceeds the {train_len}-sample training signal",
                self.input_sample_width
            ));
        }
        Ok(())
    }
}

/// Ordered training stages plus the seed for weight init and batch sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub stages: Vec<TrainingStage>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    0o35
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig::single(TrainingStage::default())
    }
}

impl TrainingConfig {
    pub fn single(stage: TrainingStage) -> Self {
        TrainingConfig { stages: vec![stage], seed: default_seed() }
    }

    /// Steps across every stage.
    pub fn steps_total(&self) -> usize {
        self.stages.iter().map(TrainingStage::steps_total).sum()
    }

    pub fn validate(&self, receptive_field: usize, train_len: usize) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::invalid_config("training needs at least one stage"));
        }
        self.stages
            .iter()
            .enumerate()
            .try_for_each(|(index, stage)| stage.validate(index, receptive_field, train_len))
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: &str) -> Result<TrainingConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_standard_run() {
        let config = TrainingConfig::default();
        assert_eq!(config.seed, 29);
        assert_eq!(config.steps_total(), 650);
        assert_eq!(config.stages[0].input_sample_width, 10_240);
        config.validate(4093, 48_000 * 10).unwrap();
    }

    #[test]
    fn window_must_exceed_receptive_field() {
        let stage = TrainingStage { input_sample_width: 100, ..TrainingStage::default() };
        let err = stage.validate(2, 100, 10_000).unwrap_err();
        assert!(matches!(err, Error::InvalidStage { stage: 2, .. }));
        stage.validate(2, 99, 10_000).unwrap();
    }

    #[test]
    fn rejects_bad_schedules_and_rates() {
        let descending = TrainingStage {
            batch_size: BatchSize::Schedule(vec![(0.5, 8), (0.0, 16)]),
            ..TrainingStage::default()
        };
        assert!(descending.validate(0, 10, 100_000).is_err());

        let inverted = TrainingStage { learn_rate_lo: 1e-2, ..TrainingStage::default() };
        assert!(inverted.validate(0, 10, 100_000).is_err());

        let empty = TrainingConfig { stages: Vec::new(), seed: 1 };
        assert!(empty.validate(10, 100_000).is_err());
    }

    #[test]
    fn partial_stage_json_uses_defaults() {
        let json = r#"{"stages": [{"steps_main": 10, "batch_size": [[0.0, 8], [0.5, 16]], "loss_fn": "esr"}]}"#;
        let config: TrainingConfig = serde_json::from_str(json).unwrap();
        let stage = &config.stages[0];
        assert_eq!(stage.steps_main, 10);
        assert_eq!(stage.steps_warmup, 50);
        assert_eq!(stage.loss_fn, LossFunction::Esr);
        assert_eq!(config.seed, 29);
    }
}
