use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// `init + (end - init) * min(step, steps) / steps`
pub fn linear_schedule(init: f32, end: f32, steps: usize, step: usize) -> f32 {
    if steps == 0 {
        return end;
    }
    init + (end - init) * step.min(steps) as f32 / steps as f32
}

/// `end + (init - end) * (1 + cos(pi * min(step, steps) / steps)) / 2`
pub fn cosine_decay(init: f32, end: f32, steps: usize, step: usize) -> f32 {
    if steps == 0 {
        return end;
    }
    let progress = step.min(steps) as f32 / steps as f32;
    end + (init - end) * 0.5 * (1.0 + (PI * progress).cos())
}

/// Per-stage learning rate: a linear ramp from `hi / 100` to `hi` over the
/// warmup steps, then a cosine decay from `hi` to `lo` over the main steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRateSchedule {
    pub hi: f32,
    pub lo: f32,
    pub warmup_steps: usize,
    pub main_steps: usize,
}

impl LearningRateSchedule {
    pub fn new(hi: f32, lo: f32, warmup_steps: usize, main_steps: usize) -> Self {
        LearningRateSchedule { hi, lo, warmup_steps, main_steps }
    }

    pub fn at(&self, step: usize) -> f32 {
        if step < self.warmup_steps {
            linear_schedule(self.hi / 100.0, self.hi, self.warmup_steps, step)
        } else {
            cosine_decay(self.hi, self.lo, self.main_steps, step - self.warmup_steps)
        }
    }
}

/// Batch size for a stage: fixed, or keyed on stage progress in `[0, 1)`.
///
/// A schedule is a list of `(progress threshold, size)` pairs in ascending
/// threshold order; serialized as a bare number or a list of pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchSize {
    Fixed(usize),
    Schedule(Vec<(f32, usize)>),
}

impl BatchSize {
    /// Size of the greatest threshold `<= progress`, or the first entry's size
    /// when progress is below every threshold.
    pub fn at(&self, progress: f32) -> usize {
        match self {
            BatchSize::Fixed(size) => *size,
            BatchSize::Schedule(steps) => steps
                .iter()
                .take_while(|(threshold, _)| *threshold <= progress)
                .last()
                .or(steps.first())
                .map_or(0, |&(_, size)| size),
        }
    }

    pub fn sizes(&self) -> Vec<usize> {
        match self {
            BatchSize::Fixed(size) => vec![*size],
            BatchSize::Schedule(steps) => steps.iter().map(|&(_, size)| size).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn warmup_then_cosine() {
        let schedule = LearningRateSchedule::new(1e-3, 1e-4, 10, 90);
        assert_relative_eq!(schedule.at(0), 1e-5, max_relative = 1e-5);
        assert_relative_eq!(schedule.at(10), 1e-3, max_relative = 1e-5);
        assert_relative_eq!(schedule.at(100), 1e-4, max_relative = 1e-4);

        let rates: Vec<f32> = (0..=100).map(|s| schedule.at(s)).collect();
        assert!(rates[..=10].windows(2).all(|w| w[0] < w[1]));
        assert!(rates[10..].windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn no_warmup_starts_at_hi() {
        let schedule = LearningRateSchedule::new(8e-4, 1.5e-4, 0, 600);
        assert_relative_eq!(schedule.at(0), 8e-4, max_relative = 1e-5);
        assert_relative_eq!(schedule.at(300), (8e-4 + 1.5e-4) / 2.0, max_relative = 1e-4);
    }

    #[test]
    fn batch_schedule_picks_greatest_threshold() {
        let batch = BatchSize::Schedule(vec![(0.0, 8), (0.5, 16)]);
        assert_eq!(batch.at(0.3), 8);
        assert_eq!(batch.at(0.5), 16);
        assert_eq!(batch.at(0.7), 16);

        let late_start = BatchSize::Schedule(vec![(0.2, 4), (0.6, 32)]);
        assert_eq!(late_start.at(0.1), 4);
        assert_eq!(BatchSize::Fixed(64).at(0.9), 64);
    }

    #[test]
    fn batch_size_json_forms() {
        let fixed: BatchSize = serde_json::from_str("64").unwrap();
        assert_eq!(fixed, BatchSize::Fixed(64));
        let schedule: BatchSize = serde_json::from_str("[[0.0, 8], [0.5, 16]]").unwrap();
        assert_eq!(schedule, BatchSize::Schedule(vec![(0.0, 8), (0.5, 16)]));
    }
}
