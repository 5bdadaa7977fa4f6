use serde::{Deserialize, Serialize};

/// Loss history of one training run, appended to as the run progresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Raw training loss of every step, across all stages.
    pub losses_train: Vec<f32>,
    /// Held-out loss at each test measurement.
    pub losses_test: Vec<f32>,
    /// Global step count at which each test loss was measured.
    pub test_steps: Vec<usize>,
    /// Test interval of the first stage.
    pub test_interval: usize,
}

impl TrainingSummary {
    pub fn new(test_interval: usize) -> Self {
        TrainingSummary { test_interval, ..TrainingSummary::default() }
    }

    /// Centered moving average of the training losses with a box of `window`
    /// samples. Samples outside the series count as zero, so the series
    /// keeps its length.
    pub fn smoothed(&self, window: usize) -> Vec<f32> {
        let losses = &self.losses_train;
        if window <= 1 || losses.is_empty() {
            return losses.clone();
        }
        let n = losses.len() as isize;
        let lead = ((window - 1) / 2) as isize;
        (0..n)
            .map(|i| {
                let hi = (i + lead).min(n - 1);
                let lo = (i + lead - (window as isize - 1)).max(0);
                let sum: f32 = if lo <= hi { losses[lo as usize..=hi as usize].iter().sum() } else { 0.0 };
                sum / window as f32
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn smoothing_keeps_length_and_averages_interior() {
        let summary = TrainingSummary {
            losses_train: vec![3.0, 3.0, 3.0, 3.0, 3.0],
            ..TrainingSummary::new(25)
        };
        let smooth = summary.smoothed(3);
        assert_eq!(smooth.len(), 5);
        assert_relative_eq!(smooth[2], 3.0);
        assert_relative_eq!(smooth[0], 2.0);
        assert_eq!(summary.smoothed(1), summary.losses_train);
    }
}
