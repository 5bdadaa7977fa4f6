use ndarray::{Array2, ArrayView1};
use rand::Rng;

use crate::error::{Error, Result};

/// Cuts fixed-width training windows from an aligned dry/wet pair.
///
/// Candidate windows tile the signal without overlap: offsets `0, W, 2W, ...`
/// as long as the whole window fits. A trailing partial window is dropped.
/// Each input window of `W` dry samples pairs with the wet samples the model
/// can actually predict, `[offset + receptive_field - 1, offset + W)`.
pub struct DataLoader<'a> {
    dry: &'a [f32],
    wet: &'a [f32],
    input_width: usize,
    receptive_field: usize,
    offsets: Vec<usize>,
}

impl<'a> DataLoader<'a> {
    pub fn new(dry: &'a [f32], wet: &'a [f32], input_width: usize, receptive_field: usize) -> Result<Self> {
        if dry.len() != wet.len() {
            return Err(Error::SignalLengthMismatch { dry: dry.len(), wet: wet.len() });
        }
        if receptive_field == 0 || input_width <= receptive_field {
            return Err(Error::invalid_config(format!(
                "window width {input_width} must exceed the receptive field {receptive_field}"
            )));
        }
        let offsets = candidate_offsets(dry.len(), input_width);
        if offsets.is_empty() {
            return Err(Error::SignalTooShort { len: dry.len(), required: input_width });
        }

        Ok(DataLoader { dry, wet, input_width, receptive_field, offsets })
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// `W - receptive_field + 1`
    pub fn target_width(&self) -> usize {
        self.input_width - self.receptive_field + 1
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// `batch_size` offsets drawn uniformly, with replacement.
    pub fn sample_offsets<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<usize> {
        (0..batch_size).map(|_| self.offsets[rng.gen_range(0..self.offsets.len())]).collect()
    }

    /// `(inputs, targets)` for the given window offsets, one row per offset.
    pub fn batch_at(&self, offsets: &[usize]) -> (Array2<f32>, Array2<f32>) {
        let mut inputs = Array2::zeros((offsets.len(), self.input_width));
        let mut targets = Array2::zeros((offsets.len(), self.target_width()));
        for (row, &offset) in offsets.iter().enumerate() {
            let end = offset + self.input_width;
            inputs.row_mut(row).assign(&ArrayView1::from(&self.dry[offset..end]));
            targets.row_mut(row).assign(&ArrayView1::from(&self.wet[offset + self.receptive_field - 1..end]));
        }
        (inputs, targets)
    }

    pub fn make_batch<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> (Array2<f32>, Array2<f32>) {
        self.batch_at(&self.sample_offsets(batch_size, rng))
    }
}

fn candidate_offsets(len: usize, width: usize) -> Vec<usize> {
    (0..).step_by(width).take_while(|&offset| offset + width <= len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn offsets_tile_without_partial_tail() {
        let signal = vec![0.0; 105];
        let loader = DataLoader::new(&signal, &signal, 20, 5).unwrap();
        assert_eq!(loader.offsets(), &[0, 20, 40, 60, 80]);
        assert_eq!(loader.target_width(), 16);
    }

    #[test]
    fn rejects_mismatched_or_short_signals() {
        let short = vec![0.0; 10];
        let long = vec![0.0; 11];
        assert!(matches!(
            DataLoader::new(&short, &long, 4, 2),
            Err(Error::SignalLengthMismatch { dry: 10, wet: 11 })
        ));
        assert!(matches!(
            DataLoader::new(&short, &short, 12, 2),
            Err(Error::SignalTooShort { len: 10, required: 12 })
        ));
        assert!(DataLoader::new(&short, &short, 2, 2).is_err());
    }

    #[test]
    fn batch_rows_slice_dry_and_trimmed_wet() {
        let dry: Vec<f32> = (0..50).map(|i| i as f32).collect();
        let wet: Vec<f32> = (0..50).map(|i| 1000.0 + i as f32).collect();
        let loader = DataLoader::new(&dry, &wet, 10, 3).unwrap();
        let (inputs, targets) = loader.batch_at(&[20, 0]);
        assert_eq!(inputs.row(0).to_vec(), dry[20..30].to_vec());
        assert_eq!(targets.row(0).to_vec(), wet[22..30].to_vec());
        assert_eq!(targets.row(1)[0], 1002.0);

        let mut rng = StdRng::seed_from_u64(0);
        let (inputs, targets) = loader.make_batch(7, &mut rng);
        assert_eq!(inputs.dim(), (7, 10));
        assert_eq!(targets.dim(), (7, 8));
    }
}
