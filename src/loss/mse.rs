use ndarray::{Array2, ArrayView2, Zip};

pub struct MseLoss;

impl MseLoss {
    /// Scalar MSE: mean((predicted - expected)²)
    pub fn loss(predicted: ArrayView2<f32>, expected: ArrayView2<f32>) -> f32 {
        assert_eq!(predicted.dim(), expected.dim(), "prediction and target shapes differ");
        let n = predicted.len();
        if n == 0 {
            return 0.0;
        }
        let sum = Zip::from(predicted).and(expected).fold(0.0_f64, |acc, &p, &e| {
            let d = f64::from(p - e);
            acc + d * d
        });
        (sum / n as f64) as f32
    }

    /// Gradient: 2 (predicted - expected) / N
    pub fn derivative(predicted: ArrayView2<f32>, expected: ArrayView2<f32>) -> Array2<f32> {
        assert_eq!(predicted.dim(), expected.dim(), "prediction and target shapes differ");
        let scale = 2.0 / predicted.len().max(1) as f32;
        Zip::from(predicted).and(expected).map_collect(|&p, &e| scale * (p - e))
    }
}
