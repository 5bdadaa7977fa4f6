use ndarray::{Array2, ArrayView2};

use crate::loss::mse::MseLoss;

pub struct RmseLoss;

impl RmseLoss {
    /// sqrt(MSE)
    pub fn loss(predicted: ArrayView2<f32>, expected: ArrayView2<f32>) -> f32 {
        MseLoss::loss(predicted, expected).sqrt()
    }

    /// MSE gradient scaled by 1 / (2 RMSE); zero when the prediction is exact.
    pub fn derivative(predicted: ArrayView2<f32>, expected: ArrayView2<f32>) -> Array2<f32> {
        let rmse = Self::loss(predicted, expected);
        let mut grad = MseLoss::derivative(predicted, expected);
        if rmse > 0.0 {
            grad /= 2.0 * rmse;
        } else {
            grad.fill(0.0);
        }
        grad
    }
}
