use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::loss::{EsrLoss, MseLoss, RmseLoss};

/// Selects the loss a training stage minimises.
///
/// - `Mse`  : mean squared error.
/// - `Rmse` : root of the MSE; the default training loss.
/// - `Esr`  : error-to-signal ratio, see [`EsrLoss`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    Mse,
    Rmse,
    Esr,
}

impl LossFunction {
    pub fn loss(self, predicted: ArrayView2<f32>, expected: ArrayView2<f32>) -> f32 {
        match self {
            LossFunction::Mse => MseLoss::loss(predicted, expected),
            LossFunction::Rmse => RmseLoss::loss(predicted, expected),
            LossFunction::Esr => EsrLoss::loss(predicted, expected),
        }
    }

    pub fn derivative(self, predicted: ArrayView2<f32>, expected: ArrayView2<f32>) -> Array2<f32> {
        match self {
            LossFunction::Mse => MseLoss::derivative(predicted, expected),
            LossFunction::Rmse => RmseLoss::derivative(predicted, expected),
            LossFunction::Esr => EsrLoss::derivative(predicted, expected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&LossFunction::Rmse).unwrap(), "\"rmse\"");
        let parsed: LossFunction = serde_json::from_str("\"esr\"").unwrap();
        assert_eq!(parsed, LossFunction::Esr);
    }
}
