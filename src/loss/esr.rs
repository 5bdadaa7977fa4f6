use ndarray::{Array2, ArrayView2, Axis, Zip};

/// Keeps the ratio finite on silent targets.
const ESR_EPSILON: f64 = 1e-12;

/// Error-to-signal ratio.
///
/// Each batch row is scored as sum((p - t)²) / (sum(t²) + ε) and the rows
/// are averaged; a single row is the plain ratio of error to signal energy.
pub struct EsrLoss;

impl EsrLoss {
    pub fn loss(predicted: ArrayView2<f32>, expected: ArrayView2<f32>) -> f32 {
        assert_eq!(predicted.dim(), expected.dim(), "prediction and target shapes differ");
        let rows = predicted.len_of(Axis(0));
        if rows == 0 {
            return 0.0;
        }
        let total: f64 = predicted
            .outer_iter()
            .zip(expected.outer_iter())
            .map(|(p, e)| {
                let (error, signal) = energies(p, e);
                error / (signal + ESR_EPSILON)
            })
            .sum();
        (total / rows as f64) as f32
    }

    /// Per element: 2 (p - t) / (rows * (sum(t²) + ε)) using that row's energy.
    pub fn derivative(predicted: ArrayView2<f32>, expected: ArrayView2<f32>) -> Array2<f32> {
        assert_eq!(predicted.dim(), expected.dim(), "prediction and target shapes differ");
        let rows = predicted.len_of(Axis(0)).max(1) as f64;
        let mut grad = Array2::zeros(predicted.raw_dim());
        for ((p, e), mut g) in predicted.outer_iter().zip(expected.outer_iter()).zip(grad.outer_iter_mut()) {
            let (_, signal) = energies(p, e);
            let scale = (2.0 / (rows * (signal + ESR_EPSILON))) as f32;
            Zip::from(&mut g).and(p).and(e).for_each(|g, &p, &e| *g = scale * (p - e));
        }
        grad
    }
}

/// (sum of squared error, sum of squared target) for one row.
fn energies(p: ndarray::ArrayView1<f32>, e: ndarray::ArrayView1<f32>) -> (f64, f64) {
    Zip::from(p).and(e).fold((0.0, 0.0), |(error, signal), &p, &e| {
        let d = f64::from(p - e);
        let t = f64::from(e);
        (error + d * d, signal + t * t)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn single_row_is_error_over_signal() {
        let p = array![[1.0_f32, 1.0]];
        let e = array![[2.0_f32, 0.0]];
        // (1 + 1) / 4
        assert_relative_eq!(EsrLoss::loss(p.view(), e.view()), 0.5, max_relative = 1e-6);
    }

    #[test]
    fn perfect_prediction_scores_zero() {
        let e = array![[0.3_f32, -0.2, 0.9], [0.1, 0.1, -0.4]];
        assert_eq!(EsrLoss::loss(e.view(), e.view()), 0.0);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let p = array![[0.4_f32, -0.1, 0.7], [0.2, 0.5, -0.3]];
        let e = array![[0.5_f32, 0.0, 0.6], [-0.1, 0.4, -0.2]];
        let grad = EsrLoss::derivative(p.view(), e.view());
        let h = 1e-3;
        for idx in [(0, 0), (0, 2), (1, 1)] {
            let mut up = p.clone();
            up[idx] += h;
            let mut down = p.clone();
            down[idx] -= h;
            let numeric = (EsrLoss::loss(up.view(), e.view()) - EsrLoss::loss(down.view(), e.view())) / (2.0 * h);
            assert_relative_eq!(grad[idx], numeric, max_relative = 1e-2);
        }
    }
}
