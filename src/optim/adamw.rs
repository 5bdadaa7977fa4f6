use ndarray::{ArrayD, Zip};

use crate::optim::optimizer::{Optimizer, Parameter, Parameterized};

/// Adam with decoupled weight decay.
///
/// Each step first shrinks every parameter by `lr * weight_decay`, then
/// applies the Adam update. Moment estimates are allocated on the first step
/// from the shapes `parameters()` reports. Bias correction is off unless
/// enabled with [`AdamW::with_bias_correction`].
#[derive(Debug, Clone)]
pub struct AdamW {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub weight_decay: f32,
    bias_correction: bool,
    steps: i32,
    m: Vec<ArrayD<f32>>,
    v: Vec<ArrayD<f32>>,
}

impl AdamW {
    pub fn new(weight_decay: f32) -> AdamW {
        AdamW {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay,
            bias_correction: false,
            steps: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn with_bias_correction(mut self, enabled: bool) -> AdamW {
        self.bias_correction = enabled;
        self
    }

    /// Updates applied so far.
    pub fn steps(&self) -> i32 {
        self.steps
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, model: &mut dyn Parameterized, learning_rate: f32) {
        let params = model.parameters();
        if self.m.is_empty() {
            self.m = params.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
            self.v = self.m.clone();
        }
        assert_eq!(self.m.len(), params.len(), "parameter set changed between optimizer steps");

        self.steps += 1;
        let AdamW { beta1, beta2, epsilon, weight_decay, .. } = *self;
        let (m_scale, v_scale) = if self.bias_correction {
            (1.0 / (1.0 - beta1.powi(self.steps)), 1.0 / (1.0 - beta2.powi(self.steps)))
        } else {
            (1.0, 1.0)
        };
        let decay = 1.0 - learning_rate * weight_decay;

        for ((Parameter { value, grad }, m), v) in params.into_iter().zip(&mut self.m).zip(&mut self.v) {
            Zip::from(value).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
                *p *= decay;
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                *p -= learning_rate * (*m * m_scale) / ((*v * v_scale).sqrt() + epsilon);
            });
        }
    }
}
