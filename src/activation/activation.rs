use serde::{Serialize, Deserialize};

/// Activation selector as it appears in model files (`"activation": "Tanh"`).
///
/// Resolved once, when a layer is built, into an [`Activation`] so the
/// forward and backward passes never dispatch on the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Tanh,
}

impl ActivationFunction {
    pub fn resolve(self) -> Activation {
        match self {
            ActivationFunction::Tanh => Activation { function: tanh, derivative: tanh_derivative },
        }
    }
}

/// A concrete element-wise activation: the function and its derivative with
/// respect to the pre-activation input.
#[derive(Clone, Copy)]
pub struct Activation {
    pub function: fn(f32) -> f32,
    pub derivative: fn(f32) -> f32,
}

impl std::fmt::Debug for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activation").finish_non_exhaustive()
    }
}

fn tanh(x: f32) -> f32 {
    x.tanh()
}

fn tanh_derivative(x: f32) -> f32 {
    let t = x.tanh();
    1.0 - t * t
}

/// Logistic sigmoid used by the gate half of a gated layer.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
