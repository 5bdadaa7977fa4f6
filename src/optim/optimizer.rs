use ndarray::{ArrayViewD, ArrayViewMutD};

/// A learnable tensor paired with its accumulated gradient.
pub struct Parameter<'a> {
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewD<'a, f32>,
}

/// Anything that owns learnable tensors.
///
/// `parameters` must yield the tensors in the same order on every call; the
/// optimizers key their per-tensor state on that order.
pub trait Parameterized {
    fn parameters(&mut self) -> Vec<Parameter<'_>>;
}

pub trait Optimizer {
    /// Applies one update to every parameter of `model` at `learning_rate`.
    fn step(&mut self, model: &mut dyn Parameterized, learning_rate: f32);
}
