pub mod conv;
pub mod layer;
pub mod layer_group;

pub use conv::Conv1d;
pub use layer::Layer;
pub use layer_group::LayerGroup;
