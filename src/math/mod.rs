pub mod conv;

pub use conv::{conv1d, kernel_span, tail};
