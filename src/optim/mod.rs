pub mod adamw;
pub mod optimizer;

pub use adamw::AdamW;
pub use optimizer::{Optimizer, Parameter, Parameterized};
