pub mod esr;
pub mod loss_type;
pub mod mse;
pub mod rmse;

pub use esr::EsrLoss;
pub use loss_type::LossFunction;
pub use mse::MseLoss;
pub use rmse::RmseLoss;
