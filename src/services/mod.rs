pub mod payment_service;
pub mod session_manager;
pub mod subscription_service;

pub use payment_service::*;
pub use session_manager::*;
pub use subscription_service::*;
