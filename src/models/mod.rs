pub mod payment;
pub mod session;

pub use payment::*;
pub use session::*;
