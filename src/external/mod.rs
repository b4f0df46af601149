pub mod gateway;
pub mod telegram;

pub use gateway::*;
pub use telegram::*;
