pub mod transactions;
pub mod users;

pub use transactions as transaction_entity;
pub use users as user_entity;

pub use transactions::{PlanType, TransactionStatus};
pub use users::SubscriptionType;
