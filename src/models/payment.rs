use crate::entities::{TransactionStatus, transaction_entity as txn};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    /// Plan identifier: starter, pro or ultimate.
    pub plan: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentResponse {
    pub transaction_id: i64,
    pub authority: String,
    pub amount: i64,
    pub payment_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckPaymentRequest {
    pub authority: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckPaymentResponse {
    #[serde(flatten)]
    pub status: PaymentStatusResponse,
    /// Human-readable summary for the bot to relay.
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub status: String,
    pub ref_id: String,
    pub amount: i64,
    #[serde(rename = "type")]
    pub plan: String,
    pub success: bool,
    pub failed: bool,
    pub pending: bool,
}

impl From<&txn::Model> for PaymentStatusResponse {
    fn from(transaction: &txn::Model) -> Self {
        Self {
            status: transaction.status.to_string(),
            ref_id: transaction.ref_id.clone().unwrap_or_default(),
            amount: transaction.amount,
            plan: transaction.plan.to_string(),
            success: transaction.status == TransactionStatus::Success,
            failed: transaction.status == TransactionStatus::Failed,
            pending: transaction.status == TransactionStatus::Pending,
        }
    }
}
