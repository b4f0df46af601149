use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Subscription plan a payment attempt is buying.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    #[sea_orm(string_value = "starter")]
    Starter,
    #[sea_orm(string_value = "pro")]
    Pro,
    #[sea_orm(string_value = "ultimate")]
    Ultimate,
}

impl PlanType {
    /// Price in the smallest currency unit.
    pub fn price(&self) -> i64 {
        match self {
            PlanType::Starter => 4_900_000,
            PlanType::Pro => 24_900_000,
            PlanType::Ultimate => 49_900_000,
        }
    }

    pub fn description(&self) -> String {
        match self {
            PlanType::Starter => "Starter plan - 1 month access".to_string(),
            PlanType::Pro => "Pro plan - 6 months access".to_string(),
            PlanType::Ultimate => "Ultimate plan - lifetime access".to_string(),
        }
    }
}

impl std::str::FromStr for PlanType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(PlanType::Starter),
            "pro" => Ok(PlanType::Pro),
            "ultimate" => Ok(PlanType::Ultimate),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanType::Starter => write!(f, "starter"),
            PlanType::Pro => write!(f, "pro"),
            PlanType::Ultimate => write!(f, "ultimate"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Success => write!(f, "success"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One payment attempt against the gateway.
///
/// `authority` stays null until the gateway accepts the create request; a row
/// without an authority can never be verified. Status moves pending -> terminal
/// exactly once, through the conditional update in the payment service.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub plan: PlanType,
    pub amount: i64,
    #[sea_orm(unique)]
    pub authority: Option<String>,
    pub status: TransactionStatus,
    pub ref_id: Option<String>,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
