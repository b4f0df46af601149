use super::transactions::PlanType;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    #[sea_orm(string_value = "free_trial")]
    FreeTrial,
    #[sea_orm(string_value = "paid")]
    Paid,
}

/// Course-platform user, payment-relevant subset.
///
/// `subscription_expiry` of null on a paid user means "no expiry" (ultimate
/// plan). The trial SMS flags belong to the free-trial nudge lifecycle and are
/// marked sent on any paid activation so stale nudges never fire.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub telegram_id: i64,
    pub username: String,
    pub subscription_type: SubscriptionType,
    pub plan_name: Option<PlanType>,
    pub subscription_expiry: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub is_active: bool,
    pub trial_reminder_sms_sent: bool,
    pub trial_expiry_sms_sent: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
