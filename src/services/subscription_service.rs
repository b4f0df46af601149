use crate::entities::{PlanType, SubscriptionType, user_entity as users};
use crate::error::{AppError, AppResult};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};

/// Days of access one purchase buys.
const STARTER_DAYS: i64 = 30;
const PRO_DAYS: i64 = 180;

#[derive(Clone)]
pub struct SubscriptionService {
    pool: DatabaseConnection,
}

impl SubscriptionService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn get_user(&self, user_id: i64) -> AppResult<users::Model> {
        users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))
    }

    /// Apply a verified purchase to the user's subscription window.
    ///
    /// Purchases stack: an unexpired subscription is extended from its current
    /// expiry, not from now. A pro holder buying starter keeps the pro plan
    /// name for the remainder (no mid-term display downgrade). Ultimate is
    /// terminal: no expiry, cannot be extended or re-purchased.
    ///
    /// Always reads the user row fresh from the database; stale cached
    /// plan/expiry values must never feed the base-time computation.
    pub async fn update_subscription(&self, user_id: i64, plan: PlanType) -> AppResult<()> {
        let user = self.get_user(user_id).await?;

        if user.plan_name == Some(PlanType::Ultimate) {
            return Err(AppError::ValidationError(
                "user already holds the ultimate plan".to_string(),
            ));
        }

        let now = Utc::now();
        let base = match user.subscription_expiry {
            Some(expiry) if expiry > now => expiry,
            _ => now,
        };

        let (plan_name, expiry) = match plan {
            PlanType::Ultimate => (PlanType::Ultimate, None),
            PlanType::Pro => (PlanType::Pro, Some(base + Duration::days(PRO_DAYS))),
            PlanType::Starter => {
                let keeps_pro = user.plan_name == Some(PlanType::Pro)
                    && user.subscription_expiry.is_some_and(|expiry| expiry > now);
                let plan_name = if keeps_pro {
                    PlanType::Pro
                } else {
                    PlanType::Starter
                };
                (plan_name, Some(base + Duration::days(STARTER_DAYS)))
            }
        };

        let mut active = user.into_active_model();
        active.subscription_type = Set(SubscriptionType::Paid);
        active.plan_name = Set(Some(plan_name));
        active.subscription_expiry = Set(expiry);
        active.is_verified = Set(true);
        active.is_active = Set(true);
        // A paying customer must never receive leftover free-trial nudges.
        active.trial_reminder_sms_sent = Set(true);
        active.trial_expiry_sms_sent = Set(true);
        active.updated_at = Set(Some(now));
        active.update(&self.pool).await?;

        log::info!(
            "Subscription updated: user={} plan={} expiry={:?}",
            user_id,
            plan_name,
            expiry
        );

        Ok(())
    }
}
