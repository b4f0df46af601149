//! Background scheduled tasks.
//!
//! Two recurring jobs: re-verifying stale pending payments and dropping
//! expired sessions. Call `spawn_all` once during startup; it detaches the
//! loops via `tokio::spawn` and does not block.

use crate::entities::TransactionStatus;
use crate::external::TelegramService;
use crate::handlers::payment::activate_subscription;
use crate::services::{PaymentService, SessionManager, SubscriptionService};
use chrono::Duration;

const PAYMENT_SWEEP_INTERVAL_SECS: u64 = 60;
/// How long a pending transaction is left alone before the sweep starts
/// polling the gateway; gives the payer time to finish.
const PENDING_GRACE_MINUTES: i64 = 3;
const SESSION_SWEEP_INTERVAL_SECS: u64 = 3600;

pub fn spawn_all(
    payment_service: PaymentService,
    subscription_service: SubscriptionService,
    telegram_service: TelegramService,
    sessions: SessionManager,
) {
    {
        let payment_service = payment_service.clone();
        tokio::spawn(async move {
            loop {
                sweep_pending_payments(&payment_service, &subscription_service, &telegram_service)
                    .await;
                tokio::time::sleep(std::time::Duration::from_secs(PAYMENT_SWEEP_INTERVAL_SECS))
                    .await;
            }
        });
    }

    {
        tokio::spawn(async move {
            loop {
                let removed = sessions.sweep_expired().await;
                if removed > 0 {
                    log::info!("Expired sessions removed: {removed}");
                }
                tokio::time::sleep(std::time::Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS))
                    .await;
            }
        });
    }
}

/// One sweep pass: verify every pending transaction older than the grace
/// window. A transaction that settles as success goes through the same
/// activation path as the callback and manual-check triggers; the
/// conditional update inside `verify_payment` keeps all three paths from
/// double-applying.
async fn sweep_pending_payments(
    payment_service: &PaymentService,
    subscription_service: &SubscriptionService,
    telegram_service: &TelegramService,
) {
    let stale = match payment_service
        .find_stale_pending(Duration::minutes(PENDING_GRACE_MINUTES))
        .await
    {
        Ok(stale) => stale,
        Err(e) => {
            log::error!("Payment sweep query failed: {e:?}");
            return;
        }
    };

    if stale.is_empty() {
        return;
    }
    log::debug!("Payment sweep re-verifying {} transactions", stale.len());

    for transaction in stale {
        let Some(authority) = transaction.authority.clone() else {
            continue;
        };
        match payment_service.verify_payment(&authority).await {
            Ok(verified) => {
                if verified.transitioned {
                    log::info!(
                        "Sweep settled transaction {} as {}",
                        verified.transaction.id,
                        verified.transaction.status
                    );
                }
                if verified.transaction.status == TransactionStatus::Success {
                    activate_subscription(&verified, subscription_service, telegram_service).await;
                }
            }
            // Transport errors leave the row pending; the next pass retries.
            Err(e) => log::warn!("Sweep verify failed for authority {authority}: {e:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::entities::{
        PlanType, SubscriptionType, transaction_entity as txn, user_entity as users,
    };
    use crate::error::AppResult;
    use crate::external::gateway::{CreateRequestOutcome, PaymentGateway, VerifyOutcome};
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
    use std::sync::Arc;

    struct AlwaysVerifiedGateway;

    #[async_trait::async_trait]
    impl PaymentGateway for AlwaysVerifiedGateway {
        async fn create_request(
            &self,
            _amount: i64,
            _description: &str,
            order_id: i64,
        ) -> AppResult<CreateRequestOutcome> {
            Ok(CreateRequestOutcome {
                code: 100,
                message: "Success".into(),
                authority: Some(format!("A{order_id:08}")),
            })
        }

        async fn verify(&self, _amount: i64, _authority: &str) -> AppResult<VerifyOutcome> {
            Ok(VerifyOutcome {
                code: 101,
                message: "Verified".into(),
                ref_id: Some("900001".into()),
            })
        }

        fn payment_url(&self, authority: &str) -> String {
            format!("https://pay.test/{authority}")
        }
    }

    #[tokio::test]
    async fn test_sweep_settles_and_activates_old_pending() {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1);
        let db: DatabaseConnection = Database::connect(options).await.unwrap();
        database::run_migrations(&db).await.unwrap();

        let now = Utc::now();
        let user = users::ActiveModel {
            telegram_id: Set(77),
            username: Set("student".to_string()),
            subscription_type: Set(SubscriptionType::FreeTrial),
            plan_name: Set(None),
            subscription_expiry: Set(None),
            is_verified: Set(false),
            is_active: Set(false),
            trial_reminder_sms_sent: Set(false),
            trial_expiry_sms_sent: Set(false),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let old = now - Duration::minutes(5);
        txn::ActiveModel {
            user_id: Set(user.id),
            plan: Set(PlanType::Pro),
            amount: Set(PlanType::Pro.price()),
            authority: Set(Some("A_old".to_string())),
            status: Set(TransactionStatus::Pending),
            ref_id: Set(None),
            description: Set(PlanType::Pro.description()),
            created_at: Set(Some(old)),
            updated_at: Set(Some(old)),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let payment_service = PaymentService::new(db.clone(), Arc::new(AlwaysVerifiedGateway));
        let subscription_service = SubscriptionService::new(db.clone());
        let telegram_service = TelegramService::new(Default::default());

        sweep_pending_payments(&payment_service, &subscription_service, &telegram_service).await;

        let settled = payment_service
            .get_by_authority("A_old")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.status, TransactionStatus::Success);
        assert_eq!(settled.ref_id.as_deref(), Some("900001"));

        let activated = subscription_service.get_user(user.id).await.unwrap();
        assert_eq!(activated.plan_name, Some(PlanType::Pro));
        assert_eq!(activated.subscription_type, SubscriptionType::Paid);

        // Second pass finds nothing to do.
        sweep_pending_payments(&payment_service, &subscription_service, &telegram_service).await;
        let after = subscription_service.get_user(user.id).await.unwrap();
        assert_eq!(after.subscription_expiry, activated.subscription_expiry);
    }
}
