use crate::entities::{PlanType, TransactionStatus, transaction_entity as txn};
use crate::error::{AppError, AppResult};
use crate::external::gateway::PaymentGateway;
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use std::sync::Arc;

/// Result of one verification attempt.
///
/// `transitioned` is true only for the caller whose conditional update flipped
/// the row out of pending. Triggers gate the subscription update and user
/// notification on it, so the side effect runs at most once per transaction no
/// matter how many webhook/manual/sweep verifies race.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub transaction: txn::Model,
    pub transitioned: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    pool: DatabaseConnection,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(pool: DatabaseConnection, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { pool, gateway }
    }

    /// Create a pending transaction and register it with the gateway.
    ///
    /// The row is inserted before the gateway call so its id can serve as the
    /// order reference. If the gateway call fails the pending row stays behind
    /// without an authority; such rows can never be verified and are ignored.
    pub async fn create_payment_request(
        &self,
        user_id: i64,
        plan: &str,
    ) -> AppResult<(txn::Model, String)> {
        let plan: PlanType = plan
            .parse()
            .map_err(|_| AppError::ValidationError(format!("unknown plan type: {plan}")))?;

        let amount = plan.price();
        let description = plan.description();
        let now = Utc::now();

        let transaction = txn::ActiveModel {
            user_id: Set(user_id),
            plan: Set(plan),
            amount: Set(amount),
            authority: Set(None),
            status: Set(TransactionStatus::Pending),
            ref_id: Set(None),
            description: Set(description.clone()),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        let outcome = self
            .gateway
            .create_request(amount, &description, transaction.id)
            .await?;

        if !outcome.is_success() {
            log::warn!(
                "Gateway declined payment request for transaction {}: code={} message={}",
                transaction.id,
                outcome.code,
                outcome.message
            );
            return Err(AppError::PaymentFailed(outcome.message));
        }

        let authority = outcome.authority.ok_or_else(|| {
            AppError::ExternalApiError("gateway accepted the request but sent no authority".into())
        })?;

        // Authority is set exactly once and never changes afterwards.
        let mut active = transaction.into_active_model();
        active.authority = Set(Some(authority.clone()));
        active.updated_at = Set(Some(Utc::now()));
        let transaction = active.update(&self.pool).await?;

        let payment_url = self.gateway.payment_url(&authority);
        log::info!(
            "Created payment request: transaction={} user={} plan={} amount={}",
            transaction.id,
            user_id,
            transaction.plan,
            amount
        );

        Ok((transaction, payment_url))
    }

    /// Verify a payment attempt against the gateway, safe under concurrency.
    ///
    /// Any number of triggers (callback, manual check, sweep) may call this at
    /// the same time for the same authority. Terminal rows short-circuit
    /// without a gateway call. For pending rows both racers may reach the
    /// gateway (code 101 covers the duplicate there); the single conditional
    /// update `WHERE status = 'pending'` decides which caller's result is
    /// authoritative. The returned transaction is always re-read from the
    /// database, never a speculative local value.
    pub async fn verify_payment(&self, authority: &str) -> AppResult<VerifiedPayment> {
        let transaction = self
            .get_by_authority(authority)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no transaction for authority {authority}")))?;

        if transaction.status != TransactionStatus::Pending {
            return Ok(VerifiedPayment {
                transaction,
                transitioned: false,
            });
        }

        // Transport errors propagate here and leave the row pending for a
        // later attempt.
        let outcome = self.gateway.verify(transaction.amount, authority).await?;

        let (new_status, ref_id) = if outcome.is_success() {
            (TransactionStatus::Success, outcome.ref_id.clone())
        } else {
            (TransactionStatus::Failed, None)
        };

        let update = txn::Entity::update_many()
            .col_expr(txn::Column::Status, Expr::value(new_status))
            .col_expr(txn::Column::RefId, Expr::value(ref_id))
            .col_expr(txn::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(txn::Column::Authority.eq(authority))
            .filter(txn::Column::Status.eq(TransactionStatus::Pending))
            .exec(&self.pool)
            .await?;

        let transitioned = update.rows_affected == 1;
        if transitioned {
            log::info!(
                "Transaction {} settled as {} (gateway code {})",
                transaction.id,
                new_status,
                outcome.code
            );
        } else {
            log::info!(
                "Lost verify race for authority {authority}, returning persisted state"
            );
        }

        let transaction = self.get_by_authority(authority).await?.ok_or_else(|| {
            AppError::InternalError(format!("transaction for authority {authority} disappeared"))
        })?;

        Ok(VerifiedPayment {
            transaction,
            transitioned,
        })
    }

    pub async fn get_by_authority(&self, authority: &str) -> AppResult<Option<txn::Model>> {
        let transaction = txn::Entity::find()
            .filter(txn::Column::Authority.eq(authority))
            .one(&self.pool)
            .await?;
        Ok(transaction)
    }

    /// Pending transactions old enough for the sweep to re-verify.
    ///
    /// The grace window leaves the user time to finish paying before the
    /// sweep starts polling the gateway. Rows without an authority never got
    /// past the create call and are skipped.
    pub async fn find_stale_pending(&self, grace: Duration) -> AppResult<Vec<txn::Model>> {
        let cutoff = Utc::now() - grace;
        let stale = txn::Entity::find()
            .filter(txn::Column::Status.eq(TransactionStatus::Pending))
            .filter(txn::Column::Authority.is_not_null())
            .filter(txn::Column::CreatedAt.lt(cutoff))
            .all(&self.pool)
            .await?;
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::external::gateway::{CreateRequestOutcome, VerifyOutcome};
    use sea_orm::{ConnectOptions, Database};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubGateway {
        create_code: i64,
        verify_code: i64,
        create_calls: AtomicUsize,
        verify_calls: AtomicUsize,
    }

    impl StubGateway {
        fn success() -> Self {
            Self::with_codes(100, 100)
        }

        fn with_codes(create_code: i64, verify_code: i64) -> Self {
            Self {
                create_code,
                verify_code,
                create_calls: AtomicUsize::new(0),
                verify_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_request(
            &self,
            _amount: i64,
            _description: &str,
            order_id: i64,
        ) -> AppResult<CreateRequestOutcome> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.create_code == 100 {
                Ok(CreateRequestOutcome {
                    code: 100,
                    message: "Success".into(),
                    authority: Some(format!("A{order_id:08}")),
                })
            } else {
                Ok(CreateRequestOutcome {
                    code: self.create_code,
                    message: "The input params invalid".into(),
                    authority: None,
                })
            }
        }

        async fn verify(&self, _amount: i64, _authority: &str) -> AppResult<VerifyOutcome> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            // Give racing verifiers a chance to interleave.
            tokio::task::yield_now().await;
            if self.verify_code == 100 || self.verify_code == 101 {
                Ok(VerifyOutcome {
                    code: self.verify_code,
                    message: "Verified".into(),
                    ref_id: Some("201234567".into()),
                })
            } else {
                Ok(VerifyOutcome {
                    code: self.verify_code,
                    message: "Session is not valid".into(),
                    ref_id: None,
                })
            }
        }

        fn payment_url(&self, authority: &str) -> String {
            format!("https://pay.test/{authority}")
        }
    }

    async fn setup(
        gateway: StubGateway,
    ) -> (DatabaseConnection, PaymentService, Arc<StubGateway>) {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();
        database::run_migrations(&db).await.unwrap();
        let gateway = Arc::new(gateway);
        let service = PaymentService::new(db.clone(), gateway.clone());
        (db, service, gateway)
    }

    async fn seed_pending(
        db: &DatabaseConnection,
        authority: &str,
        age: Duration,
    ) -> txn::Model {
        let created = Utc::now() - age;
        txn::ActiveModel {
            user_id: Set(1),
            plan: Set(PlanType::Starter),
            amount: Set(PlanType::Starter.price()),
            authority: Set(Some(authority.to_string())),
            status: Set(TransactionStatus::Pending),
            ref_id: Set(None),
            description: Set(PlanType::Starter.description()),
            created_at: Set(Some(created)),
            updated_at: Set(Some(created)),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_payment_request_success() {
        let (db, service, gateway) = setup(StubGateway::success()).await;

        let (transaction, payment_url) = service.create_payment_request(7, "pro").await.unwrap();

        assert_eq!(transaction.user_id, 7);
        assert_eq!(transaction.plan, PlanType::Pro);
        assert_eq!(transaction.amount, PlanType::Pro.price());
        assert_eq!(transaction.status, TransactionStatus::Pending);
        let authority = transaction.authority.clone().unwrap();
        assert_eq!(payment_url, format!("https://pay.test/{authority}"));
        assert_eq!(gateway.create_calls.load(Ordering::SeqCst), 1);

        let stored = txn::Entity::find_by_id(transaction.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.authority.as_deref(), Some(authority.as_str()));
    }

    #[tokio::test]
    async fn test_create_payment_request_unknown_plan_inserts_nothing() {
        let (db, service, _) = setup(StubGateway::success()).await;

        let err = service.create_payment_request(7, "gold").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let rows = txn::Entity::find().all(&db).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_create_payment_request_gateway_decline_keeps_row_unusable() {
        let (db, service, _) = setup(StubGateway::with_codes(-9, 100)).await;

        let err = service.create_payment_request(7, "starter").await.unwrap_err();
        match err {
            AppError::PaymentFailed(message) => assert_eq!(message, "The input params invalid"),
            other => panic!("expected PaymentFailed, got {other:?}"),
        }

        // The pending row remains but never received an authority, so it can
        // never reach verification.
        let rows = txn::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].authority.is_none());
        assert_eq!(rows[0].status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_verify_settles_success_with_ref_id() {
        let (db, service, _) = setup(StubGateway::success()).await;
        seed_pending(&db, "A1", Duration::zero()).await;

        let verified = service.verify_payment("A1").await.unwrap();
        assert!(verified.transitioned);
        assert_eq!(verified.transaction.status, TransactionStatus::Success);
        assert_eq!(verified.transaction.ref_id.as_deref(), Some("201234567"));
    }

    #[tokio::test]
    async fn test_verify_settles_failure_without_ref_id() {
        let (db, service, _) = setup(StubGateway::with_codes(100, -51)).await;
        seed_pending(&db, "A1", Duration::zero()).await;

        let verified = service.verify_payment("A1").await.unwrap();
        assert!(verified.transitioned);
        assert_eq!(verified.transaction.status, TransactionStatus::Failed);
        assert!(verified.transaction.ref_id.is_none());
    }

    #[tokio::test]
    async fn test_verify_code_101_is_success() {
        let (db, service, _) = setup(StubGateway::with_codes(100, 101)).await;
        seed_pending(&db, "A1", Duration::zero()).await;

        let verified = service.verify_payment("A1").await.unwrap();
        assert!(verified.transitioned);
        assert_eq!(verified.transaction.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_verify_unknown_authority() {
        let (_db, service, gateway) = setup(StubGateway::success()).await;

        let err = service.verify_payment("A404").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(gateway.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_verify_is_idempotent_and_skips_gateway_on_terminal() {
        let (db, service, gateway) = setup(StubGateway::success()).await;
        seed_pending(&db, "A1", Duration::zero()).await;

        let first = service.verify_payment("A1").await.unwrap();
        assert!(first.transitioned);
        assert_eq!(gateway.verify_calls.load(Ordering::SeqCst), 1);

        let second = service.verify_payment("A1").await.unwrap();
        assert!(!second.transitioned);
        assert_eq!(second.transaction.status, first.transaction.status);
        assert_eq!(second.transaction.ref_id, first.transaction.ref_id);
        // Fast path: no second gateway call.
        assert_eq!(gateway.verify_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_verifies_transition_exactly_once() {
        let (db, service, _) = setup(StubGateway::success()).await;
        seed_pending(&db, "A1", Duration::zero()).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.verify_payment("A1").await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            let verified = handle.await.unwrap();
            assert_eq!(verified.transaction.status, TransactionStatus::Success);
            if verified.transitioned {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "exactly one caller may win the transition");
    }

    #[tokio::test]
    async fn test_sweep_grace_window_selection() {
        let (db, service, _) = setup(StubGateway::success()).await;

        seed_pending(&db, "A_young", Duration::minutes(1)).await;
        let old = seed_pending(&db, "A_old", Duration::minutes(4)).await;
        // Old but never got an authority: invisible to the sweep.
        let created = Utc::now() - Duration::minutes(10);
        txn::ActiveModel {
            user_id: Set(1),
            plan: Set(PlanType::Starter),
            amount: Set(PlanType::Starter.price()),
            authority: Set(None),
            status: Set(TransactionStatus::Pending),
            ref_id: Set(None),
            description: Set(PlanType::Starter.description()),
            created_at: Set(Some(created)),
            updated_at: Set(Some(created)),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let stale = service.find_stale_pending(Duration::minutes(3)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
    }

    #[tokio::test]
    async fn test_sweep_skips_terminal_rows() {
        let (db, service, _) = setup(StubGateway::success()).await;
        seed_pending(&db, "A1", Duration::minutes(10)).await;

        service.verify_payment("A1").await.unwrap();
        let stale = service.find_stale_pending(Duration::minutes(3)).await.unwrap();
        assert!(stale.is_empty());
    }
}
