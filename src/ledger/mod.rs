use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    domain::{
        CreditAccount, Currency, Gateway, Payment, PaymentStatus, PricingTable, TransitionOutcome,
    },
    error::{AppError, Result},
    repository::{CreditAccountRepository, IdempotencyRepository, PaymentRepository},
};

pub mod refund;
pub mod sweeper;

pub use refund::RefundProcessor;
pub use sweeper::Sweeper;

/// Owns the payment state machine and is the only writer of credit
/// balances. Gateway verification happens before any call into here, so
/// every operation is a fast, lock-scoped database transaction.
pub struct Ledger {
    pool: SqlitePool,
    payments: Arc<dyn PaymentRepository>,
    accounts: Arc<dyn CreditAccountRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
}

impl Ledger {
    pub fn new(
        pool: SqlitePool,
        payments: Arc<dyn PaymentRepository>,
        accounts: Arc<dyn CreditAccountRepository>,
        idempotency: Arc<dyn IdempotencyRepository>,
    ) -> Self {
        Self {
            pool,
            payments,
            accounts,
            idempotency,
        }
    }

    /// Creates a pending payment for a priced package. The pricing table
    /// is an explicit snapshot from the caller, never ambient state.
    pub async fn initiate(
        &self,
        user_id: i64,
        package_id: &str,
        gateway: Gateway,
        currency: Currency,
        pricing: &PricingTable,
    ) -> Result<Payment> {
        if !gateway.supports(currency) {
            return Err(AppError::InvalidCurrency {
                gateway: gateway.to_string(),
                currency: currency.to_string(),
            });
        }

        let resolved = pricing.resolve(package_id, currency)?;

        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let payment = Payment {
            id,
            user_id,
            amount: resolved.amount,
            currency,
            credits: resolved.credits,
            gateway,
            status: PaymentStatus::Pending,
            gateway_reference: None,
            idempotency_key: Payment::fallback_key(&id),
            package: package_id.to_string(),
            description: format!("{} credits package purchase", resolved.credits),
            failure_reason: None,
            refund: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        let payment = self.payments.create(payment).await?;
        tracing::info!(
            payment_id = %payment.id,
            user_id,
            package = package_id,
            %gateway,
            %currency,
            amount = payment.amount,
            credits = payment.credits,
            "payment initiated"
        );
        Ok(payment)
    }

    /// Records the provider-issued reference on a freshly initiated
    /// payment and re-keys it so callbacks can address it directly.
    pub async fn attach_reference(
        &self,
        payment_id: Uuid,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<Payment> {
        self.payments
            .attach_reference(payment_id, reference, idempotency_key)
            .await
    }

    /// Applies a terminal outcome exactly once. The status flip, the
    /// credit grant and the admission record share one transaction, so a
    /// payment credited-but-not-completed (or the reverse) cannot exist.
    pub async fn transition(&self, key: &str, outcome: TransitionOutcome) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No payment for idempotency key {}", key)))?;

        // Reference-uniqueness pre-check, outside the transaction so no
        // connection is held across it; the partial unique index is the
        // hard enforcement behind it.
        if let TransitionOutcome::Completed {
            gateway_reference, ..
        } = &outcome
        {
            if let Some(other) = self
                .payments
                .find_by_reference(payment.gateway, gateway_reference)
                .await?
            {
                if other.id != payment.id && other.status != PaymentStatus::Failed {
                    return Err(AppError::InvalidTransition(format!(
                        "reference {} already belongs to payment {}",
                        gateway_reference, other.id
                    )));
                }
            }
        }

        let mut tx = self.pool.begin().await?;

        if self.idempotency.find_in(&mut tx, key).await?.is_some() {
            tx.rollback().await?;
            return self.resolve_replay(key, &outcome).await;
        }

        if payment.status != PaymentStatus::Pending {
            // Terminal payment without an admission record: a duplicate
            // delivery outside the key's coverage, or a logic error.
            // Surfaced, not swallowed.
            tx.rollback().await?;
            return Err(AppError::InvalidTransition(format!(
                "payment {} is {}, expected Pending",
                payment.id, payment.status
            )));
        }

        match &outcome {
            TransitionOutcome::Completed {
                gateway_reference, ..
            } => {
                let rows = self
                    .payments
                    .mark_completed(&mut tx, payment.id, gateway_reference)
                    .await?;
                if rows == 0 {
                    tx.rollback().await?;
                    return self.resolve_replay(key, &outcome).await;
                }

                self.accounts
                    .credit(&mut tx, payment.user_id, payment.credits)
                    .await?;
            }
            TransitionOutcome::Failed { reason } => {
                let rows = self.payments.mark_failed(&mut tx, payment.id, reason).await?;
                if rows == 0 {
                    tx.rollback().await?;
                    return self.resolve_replay(key, &outcome).await;
                }
            }
        }

        let admitted = self.idempotency.admit(&mut tx, key, outcome.status()).await?;
        if !admitted {
            // A racer admitted the key between our check and insert; the
            // rollback discards our half-applied side of the race.
            tx.rollback().await?;
            return self.resolve_replay(key, &outcome).await;
        }

        tx.commit().await?;

        match &outcome {
            TransitionOutcome::Completed {
                gateway_reference,
                provider_metadata,
            } => {
                tracing::info!(
                    payment_id = %payment.id,
                    user_id = payment.user_id,
                    credits = payment.credits,
                    reference = %gateway_reference,
                    provider_metadata = provider_metadata.as_deref().unwrap_or(""),
                    "payment completed, credits granted"
                );
            }
            TransitionOutcome::Failed { reason } => {
                tracing::info!(
                    payment_id = %payment.id,
                    user_id = payment.user_id,
                    reason = %reason,
                    "payment failed"
                );
            }
        }

        self.payments
            .find_by_id(payment.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve transitioned payment".to_string()))
    }

    /// A key that already carries an admission record: the same outcome
    /// is an idempotent no-op, a different outcome is a conflict that
    /// halts automatic processing.
    async fn resolve_replay(&self, key: &str, outcome: &TransitionOutcome) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No payment for idempotency key {}", key)))?;

        let record = self.idempotency.find(key).await?.ok_or_else(|| {
            AppError::Internal(format!("admission record for {} disappeared", key))
        })?;

        // Refunds move the payment past the recorded terminal status;
        // replaying the original completion is still a matching outcome.
        if record.result_status == outcome.status() {
            tracing::debug!(
                payment_id = %payment.id,
                key,
                status = %record.result_status,
                "replayed gateway event, no side effects applied"
            );
            return Ok(payment);
        }

        let conflict = AppError::OutcomeConflict {
            payment_id: payment.id.to_string(),
            recorded: record.result_status.as_str().to_string(),
            claimed: outcome.status().as_str().to_string(),
        };
        tracing::error!(
            payment_id = %payment.id,
            key,
            recorded = %record.result_status,
            claimed = %outcome.status(),
            "conflicting terminal outcomes claimed, manual review required"
        );
        Err(conflict)
    }

    /// Fetches a payment, hiding its existence from other non-admin
    /// users.
    pub async fn get(
        &self,
        payment_id: Uuid,
        requesting_user: i64,
        is_admin: bool,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.user_id != requesting_user && !is_admin {
            return Err(AppError::NotFound(format!("Payment {} not found", payment_id)));
        }

        Ok(payment)
    }

    /// Newest-first page of a user's payments plus the total count.
    pub async fn history(
        &self,
        user_id: i64,
        page: i64,
        limit: i64,
        status: Option<PaymentStatus>,
    ) -> Result<(Vec<Payment>, i64)> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page - 1) * limit;

        let payments = self
            .payments
            .find_by_user(user_id, limit, offset, status)
            .await?;
        let total = self.payments.count_by_user(user_id, status).await?;

        Ok((payments, total))
    }

    pub async fn balance(&self, user_id: i64) -> Result<CreditAccount> {
        Ok(self
            .accounts
            .find(user_id)
            .await?
            .unwrap_or_else(|| CreditAccount::empty(user_id)))
    }

    /// Administrator settlement of a payment the gateway never confirmed
    /// (bank transfer receipts, support goodwill). Runs through the same
    /// exactly-once transition as a gateway event.
    pub async fn settle_manual(&self, payment_id: Uuid, actor_id: i64) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        tracing::info!(
            payment_id = %payment.id,
            actor_id,
            "manual settlement requested"
        );

        self.transition(
            &payment.idempotency_key,
            TransitionOutcome::Completed {
                gateway_reference: format!("manual:{}", payment.id),
                provider_metadata: Some(format!("settled by {}", actor_id)),
            },
        )
        .await
    }
}
