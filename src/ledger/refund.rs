use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    domain::{Payment, PaymentStatus, Refund},
    error::{AppError, Result},
    repository::{CreditAccountRepository, PaymentRepository},
};

/// Reverses a completed payment's credit grant. Administrator-authorized
/// only; the authorization check happens upstream.
pub struct RefundProcessor {
    pool: SqlitePool,
    payments: Arc<dyn PaymentRepository>,
    accounts: Arc<dyn CreditAccountRepository>,
}

impl RefundProcessor {
    pub fn new(
        pool: SqlitePool,
        payments: Arc<dyn PaymentRepository>,
        accounts: Arc<dyn CreditAccountRepository>,
    ) -> Self {
        Self {
            pool,
            payments,
            accounts,
        }
    }

    pub async fn refund(
        &self,
        payment_id: Uuid,
        actor_id: i64,
        reason: String,
        amount: Option<i64>,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.status != PaymentStatus::Completed {
            return Err(AppError::InvalidTransition(format!(
                "payment {} is {}, only completed payments can be refunded",
                payment.id, payment.status
            )));
        }

        let refund_amount = amount.unwrap_or(payment.amount);
        if refund_amount <= 0 || refund_amount > payment.amount {
            return Err(AppError::BadRequest(format!(
                "refund amount must be within 1..={}",
                payment.amount
            )));
        }

        let available = self
            .accounts
            .find(payment.user_id)
            .await?
            .map(|a| a.balance)
            .unwrap_or(0);

        let mut tx = self.pool.begin().await?;

        // The credits may already be spent; clawing them back into a
        // negative balance is never acceptable, so the conditional debit
        // is the authority here, not the balance we just read.
        let debited = self
            .accounts
            .debit(&mut tx, payment.user_id, payment.credits)
            .await?;
        if !debited {
            tx.rollback().await?;
            return Err(AppError::InsufficientBalance {
                available,
                required: payment.credits,
            });
        }

        let refund = Refund {
            amount: refund_amount,
            reason,
            actor_id,
            processed_at: Utc::now(),
        };

        let rows = self
            .payments
            .mark_refunded(&mut tx, payment.id, &refund)
            .await?;
        if rows == 0 {
            tx.rollback().await?;
            return Err(AppError::InvalidTransition(format!(
                "payment {} was modified concurrently, refund aborted",
                payment.id
            )));
        }

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            user_id = payment.user_id,
            actor_id,
            credits = payment.credits,
            amount = refund_amount,
            "payment refunded, credits reclaimed"
        );

        self.payments
            .find_by_id(payment.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve refunded payment".to_string()))
    }
}
