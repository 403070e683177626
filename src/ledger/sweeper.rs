use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::{
    config::SweeperConfig,
    domain::TransitionOutcome,
    error::{AppError, Result},
    ledger::Ledger,
    repository::PaymentRepository,
};

/// Background reconciliation: payments stuck in `Pending` past the
/// staleness threshold are failed with reason "timeout" under their own
/// idempotency key, so a genuine callback arriving afterwards collides
/// there and surfaces as an outcome conflict instead of silently
/// rewriting history.
pub struct Sweeper {
    ledger: Arc<Ledger>,
    payments: Arc<dyn PaymentRepository>,
    interval: Duration,
    staleness: chrono::Duration,
}

impl Sweeper {
    pub fn new(
        ledger: Arc<Ledger>,
        payments: Arc<dyn PaymentRepository>,
        config: &SweeperConfig,
    ) -> Self {
        Self {
            ledger,
            payments,
            interval: Duration::from_secs(config.interval_secs),
            staleness: chrono::Duration::hours(config.staleness_hours),
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The immediate first tick doubles as a catch-up pass after a
        // restart.
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(expired) => tracing::info!(expired, "reconciliation sweep finished"),
                Err(err) => tracing::error!("reconciliation sweep failed: {}", err),
            }
        }
    }

    /// One reconciliation pass. Per-payment errors are logged and do not
    /// abort the pass.
    pub async fn sweep_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.staleness;
        let stale = self.payments.find_stale_pending(cutoff).await?;

        let mut expired = 0;
        for payment in stale {
            let outcome = TransitionOutcome::Failed {
                reason: "timeout".to_string(),
            };
            match self.ledger.transition(&payment.idempotency_key, outcome).await {
                Ok(_) => {
                    expired += 1;
                    tracing::info!(
                        payment_id = %payment.id,
                        age_hours = (Utc::now() - payment.created_at).num_hours(),
                        "expired stale pending payment"
                    );
                }
                // The payment resolved while we were sweeping; the
                // conflict is already recorded by the ledger.
                Err(AppError::OutcomeConflict { .. }) => {}
                Err(err) => {
                    tracing::warn!(
                        payment_id = %payment.id,
                        "failed to expire stale payment: {}",
                        err
                    );
                }
            }
        }

        Ok(expired)
    }
}
