mod common;

use chrono::{Duration, Utc};
use tally::{
    domain::{Currency, Gateway, PaymentStatus, TransitionOutcome},
    error::AppError,
};

async fn backdate_payment(
    ctx: &common::TestContext,
    id: uuid::Uuid,
    hours: i64,
) -> anyhow::Result<()> {
    let created_at = (Utc::now() - Duration::hours(hours)).naive_utc();
    sqlx::query("UPDATE payments SET created_at = ? WHERE id = ?")
        .bind(created_at)
        .bind(id.to_string())
        .execute(&ctx.pool)
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_sweeper_fails_stale_pending() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let payment = ctx
        .ledger
        .initiate(7, "pro", Gateway::Ton, Currency::Ton, &pricing)
        .await?;
    backdate_payment(&ctx, payment.id, 25).await?;

    let sweeper = ctx.sweeper(24);
    let expired = sweeper.sweep_once().await?;
    assert_eq!(expired, 1);

    let payment = ctx.ledger.get(payment.id, 7, false).await?;
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.failure_reason.as_deref(), Some("timeout"));
    assert_eq!(ctx.ledger.balance(7).await?.balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_late_callback_after_timeout_conflicts() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let payment = ctx
        .ledger
        .initiate(7, "pro", Gateway::Ton, Currency::Ton, &pricing)
        .await?;
    backdate_payment(&ctx, payment.id, 25).await?;

    ctx.sweeper(24).sweep_once().await?;

    // The genuine confirmation arrives after the timeout, under the
    // payment's own key
    let result = ctx
        .ledger
        .transition(
            &payment.idempotency_key,
            TransitionOutcome::Completed {
                gateway_reference: "tx-late".to_string(),
                provider_metadata: None,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::OutcomeConflict { .. })));

    // The timeout verdict stands until a human decides otherwise
    let payment = ctx.ledger.get(payment.id, 7, false).await?;
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(ctx.ledger.balance(7).await?.balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_sweeper_ignores_fresh_and_terminal_payments() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    // Fresh pending payment: not yet stale
    let fresh = ctx
        .ledger
        .initiate(7, "basic", Gateway::Ton, Currency::Ton, &pricing)
        .await?;

    // Old but already completed payment
    let old_completed = ctx
        .ledger
        .initiate(8, "basic", Gateway::Ton, Currency::Ton, &pricing)
        .await?;
    ctx.ledger
        .transition(
            &old_completed.idempotency_key,
            TransitionOutcome::Completed {
                gateway_reference: "tx-old".to_string(),
                provider_metadata: None,
            },
        )
        .await?;
    backdate_payment(&ctx, old_completed.id, 48).await?;

    let expired = ctx.sweeper(24).sweep_once().await?;
    assert_eq!(expired, 0);

    assert_eq!(
        ctx.ledger.get(fresh.id, 7, false).await?.status,
        PaymentStatus::Pending
    );
    assert_eq!(
        ctx.ledger.get(old_completed.id, 8, false).await?.status,
        PaymentStatus::Completed
    );
    assert_eq!(ctx.ledger.balance(8).await?.balance, 100);

    Ok(())
}

#[tokio::test]
async fn test_sweep_is_replay_safe() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let payment = ctx
        .ledger
        .initiate(7, "pro", Gateway::Ton, Currency::Ton, &pricing)
        .await?;
    backdate_payment(&ctx, payment.id, 30).await?;

    let sweeper = ctx.sweeper(24);
    assert_eq!(sweeper.sweep_once().await?, 1);
    // The payment is terminal now, so the next pass has nothing to do
    assert_eq!(sweeper.sweep_once().await?, 0);

    let payment = ctx.ledger.get(payment.id, 7, false).await?;
    assert_eq!(payment.status, PaymentStatus::Failed);

    Ok(())
}
