mod common;

use tally::{
    domain::{Currency, Gateway, PaymentStatus, TransitionOutcome},
    error::AppError,
    gateways::zarinpal,
};

fn completed(reference: &str) -> TransitionOutcome {
    TransitionOutcome::Completed {
        gateway_reference: reference.to_string(),
        provider_metadata: None,
    }
}

#[tokio::test]
async fn test_initiate_and_complete_grants_credits() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    // User starts from zero
    assert_eq!(ctx.ledger.balance(7).await?.balance, 0);

    let payment = ctx
        .ledger
        .initiate(7, "pro", Gateway::Zarinpal, Currency::Irr, &pricing)
        .await?;
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.credits, 500);
    assert_eq!(payment.amount, 2_000_000);
    assert!(payment.gateway_reference.is_none());

    // The gateway issues an authority; the payment is re-keyed for the
    // callback
    let payment = ctx
        .ledger
        .attach_reference(payment.id, "ref-1", &zarinpal::callback_key("ref-1"))
        .await?;
    assert_eq!(payment.gateway_reference.as_deref(), Some("ref-1"));

    let payment = ctx
        .ledger
        .transition(&zarinpal::callback_key("ref-1"), completed("ref-1"))
        .await?;
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(payment.paid_at.is_some());

    let account = ctx.ledger.balance(7).await?;
    assert_eq!(account.balance, 500);
    assert_eq!(account.version, 1);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_callback_is_noop() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let payment = ctx
        .ledger
        .initiate(7, "pro", Gateway::Zarinpal, Currency::Irr, &pricing)
        .await?;
    let key = zarinpal::callback_key("ref-1");
    ctx.ledger.attach_reference(payment.id, "ref-1", &key).await?;

    ctx.ledger.transition(&key, completed("ref-1")).await?;
    assert_eq!(ctx.ledger.balance(7).await?.balance, 500);

    let record = ctx.idempotency.find(&key).await?.expect("record written");
    let first_seen = record.first_seen_at;

    // Replays: same key, same outcome, any number of times
    for _ in 0..3 {
        let replayed = ctx.ledger.transition(&key, completed("ref-1")).await?;
        assert_eq!(replayed.status, PaymentStatus::Completed);
    }

    let account = ctx.ledger.balance(7).await?;
    assert_eq!(account.balance, 500, "replay must never re-credit");
    assert_eq!(account.version, 1);

    let record = ctx.idempotency.find(&key).await?.expect("record still there");
    assert_eq!(record.first_seen_at, first_seen, "no new admission record");

    Ok(())
}

#[tokio::test]
async fn test_concurrent_transitions_apply_once() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let payment = ctx
        .ledger
        .initiate(7, "pro", Gateway::Zarinpal, Currency::Irr, &pricing)
        .await?;
    let key = zarinpal::callback_key("ref-race");
    ctx.ledger
        .attach_reference(payment.id, "ref-race", &key)
        .await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ctx.ledger.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            ledger.transition(&key, completed("ref-race")).await
        }));
    }

    for handle in handles {
        let result = handle.await?.expect("same-outcome racers all succeed");
        assert_eq!(result.status, PaymentStatus::Completed);
    }

    let account = ctx.ledger.balance(7).await?;
    assert_eq!(account.balance, 500, "exactly one credit mutation");
    assert_eq!(account.version, 1);

    Ok(())
}

#[tokio::test]
async fn test_mismatched_outcome_is_conflict() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let payment = ctx
        .ledger
        .initiate(7, "pro", Gateway::Zarinpal, Currency::Irr, &pricing)
        .await?;
    let key = zarinpal::callback_key("ref-1");
    ctx.ledger.attach_reference(payment.id, "ref-1", &key).await?;
    ctx.ledger.transition(&key, completed("ref-1")).await?;

    let result = ctx
        .ledger
        .transition(
            &key,
            TransitionOutcome::Failed {
                reason: "timeout".to_string(),
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::OutcomeConflict { .. })));

    // Nothing moved
    assert_eq!(ctx.ledger.balance(7).await?.balance, 500);
    let payment = ctx.ledger.get(payment.id, 7, false).await?;
    assert_eq!(payment.status, PaymentStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn test_failed_transition_records_reason() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let payment = ctx
        .ledger
        .initiate(7, "basic", Gateway::Zarinpal, Currency::Irr, &pricing)
        .await?;
    let key = zarinpal::callback_key("ref-nok");
    ctx.ledger.attach_reference(payment.id, "ref-nok", &key).await?;

    let payment = ctx
        .ledger
        .transition(
            &key,
            TransitionOutcome::Failed {
                reason: "canceled at gateway".to_string(),
            },
        )
        .await?;

    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.failure_reason.as_deref(), Some("canceled at gateway"));
    assert_eq!(ctx.ledger.balance(7).await?.balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_two_payments_same_user_both_apply() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    for (package, reference) in [("basic", "ref-a"), ("pro", "ref-b")] {
        let payment = ctx
            .ledger
            .initiate(7, package, Gateway::Zarinpal, Currency::Irr, &pricing)
            .await?;
        let key = zarinpal::callback_key(reference);
        ctx.ledger
            .attach_reference(payment.id, reference, &key)
            .await?;
        ctx.ledger.transition(&key, completed(reference)).await?;
    }

    let account = ctx.ledger.balance(7).await?;
    assert_eq!(account.balance, 600);
    assert_eq!(account.version, 2);

    Ok(())
}

#[tokio::test]
async fn test_reference_cannot_settle_two_payments() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let first = ctx
        .ledger
        .initiate(7, "basic", Gateway::Zarinpal, Currency::Irr, &pricing)
        .await?;
    let key_a = zarinpal::callback_key("ref-dup");
    ctx.ledger.attach_reference(first.id, "ref-dup", &key_a).await?;
    ctx.ledger.transition(&key_a, completed("ref-dup")).await?;

    // A second payment claiming the same provider reference
    let second = ctx
        .ledger
        .initiate(9, "basic", Gateway::Zarinpal, Currency::Irr, &pricing)
        .await?;
    let result = ctx
        .ledger
        .transition(&second.idempotency_key, completed("ref-dup"))
        .await;

    assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    assert_eq!(ctx.ledger.balance(9).await?.balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_invalid_package_and_currency() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let result = ctx
        .ledger
        .initiate(7, "enterprise", Gateway::Zarinpal, Currency::Irr, &pricing)
        .await;
    assert!(matches!(result, Err(AppError::InvalidPackage(_))));

    // Zarinpal only settles rials
    let result = ctx
        .ledger
        .initiate(7, "pro", Gateway::Zarinpal, Currency::Usd, &pricing)
        .await;
    assert!(matches!(result, Err(AppError::InvalidCurrency { .. })));

    Ok(())
}

#[tokio::test]
async fn test_get_hides_foreign_payments() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let payment = ctx
        .ledger
        .initiate(7, "basic", Gateway::Zarinpal, Currency::Irr, &pricing)
        .await?;

    assert!(ctx.ledger.get(payment.id, 7, false).await.is_ok());
    assert!(matches!(
        ctx.ledger.get(payment.id, 8, false).await,
        Err(AppError::NotFound(_))
    ));
    // Admins see everything
    assert!(ctx.ledger.get(payment.id, 8, true).await.is_ok());

    Ok(())
}

#[tokio::test]
async fn test_history_pagination() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    for i in 0..3 {
        let payment = ctx
            .ledger
            .initiate(7, "basic", Gateway::Zarinpal, Currency::Irr, &pricing)
            .await?;
        let reference = format!("ref-{}", i);
        let key = zarinpal::callback_key(&reference);
        ctx.ledger
            .attach_reference(payment.id, &reference, &key)
            .await?;
    }

    let (page_one, total) = ctx.ledger.history(7, 1, 2, None).await?;
    assert_eq!(page_one.len(), 2);
    assert_eq!(total, 3);

    let (page_two, _) = ctx.ledger.history(7, 2, 2, None).await?;
    assert_eq!(page_two.len(), 1);

    // Another user sees nothing
    let (other, total) = ctx.ledger.history(8, 1, 10, None).await?;
    assert!(other.is_empty());
    assert_eq!(total, 0);

    Ok(())
}

#[tokio::test]
async fn test_manual_settlement_then_late_callback() -> anyhow::Result<()> {
    let ctx = common::setup().await?;
    let pricing = common::pricing();

    let payment = ctx
        .ledger
        .initiate(7, "pro", Gateway::Ton, Currency::Ton, &pricing)
        .await?;

    let settled = ctx.ledger.settle_manual(payment.id, 1).await?;
    assert_eq!(settled.status, PaymentStatus::Completed);
    assert_eq!(ctx.ledger.balance(7).await?.balance, 500);

    // The buyer's own verification arriving afterwards claims the same
    // outcome under the same key: a no-op, not a double credit
    let replayed = ctx
        .ledger
        .transition(
            &payment.idempotency_key,
            completed(&format!("manual:{}", payment.id)),
        )
        .await?;
    assert_eq!(replayed.status, PaymentStatus::Completed);
    assert_eq!(ctx.ledger.balance(7).await?.balance, 500);

    Ok(())
}
