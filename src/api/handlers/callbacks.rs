use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{Gateway, PaymentStatus},
    error::{AppError, Result},
};

/// Zarinpal redirects the user's browser here after payment. The
/// response is 200 with a coarse status whatever happens: once the event
/// is durably admitted (or rejected) there is nothing a provider retry
/// could fix, and internal errors are for the logs, not the gateway.
pub async fn zarinpal(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let raw = json!({
        "authority": params.get("Authority"),
        "status": params.get("Status"),
    });

    let adapter = match state.gateways.get(Gateway::Zarinpal) {
        Ok(adapter) => adapter,
        Err(err) => {
            tracing::error!("zarinpal callback on unconfigured gateway: {}", err);
            return Json(json!({ "status": "error" }));
        }
    };

    // Phase one: provider-side verification, network only, no locks.
    let event = match adapter.verify_callback(&raw).await {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!("zarinpal callback verification failed: {}", err);
            return Json(json!({ "status": "rejected" }));
        }
    };

    // Phase two: the fast, transactional transition.
    match state.ledger.transition(&event.idempotency_key, event.outcome).await {
        Ok(payment) => Json(json!({ "status": payment.status })),
        Err(AppError::OutcomeConflict { .. }) => Json(json!({ "status": "conflict" })),
        Err(err) => {
            tracing::error!("zarinpal callback processing failed: {}", err);
            Json(json!({ "status": "error" }))
        }
    }
}

#[derive(Deserialize)]
pub struct TonVerifyRequest {
    pub payment_id: Uuid,
    pub tx_hash: String,
}

#[derive(Serialize)]
pub struct TonVerifyResponse {
    pub status: PaymentStatus,
    pub balance: i64,
}

/// The buyer submits the transaction hash of their transfer. Unlike the
/// provider-facing callback this is a client-facing operation, so errors
/// surface normally.
pub async fn ton_verify(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<TonVerifyRequest>,
) -> Result<Json<TonVerifyResponse>> {
    // Ownership check before anything else; foreign payments read as
    // absent.
    state
        .ledger
        .get(request.payment_id, user.user_id, user.is_admin)
        .await?;

    let adapter = state.gateways.get(Gateway::Ton)?;
    let raw = json!({
        "payment_id": request.payment_id.to_string(),
        "tx_hash": request.tx_hash,
    });

    let event = adapter.verify_callback(&raw).await?;
    let payment = state
        .ledger
        .transition(&event.idempotency_key, event.outcome)
        .await?;

    let account = state.ledger.balance(user.user_id).await?;

    Ok(Json(TonVerifyResponse {
        status: payment.status,
        balance: account.balance,
    }))
}
