use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{Payment, PaymentStatus},
    error::Result,
    repository::CurrencyTotal,
};

#[derive(Deserialize)]
pub struct RefundRequest {
    pub reason: String,
    pub amount: Option<i64>,
}

pub async fn refund(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<Payment>> {
    let payment = state
        .refunds
        .refund(id, user.user_id, request.reason, request.amount)
        .await?;
    Ok(Json(payment))
}

pub async fn settle(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>> {
    let payment = state.ledger.settle_manual(id, user.user_id).await?;
    Ok(Json(payment))
}

#[derive(Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<PaymentStatus>,
}

pub async fn list_payments(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Payment>>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let payments = state
        .payments
        .list(limit, (page - 1) * limit, params.status)
        .await?;
    Ok(Json(payments))
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub totals: Vec<CurrencyTotal>,
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let totals = state.payments.completed_totals().await?;
    Ok(Json(StatsResponse { totals }))
}
