use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{CreditAccount, Currency, Gateway, Payment, PaymentStatus},
    error::{AppError, Result},
    gateways::{zarinpal, ExternalHandle},
};

#[derive(Deserialize)]
pub struct InitiatePurchaseRequest {
    pub package: String,
    pub gateway: Gateway,
    pub currency: Option<Currency>,
}

#[derive(Serialize)]
pub struct InitiatePurchaseResponse {
    pub payment_id: Uuid,
    #[serde(flatten)]
    pub handle: ExternalHandle,
}

pub async fn initiate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<InitiatePurchaseRequest>,
) -> Result<Json<InitiatePurchaseResponse>> {
    if request.gateway == Gateway::Manual {
        return Err(AppError::BadRequest(
            "manual payments are settled by an administrator".to_string(),
        ));
    }

    let currency = request
        .currency
        .or_else(|| request.gateway.default_currency())
        .ok_or_else(|| AppError::BadRequest("currency is required".to_string()))?;

    // Resolve the adapter before creating any record, so an unconfigured
    // gateway cannot leave an orphan pending payment behind.
    let adapter = state.gateways.get(request.gateway)?;

    let payment = state
        .ledger
        .initiate(
            user.user_id,
            &request.package,
            request.gateway,
            currency,
            &state.settings.pricing,
        )
        .await?;

    // Network phase: no lock is held. On gateway failure the payment
    // stays pending and ages into the sweeper's timeout path.
    let handle = adapter.initiate_external(&payment).await?;

    if let ExternalHandle::Redirect { authority, .. } = &handle {
        state
            .ledger
            .attach_reference(payment.id, authority, &zarinpal::callback_key(authority))
            .await?;
    }

    Ok(Json(InitiatePurchaseResponse {
        payment_id: payment.id,
        handle,
    }))
}

#[derive(Serialize)]
pub struct PackageView {
    pub id: String,
    pub credits: i64,
    pub prices: HashMap<Currency, i64>,
}

pub async fn packages(State(state): State<AppState>) -> Result<Json<Vec<PackageView>>> {
    let mut packages: Vec<PackageView> = state
        .settings
        .pricing
        .packages
        .iter()
        .map(|(id, package)| PackageView {
            id: id.clone(),
            credits: package.credits,
            prices: package.prices.clone(),
        })
        .collect();
    packages.sort_by_key(|p| p.credits);

    Ok(Json(packages))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>> {
    let payment = state.ledger.get(id, user.user_id, user.is_admin).await?;
    Ok(Json(payment))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<PaymentStatus>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub payments: Vec<Payment>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
}

pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);

    let (payments, total) = state
        .ledger
        .history(user.user_id, page, limit, params.status)
        .await?;

    Ok(Json(HistoryResponse {
        payments,
        total,
        page,
        total_pages: (total + limit - 1) / limit,
    }))
}

pub async fn balance(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<CreditAccount>> {
    let account = state.ledger.balance(user.user_id).await?;
    Ok(Json(account))
}
