use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::{Gateway, Payment, PaymentStatus, TransitionOutcome},
    error::{AppError, Result},
    gateways::{with_retries, ExternalHandle, GatewayEvent, PaymentGateway, REQUEST_TIMEOUT},
    repository::PaymentRepository,
};

/// Chain-based gateway. Initiation hands the client a `ton://transfer`
/// URI; completion is claimed by the client submitting a transaction
/// hash, which is only accepted after checking it is not linked to any
/// other payment (and, when a chain API is configured, that the
/// transaction exists and succeeded on-chain).
pub struct TonGateway {
    client: reqwest::Client,
    wallet_address: String,
    api_base: Option<String>,
    payments: Arc<dyn PaymentRepository>,
}

impl TonGateway {
    pub fn new(
        wallet_address: String,
        api_base: Option<String>,
        payments: Arc<dyn PaymentRepository>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            wallet_address,
            api_base,
            payments,
        }
    }

    /// Confirms the transaction is visible and successful on-chain.
    /// Returns false for a transaction the chain reports as failed.
    async fn confirm_on_chain(&self, api_base: &str, tx_hash: &str) -> Result<bool> {
        let url = format!("{}/v2/blockchain/transactions/{}", api_base, tx_hash);
        let response = with_retries("ton transaction lookup", || {
            let request = self.client.get(&url).timeout(REQUEST_TIMEOUT);
            async move {
                request
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Value>()
                    .await
            }
        })
        .await?;

        Ok(response
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }
}

#[async_trait]
impl PaymentGateway for TonGateway {
    fn name(&self) -> &'static str {
        "ton"
    }

    async fn initiate_external(&self, payment: &Payment) -> Result<ExternalHandle> {
        let comment = format!("payment:{}", payment.id);
        let payment_uri = format!(
            "ton://transfer/{}?amount={}&text={}",
            self.wallet_address,
            payment.amount,
            urlencoding::encode(&comment)
        );

        Ok(ExternalHandle::ChainTransfer {
            payment_uri,
            wallet: self.wallet_address.clone(),
            amount: payment.amount,
        })
    }

    async fn verify_callback(&self, raw: &Value) -> Result<GatewayEvent> {
        let payment_id = raw
            .get("payment_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AppError::BadRequest("missing or invalid payment_id".to_string()))?;
        let tx_hash = raw
            .get("tx_hash")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing tx_hash".to_string()))?;

        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        // A hash that already settles another payment cannot settle this
        // one, whatever the client claims.
        if let Some(other) = self.payments.find_by_reference(Gateway::Ton, tx_hash).await? {
            if other.id != payment.id && other.status != PaymentStatus::Failed {
                return Err(AppError::InvalidTransition(format!(
                    "transaction {} is already linked to another payment",
                    tx_hash
                )));
            }
        }

        let outcome = match &self.api_base {
            Some(api_base) => {
                if self.confirm_on_chain(api_base, tx_hash).await? {
                    TransitionOutcome::Completed {
                        gateway_reference: tx_hash.to_string(),
                        provider_metadata: None,
                    }
                } else {
                    TransitionOutcome::Failed {
                        reason: "transaction failed on chain".to_string(),
                    }
                }
            }
            None => TransitionOutcome::Completed {
                gateway_reference: tx_hash.to_string(),
                provider_metadata: None,
            },
        };

        Ok(GatewayEvent {
            idempotency_key: payment.idempotency_key.clone(),
            outcome,
        })
    }
}
