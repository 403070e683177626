use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    config::{ServerConfig, ZarinpalConfig},
    domain::{Payment, TransitionOutcome},
    error::{AppError, Result},
    gateways::{with_retries, ExternalHandle, GatewayEvent, PaymentGateway, REQUEST_TIMEOUT},
    repository::PaymentRepository,
};

/// Provider code for a successful request/verification.
const CODE_OK: i64 = 100;
/// Provider code for "already verified": the money moved, a previous
/// verification for the same authority went through. Replay safety is
/// the idempotency store's job, so this still maps to Completed.
const CODE_ALREADY_VERIFIED: i64 = 101;

/// Idempotency key for callbacks addressed by provider authority.
pub fn callback_key(authority: &str) -> String {
    format!("zarinpal:{}", authority)
}

/// Redirect-based fiat gateway. The client is sent to the provider's
/// StartPay page; the provider redirects back with an authority and a
/// client-supplied status flag that is never trusted for success -- we
/// always re-verify server-side with the stored amount.
pub struct ZarinpalGateway {
    client: reqwest::Client,
    merchant_id: String,
    api_base: String,
    start_pay_base: String,
    callback_url: String,
    payments: Arc<dyn PaymentRepository>,
}

impl ZarinpalGateway {
    pub fn new(
        config: &ZarinpalConfig,
        server: &ServerConfig,
        merchant_id: String,
        payments: Arc<dyn PaymentRepository>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            merchant_id,
            api_base: config.api_base.clone(),
            start_pay_base: config.start_pay_base.clone(),
            callback_url: format!("{}/callbacks/zarinpal", server.base_url),
            payments,
        }
    }

    async fn post_json(&self, url: String, body: Value, what: &'static str) -> Result<Value> {
        with_retries(what, || {
            let request = self
                .client
                .post(&url)
                .json(&body)
                .timeout(REQUEST_TIMEOUT);
            async move {
                request
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Value>()
                    .await
            }
        })
        .await
    }

    fn data_code(response: &Value) -> i64 {
        response
            .pointer("/data/code")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for ZarinpalGateway {
    fn name(&self) -> &'static str {
        "zarinpal"
    }

    async fn initiate_external(&self, payment: &Payment) -> Result<ExternalHandle> {
        let body = json!({
            "merchant_id": self.merchant_id,
            "amount": payment.amount,
            "callback_url": self.callback_url,
            "description": payment.description,
            "metadata": {
                "payment_id": payment.id.to_string(),
                "user_id": payment.user_id.to_string(),
            },
        });

        let response = self
            .post_json(
                format!("{}/request.json", self.api_base),
                body,
                "zarinpal payment request",
            )
            .await?;

        let code = Self::data_code(&response);
        let authority = response
            .pointer("/data/authority")
            .and_then(Value::as_str)
            .map(str::to_string);

        match (code, authority) {
            (CODE_OK, Some(authority)) => Ok(ExternalHandle::Redirect {
                url: format!("{}/{}", self.start_pay_base, authority),
                authority,
            }),
            _ => Err(AppError::GatewayUnavailable(format!(
                "zarinpal rejected payment request with code {}",
                code
            ))),
        }
    }

    async fn verify_callback(&self, raw: &Value) -> Result<GatewayEvent> {
        let authority = raw
            .get("authority")
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing Authority parameter".to_string()))?;
        let status = raw.get("status").and_then(Value::as_str).unwrap_or("NOK");

        let key = callback_key(authority);

        if status != "OK" {
            return Ok(GatewayEvent {
                idempotency_key: key,
                outcome: TransitionOutcome::Failed {
                    reason: "canceled at gateway".to_string(),
                },
            });
        }

        // The verify endpoint requires the original amount, so the
        // payment record is the source of truth, not the callback.
        let payment = self
            .payments
            .find_by_reference(crate::domain::Gateway::Zarinpal, authority)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no payment for authority {}", authority))
            })?;

        let body = json!({
            "merchant_id": self.merchant_id,
            "amount": payment.amount,
            "authority": authority,
        });

        let response = self
            .post_json(
                format!("{}/verify.json", self.api_base),
                body,
                "zarinpal verification",
            )
            .await?;

        let code = Self::data_code(&response);
        let outcome = if code == CODE_OK || code == CODE_ALREADY_VERIFIED {
            // ref_id comes back as a number; keep it as provider
            // metadata alongside the authority we already track.
            let ref_id = response
                .pointer("/data/ref_id")
                .filter(|v| !v.is_null())
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                });
            TransitionOutcome::Completed {
                gateway_reference: authority.to_string(),
                provider_metadata: ref_id,
            }
        } else {
            TransitionOutcome::Failed {
                reason: format!("verification rejected with code {}", code),
            }
        };

        Ok(GatewayEvent {
            idempotency_key: key,
            outcome,
        })
    }
}
