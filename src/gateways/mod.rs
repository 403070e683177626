use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    domain::{Gateway, Payment, TransitionOutcome},
    error::{AppError, Result},
};

pub mod ton;
pub mod zarinpal;

pub use ton::TonGateway;
pub use zarinpal::ZarinpalGateway;

pub(crate) const MAX_ATTEMPTS: u32 = 3;
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the client goes to actually pay.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExternalHandle {
    /// Redirect-based gateway: send the user to `url`.
    Redirect { url: String, authority: String },
    /// Chain-based gateway: a transfer the user signs from their wallet.
    ChainTransfer {
        payment_uri: String,
        wallet: String,
        amount: i64,
    },
}

/// A provider event normalized into ledger terms. Verification already
/// happened by the time one of these exists.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub idempotency_key: String,
    pub outcome: TransitionOutcome,
}

/// Capability set each provider implements. Both operations may perform
/// network round-trips and therefore run before any ledger transaction
/// is opened; nothing here touches credit balances.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts the external transaction for a freshly created pending
    /// payment.
    async fn initiate_external(&self, payment: &Payment) -> Result<ExternalHandle>;

    /// Turns a raw provider callback into a verified event. Client-
    /// supplied success flags are never trusted on their own: the
    /// redirect gateway re-queries the provider, the chain gateway
    /// checks the submitted hash against the ledger (and the chain when
    /// an API is configured).
    async fn verify_callback(&self, raw: &serde_json::Value) -> Result<GatewayEvent>;
}

#[derive(Default)]
pub struct GatewayRegistry {
    gateways: HashMap<Gateway, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gateway: Gateway, adapter: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway, adapter);
    }

    pub fn get(&self, gateway: Gateway) -> Result<Arc<dyn PaymentGateway>> {
        self.gateways.get(&gateway).cloned().ok_or_else(|| {
            AppError::GatewayUnavailable(format!("{} gateway is not configured", gateway))
        })
    }
}

/// Bounded retry with doubling backoff for outbound provider calls.
/// Exhaustion surfaces as `GatewayUnavailable`; the payment stays
/// pending for the sweeper.
pub(crate) async fn with_retries<T, F, Fut>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, reqwest::Error>>,
{
    let mut backoff = Duration::from_millis(250);
    let mut last: Option<reqwest::Error> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(attempt, "{} failed: {}", what, err);
                last = Some(err);
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(AppError::GatewayUnavailable(format!(
        "{} failed after {} attempts: {}",
        what,
        MAX_ATTEMPTS,
        last.map(|e| e.to_string()).unwrap_or_default()
    )))
}
