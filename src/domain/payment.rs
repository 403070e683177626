use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One purchase attempt. Rows are append-only audit records: a payment is
/// never deleted, only transitioned along the state machine, and becomes
/// immutable once `Refunded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: i64,
    /// Positive amount in currency minor units (rials, cents, nanotons).
    pub amount: i64,
    pub currency: Currency,
    /// Positive number of credits granted on completion.
    pub credits: i64,
    pub gateway: Gateway,
    pub status: PaymentStatus,
    /// Provider transaction/authority id. Unique among non-failed
    /// payments per gateway once assigned.
    pub gateway_reference: Option<String>,
    /// Stable key under which gateway events for this payment are
    /// admitted at most once. `zarinpal:{authority}` once the authority
    /// exists, otherwise `payment:{id}`.
    pub idempotency_key: String,
    pub package: String,
    pub description: String,
    pub failure_reason: Option<String>,
    pub refund: Option<Refund>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// The idempotency key a payment carries before (or without) a
    /// provider-issued reference. Also the sweeper's fallback key, so a
    /// late real callback collides here instead of being silently
    /// overwritten.
    pub fn fallback_key(id: &Uuid) -> String {
        format!("payment:{}", id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Zarinpal,
    Ton,
    Manual,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::Zarinpal => "zarinpal",
            Gateway::Ton => "ton",
            Gateway::Manual => "manual",
        }
    }

    /// Static capability check used at initiation; the adapters own the
    /// dynamic (network) half of verification.
    pub fn supports(&self, currency: Currency) -> bool {
        match self {
            Gateway::Zarinpal => currency == Currency::Irr,
            Gateway::Ton => currency == Currency::Ton,
            Gateway::Manual => true,
        }
    }

    pub fn default_currency(&self) -> Option<Currency> {
        match self {
            Gateway::Zarinpal => Some(Currency::Irr),
            Gateway::Ton => Some(Currency::Ton),
            Gateway::Manual => None,
        }
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Irr,
    Usd,
    Ton,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Irr => "IRR",
            Currency::Usd => "USD",
            Currency::Ton => "TON",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refund sub-record, written once when a completed payment is reversed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub amount: i64,
    pub reason: String,
    pub actor_id: i64,
    pub processed_at: DateTime<Utc>,
}

/// Terminal outcome claimed for a pending payment by a verified gateway
/// event, the sweeper, or manual settlement.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Completed {
        gateway_reference: String,
        provider_metadata: Option<String>,
    },
    Failed {
        reason: String,
    },
}

impl TransitionOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            TransitionOutcome::Completed { .. } => PaymentStatus::Completed,
            TransitionOutcome::Failed { .. } => PaymentStatus::Failed,
        }
    }
}
