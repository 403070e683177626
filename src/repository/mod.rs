use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::domain::*;
use crate::error::Result;

pub mod account_repository;
pub mod idempotency_repository;
pub mod payment_repository;

pub use account_repository::SqliteCreditAccountRepository;
pub use idempotency_repository::SqliteIdempotencyRepository;
pub use payment_repository::SqlitePaymentRepository;

/// Per-currency revenue rollup for the admin dashboard.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CurrencyTotal {
    pub currency: Currency,
    pub total_amount: i64,
    pub count: i64,
}

/// Payments are append-mostly audit records. Reads run against the pool;
/// the status mutators take a live connection so the ledger can scope
/// them inside one transaction together with the credit mutation and the
/// idempotency admit. Every mutator is a guarded UPDATE and reports rows
/// affected so callers can detect a lost race.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: Payment) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>>;
    async fn find_by_reference(&self, gateway: Gateway, reference: &str)
        -> Result<Option<Payment>>;
    async fn find_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>>;
    async fn count_by_user(&self, user_id: i64, status: Option<PaymentStatus>) -> Result<i64>;
    async fn list(
        &self,
        limit: i64,
        offset: i64,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>>;
    async fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>>;
    async fn attach_reference(
        &self,
        id: Uuid,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<Payment>;
    async fn completed_totals(&self) -> Result<Vec<CurrencyTotal>>;

    async fn mark_completed(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        reference: &str,
    ) -> Result<u64>;
    async fn mark_failed(&self, conn: &mut SqliteConnection, id: Uuid, reason: &str)
        -> Result<u64>;
    async fn mark_refunded(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        refund: &Refund,
    ) -> Result<u64>;
}

/// Credit balances. Mutations only happen through the transaction-scoped
/// methods, invoked by the ledger alongside the owning payment's status
/// change; nothing else may touch a balance.
#[async_trait]
pub trait CreditAccountRepository: Send + Sync {
    async fn find(&self, user_id: i64) -> Result<Option<CreditAccount>>;
    /// Lazily creates the account, then applies `balance += credits` and
    /// bumps the version.
    async fn credit(&self, conn: &mut SqliteConnection, user_id: i64, credits: i64) -> Result<()>;
    /// Conditional `balance -= credits` guarded by `balance >= credits`.
    /// Returns false (and mutates nothing) when the credits are already
    /// spent.
    async fn debit(&self, conn: &mut SqliteConnection, user_id: i64, credits: i64) -> Result<bool>;
}

/// At-most-once admission of gateway events.
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>>;
    async fn find_in(
        &self,
        conn: &mut SqliteConnection,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>>;
    /// Atomic check-and-set: the first caller inserts the record and gets
    /// true, every other caller gets false.
    async fn admit(
        &self,
        conn: &mut SqliteConnection,
        key: &str,
        result: PaymentStatus,
    ) -> Result<bool>;
}
