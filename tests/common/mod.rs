use std::collections::HashMap;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use tally::{
    domain::{CreditPackage, Currency, PricingTable},
    ledger::{Ledger, RefundProcessor, Sweeper},
    repository::{
        CreditAccountRepository, IdempotencyRepository, PaymentRepository,
        SqliteCreditAccountRepository, SqliteIdempotencyRepository, SqlitePaymentRepository,
    },
};

pub struct TestContext {
    pub pool: SqlitePool,
    pub payments: Arc<dyn PaymentRepository>,
    pub accounts: Arc<dyn CreditAccountRepository>,
    pub idempotency: Arc<dyn IdempotencyRepository>,
    pub ledger: Arc<Ledger>,
    pub refunds: Arc<RefundProcessor>,
}

impl TestContext {
    pub fn sweeper(&self, staleness_hours: i64) -> Sweeper {
        Sweeper::new(
            self.ledger.clone(),
            self.payments.clone(),
            &tally::config::SweeperConfig {
                interval_secs: 3_600,
                staleness_hours,
            },
        )
    }
}

/// Fresh in-memory database with migrations applied. A single
/// connection, so every task in a test sees the same database.
pub async fn setup() -> anyhow::Result<TestContext> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let payments: Arc<dyn PaymentRepository> = Arc::new(SqlitePaymentRepository::new(pool.clone()));
    let accounts: Arc<dyn CreditAccountRepository> =
        Arc::new(SqliteCreditAccountRepository::new(pool.clone()));
    let idempotency: Arc<dyn IdempotencyRepository> =
        Arc::new(SqliteIdempotencyRepository::new(pool.clone()));

    let ledger = Arc::new(Ledger::new(
        pool.clone(),
        payments.clone(),
        accounts.clone(),
        idempotency.clone(),
    ));
    let refunds = Arc::new(RefundProcessor::new(
        pool.clone(),
        payments.clone(),
        accounts.clone(),
    ));

    Ok(TestContext {
        pool,
        payments,
        accounts,
        idempotency,
        ledger,
        refunds,
    })
}

/// Fixed pricing injected into every test, independent of the shipped
/// defaults.
pub fn pricing() -> PricingTable {
    let mut packages = HashMap::new();
    packages.insert(
        "basic".to_string(),
        CreditPackage {
            credits: 100,
            prices: HashMap::from([
                (Currency::Irr, 500_000),
                (Currency::Usd, 10),
                (Currency::Ton, 2_000_000_000),
            ]),
        },
    );
    packages.insert(
        "pro".to_string(),
        CreditPackage {
            credits: 500,
            prices: HashMap::from([
                (Currency::Irr, 2_000_000),
                (Currency::Usd, 40),
                (Currency::Ton, 8_000_000_000),
            ]),
        },
    );
    PricingTable { packages }
}
