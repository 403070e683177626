use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally::{
    api::{self, state::AppState},
    config::Settings,
    domain::Gateway,
    gateways::{GatewayRegistry, TonGateway, ZarinpalGateway},
    ledger::{Ledger, RefundProcessor, Sweeper},
    repository::{
        CreditAccountRepository, IdempotencyRepository, PaymentRepository,
        SqliteCreditAccountRepository, SqliteIdempotencyRepository, SqlitePaymentRepository,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!(
        "Starting Tally server on {}:{}",
        settings.server.host,
        settings.server.port
    );

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    // Initialize repositories
    let payment_repo: Arc<dyn PaymentRepository> =
        Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
    let account_repo: Arc<dyn CreditAccountRepository> =
        Arc::new(SqliteCreditAccountRepository::new(db_pool.clone()));
    let idempotency_repo: Arc<dyn IdempotencyRepository> =
        Arc::new(SqliteIdempotencyRepository::new(db_pool.clone()));

    // Ledger core
    let ledger = Arc::new(Ledger::new(
        db_pool.clone(),
        payment_repo.clone(),
        account_repo.clone(),
        idempotency_repo.clone(),
    ));
    let refunds = Arc::new(RefundProcessor::new(
        db_pool.clone(),
        payment_repo.clone(),
        account_repo.clone(),
    ));

    // Gateway adapters, each enabled only when fully configured
    let mut registry = GatewayRegistry::new();

    if settings.zarinpal.enabled {
        if let Some(merchant_id) = settings.zarinpal.merchant_id.clone() {
            tracing::info!("Zarinpal gateway enabled");
            registry.register(
                Gateway::Zarinpal,
                Arc::new(ZarinpalGateway::new(
                    &settings.zarinpal,
                    &settings.server,
                    merchant_id,
                    payment_repo.clone(),
                )),
            );
        } else {
            tracing::warn!("Zarinpal enabled but missing merchant_id");
        }
    } else {
        tracing::info!("Zarinpal gateway disabled");
    }

    if settings.ton.enabled {
        if let Some(wallet_address) = settings.ton.wallet_address.clone() {
            tracing::info!("TON gateway enabled");
            registry.register(
                Gateway::Ton,
                Arc::new(TonGateway::new(
                    wallet_address,
                    settings.ton.api_base.clone(),
                    payment_repo.clone(),
                )),
            );
        } else {
            tracing::warn!("TON enabled but missing wallet_address");
        }
    } else {
        tracing::info!("TON gateway disabled");
    }

    // Reconciliation sweeper
    let sweeper = Sweeper::new(ledger.clone(), payment_repo.clone(), &settings.sweeper);
    tokio::spawn(sweeper.run());

    // Create the app
    let state = AppState::new(
        ledger,
        refunds,
        Arc::new(registry),
        payment_repo,
        Arc::new(settings.clone()),
    );
    let app = api::create_app(state);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", settings.server.host, settings.server.port))
            .await?;

    tracing::info!(
        "Server listening on http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
