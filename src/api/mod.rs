pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        // Authenticated purchase / account routes
        .nest("/api", api_routes())
        // Gateway callbacks
        .nest("/callbacks", callback_routes())
        // Admin routes
        .nest("/admin", admin_routes())
        // Add state to the router
        .with_state(state)
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/purchase", post(handlers::purchases::initiate))
        .route("/purchase/packages", get(handlers::purchases::packages))
        .route("/purchase/history", get(handlers::purchases::history))
        .route("/purchase/:id", get(handlers::purchases::status))
        .route("/account/balance", get(handlers::purchases::balance))
        .route_layer(from_fn(middleware::auth::require_auth))
}

fn callback_routes() -> Router<AppState> {
    Router::new()
        // Provider-facing callback (no auth: the provider redirects the
        // user's browser here, verification is server-side)
        .route("/zarinpal", get(handlers::callbacks::zarinpal))
        // Buyer-facing hash submission - requires the buyer's identity
        .nest(
            "/",
            Router::new()
                .route("/ton", post(handlers::callbacks::ton_verify))
                .route_layer(from_fn(middleware::auth::require_auth)),
        )
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/payments", get(handlers::admin::list_payments))
        .route("/payments/:id/refund", post(handlers::admin::refund))
        .route("/payments/:id/settle", post(handlers::admin::settle))
        .route("/stats", get(handlers::admin::stats))
        .layer(from_fn(middleware::auth::require_admin))
}
