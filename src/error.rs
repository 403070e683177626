use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unknown package: {0}")]
    InvalidPackage(String),

    #[error("Gateway {gateway} does not support {currency}")]
    InvalidCurrency { gateway: String, currency: String },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Two different terminal outcomes were claimed for one payment.
    /// Never auto-resolved; requires manual review.
    #[error("Outcome conflict on payment {payment_id}: recorded {recorded}, claimed {claimed}")]
    OutcomeConflict {
        payment_id: String,
        recorded: String,
        claimed: String,
    },

    #[error("Insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: i64, required: i64 },

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string())
            }
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidPackage(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::InvalidCurrency { .. } => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::InvalidTransition(ref msg) => (StatusCode::CONFLICT, msg.clone()),
            // Already logged where it was detected; the ledger halts
            // automatic processing and the response asks for review.
            AppError::OutcomeConflict { .. } => (StatusCode::CONFLICT, self.to_string()),
            AppError::InsufficientBalance { .. } => (StatusCode::PAYMENT_REQUIRED, self.to_string()),
            AppError::GatewayUnavailable(ref msg) => {
                tracing::warn!("Gateway unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Payment gateway unavailable".to_string())
            }
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
