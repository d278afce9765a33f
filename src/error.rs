use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Insufficient wallet balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status used both by `IntoResponse` and by handlers that wrap
    /// errors into `{success: false, error}` envelopes.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::InvalidSignature => StatusCode::BAD_REQUEST,
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Ledger(_)
            | AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match &self {
            AppError::Validation(msg) => ("Validation failed", Some(msg.clone())),
            AppError::NotFound(msg) => ("Not found", Some(msg.clone())),
            AppError::InvalidState(msg) => ("Invalid state", Some(msg.clone())),
            AppError::Gateway(msg) => {
                tracing::error!("Gateway error: {}", msg);
                ("Gateway error", Some(msg.clone()))
            }
            AppError::InvalidSignature => ("Invalid webhook signature", None),
            AppError::InsufficientBalance { .. } => {
                ("Insufficient wallet balance", Some(self.to_string()))
            }
            AppError::Ledger(msg) => {
                tracing::error!("Ledger error: {}", msg);
                ("Internal server error", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ("Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                ("Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                ("Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Shorthand for turning `Ok(None)` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}

impl<T> OptionExt<T> for Result<Option<T>> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self?.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}

/// Common error message constants, kept in one place so services and
/// handlers produce consistent text.
pub mod msg {
    pub const PAYMENT_NOT_FOUND: &str = "Payment not found";
    pub const SUBSCRIPTION_NOT_FOUND: &str = "Subscription not found";
    pub const WALLET_NOT_FOUND: &str = "Wallet not found";
    pub const GATEWAY_NOT_CONFIGURED: &str = "Payment gateway not configured";
    pub const PAYMENT_NOT_COMPLETED: &str = "Payment is not in completed state";
    pub const PAYMENT_MISSING_GATEWAY_ID: &str = "Payment has no gateway payment id";
    pub const SUBSCRIPTION_ALREADY_ACTIVE: &str =
        "An active subscription already exists for this student and course";
    pub const SUBSCRIPTION_NOT_ACTIVE: &str = "Subscription is not active";
    pub const SUBSCRIPTION_NOT_PAUSED: &str = "Subscription is not paused";
    pub const SUBSCRIPTION_ALREADY_CLOSED: &str = "Subscription is already cancelled or expired";
    pub const INVALID_AMOUNT: &str = "Amount must be greater than zero";
    pub const AMOUNT_OVERFLOW: &str = "Amount is too large to convert to minor units";
    pub const INVALID_CURRENCY: &str = "Currency must be a 3-letter code";
    pub const INVALID_STUDENT_ID: &str = "Student id must not be empty";
    pub const INVALID_REFUND_AMOUNT: &str = "Refund amount exceeds refundable balance";
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature header format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature header";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
}
