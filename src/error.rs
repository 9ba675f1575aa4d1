use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message constants shared between handlers and error mapping.
///
/// Client-facing messages are German (the storefront is German-language);
/// everything that only reaches logs stays English.
pub mod msg {
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid webhook signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in webhook signature";
    pub const INVALID_WEBHOOK_SECRET: &str = "Webhook secret is not a valid HMAC key";

    pub const ORDER_NOT_FOUND: &str = "Bestellung nicht gefunden";
    pub const ORDER_ALREADY_PAID: &str = "Diese Bestellung wurde bereits bezahlt";
    pub const PAYMENT_REFERENCE_MISMATCH: &str =
        "Die Zahlungsreferenz gehört nicht zu dieser Bestellung";
    pub const CONFIRMATION_REFUSED: &str = "Die Zahlung konnte nicht bestätigt werden";
    pub const AMOUNT_MISMATCH: &str =
        "Der Zahlungsbetrag stimmt nicht mit dem Bestellbetrag überein";
    pub const PAYMENT_INIT_FAILED: &str = "Fehler beim Erstellen der Zahlung";
    pub const CAPTURE_FAILED: &str = "Die Zahlung konnte nicht abgeschlossen werden";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Provider credential acquisition failed (OAuth token endpoint).
    #[error("Provider auth error: {0}")]
    ProviderAuth(String),

    /// Provider rejected or failed a create call.
    #[error("Provider request error: {0}")]
    ProviderRequest(String),

    /// Provider rejected or failed a capture call.
    #[error("Provider capture error: {0}")]
    ProviderCapture(String),

    /// Any failure between claiming a payment attempt and pinning the
    /// provider reference; the order was moved to `failed` on the way out.
    #[error("Payment initiation error: {0}")]
    PaymentInitiation(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Provider errors carry upstream response bodies; those are logged
        // server-side and never forwarded to the browser.
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::ProviderAuth(e) => {
                tracing::error!("Provider auth error: {}", e);
                (StatusCode::BAD_GATEWAY, "Payment provider error", None)
            }
            AppError::ProviderRequest(e) => {
                tracing::error!("Provider request error: {}", e);
                (StatusCode::BAD_GATEWAY, "Payment provider error", None)
            }
            AppError::ProviderCapture(e) => {
                tracing::error!("Provider capture error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Payment provider error",
                    Some(msg::CAPTURE_FAILED.to_string()),
                )
            }
            AppError::PaymentInitiation(e) => {
                tracing::error!("Payment initiation error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Payment initiation failed",
                    Some(msg::PAYMENT_INIT_FAILED.to_string()),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Extension for `Option` lookups that should 404 when empty.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}
