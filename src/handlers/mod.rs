pub mod orders;
pub mod payments;
pub mod webhooks;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Storefront-facing routes. Webhooks mount separately via
/// [`webhooks::router`].
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/orders", post(orders::create_order))
        .route("/orders/{id}", get(orders::get_order))
        .route(
            "/create-payment-intent",
            post(payments::create_payment_intent),
        )
        .route("/create-paypal-order", post(payments::create_paypal_order))
        .route(
            "/capture-paypal-order",
            post(payments::capture_paypal_order),
        )
        .route("/payment-confirmation", post(payments::confirm_payment))
}
