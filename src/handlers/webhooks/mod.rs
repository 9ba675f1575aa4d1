pub mod common;
pub mod paypal;
pub mod stripe;

pub use paypal::handle_paypal_webhook;
pub use stripe::handle_stripe_webhook;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/stripe", post(handle_stripe_webhook))
        .route("/webhook/paypal", post(handle_paypal_webhook))
}
