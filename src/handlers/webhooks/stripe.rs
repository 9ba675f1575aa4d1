use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};

use crate::db::AppState;
use crate::models::{PayerIdentity, ProviderPaymentId};
use crate::payments::{StripePaymentIntent, StripeWebhookEvent};

use super::common::{
    PaymentFailureData, PaymentSuccessData, WebhookEvent, WebhookProvider, WebhookResult,
    ack_response, handle_webhook,
};

/// Stripe webhook provider implementation.
pub struct StripeWebhookProvider;

impl WebhookProvider for StripeWebhookProvider {
    fn provider_name(&self) -> &'static str {
        "stripe"
    }

    async fn verify(
        &self,
        state: &AppState,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<bool, WebhookResult> {
        let signature = headers
            .get("stripe-signature")
            .ok_or((StatusCode::BAD_REQUEST, "Missing stripe-signature header"))?
            .to_str()
            .map_err(|e| {
                tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid signature header")
            })?;

        state
            .stripe
            .verify_webhook_signature(body, signature)
            .map_err(|e| {
                tracing::warn!("Stripe signature verification failed: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid signature format")
            })
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: StripeWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        match event.event_type.as_str() {
            "payment_intent.succeeded" => parse_intent_succeeded(event),
            "payment_intent.payment_failed" => parse_intent_failed(event),
            _ => Ok(WebhookEvent::Ignored),
        }
    }
}

fn parse_intent(event: &StripeWebhookEvent) -> Result<StripePaymentIntent, WebhookResult> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::error!("Failed to parse payment intent: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid payment intent")
    })
}

fn parse_intent_succeeded(event: StripeWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let intent = parse_intent(&event)?;

    Ok(WebhookEvent::PaymentSucceeded(PaymentSuccessData {
        event_id: event.id,
        payment: ProviderPaymentId::StripeIntent(intent.id),
        payer: PayerIdentity::stripe_customer(intent.customer),
    }))
}

fn parse_intent_failed(event: StripeWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let intent = parse_intent(&event)?;
    let reason = intent.last_payment_error.and_then(|e| e.message);

    Ok(WebhookEvent::PaymentFailed(PaymentFailureData {
        event_id: event.id,
        payment: ProviderPaymentId::StripeIntent(intent.id),
        reason,
    }))
}

/// Axum handler for Stripe webhooks.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    ack_response(handle_webhook(&StripeWebhookProvider, &state, headers, body).await)
}
