use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};

use crate::db::AppState;
use crate::models::{PayerIdentity, ProviderPaymentId};
use crate::payments::{PaypalCaptureResource, PaypalTransmission, PaypalWebhookEvent};

use super::common::{
    PaymentFailureData, PaymentSuccessData, WebhookEvent, WebhookProvider, WebhookResult,
    ack_response, handle_webhook,
};

/// PayPal webhook provider implementation.
pub struct PaypalWebhookProvider;

fn transmission_header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<&'a str, WebhookResult> {
    headers
        .get(name)
        .ok_or((StatusCode::BAD_REQUEST, "Missing PayPal transmission header"))?
        .to_str()
        .map_err(|e| {
            tracing::debug!("Invalid UTF-8 in PayPal header {}: {}", name, e);
            (StatusCode::BAD_REQUEST, "Invalid PayPal transmission header")
        })
}

impl WebhookProvider for PaypalWebhookProvider {
    fn provider_name(&self) -> &'static str {
        "paypal"
    }

    async fn verify(
        &self,
        state: &AppState,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<bool, WebhookResult> {
        let transmission = PaypalTransmission {
            transmission_id: transmission_header(headers, "paypal-transmission-id")?,
            transmission_time: transmission_header(headers, "paypal-transmission-time")?,
            transmission_sig: transmission_header(headers, "paypal-transmission-sig")?,
            cert_url: transmission_header(headers, "paypal-cert-url")?,
            auth_algo: transmission_header(headers, "paypal-auth-algo")?,
        };

        // The verification API wants the event body exactly as delivered.
        let event_body: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse PayPal webhook body: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        state
            .paypal
            .verify_webhook_signature(&transmission, &event_body)
            .await
            .map_err(|e| {
                // 5xx so PayPal retries once its verification API is reachable again.
                tracing::error!("PayPal signature verification error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Signature verification failed",
                )
            })
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: PaypalWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse PayPal webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => parse_capture_completed(event),
            "PAYMENT.CAPTURE.DENIED" => parse_capture_denied(event),
            other => {
                // Includes PAYMENT.CAPTURE.PENDING; only settled capture
                // outcomes act on the order.
                tracing::debug!("Ignoring PayPal event type: {}", other);
                Ok(WebhookEvent::Ignored)
            }
        }
    }
}

fn parse_capture(event: &PaypalWebhookEvent) -> Result<PaypalCaptureResource, WebhookResult> {
    serde_json::from_value(event.resource.clone()).map_err(|e| {
        tracing::error!("Failed to parse capture resource: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid capture resource")
    })
}

fn parse_capture_completed(event: PaypalWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let resource = parse_capture(&event)?;

    // Capture events do not carry payer details; whatever the capture
    // endpoint stored is kept as-is.
    Ok(WebhookEvent::PaymentSucceeded(PaymentSuccessData {
        payment: ProviderPaymentId::PaypalOrder(resource.checkout_order_id().to_string()),
        event_id: event.id,
        payer: PayerIdentity::default(),
    }))
}

fn parse_capture_denied(event: PaypalWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let resource = parse_capture(&event)?;

    Ok(WebhookEvent::PaymentFailed(PaymentFailureData {
        payment: ProviderPaymentId::PaypalOrder(resource.checkout_order_id().to_string()),
        event_id: event.id,
        reason: resource.status,
    }))
}

/// Axum handler for PayPal webhooks.
pub async fn handle_paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    ack_response(handle_webhook(&PaypalWebhookProvider, &state, headers, body).await)
}
