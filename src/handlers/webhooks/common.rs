//! Common webhook handling infrastructure for payment providers.
//!
//! This module provides a trait-based approach to unify Stripe and PayPal
//! webhook handlers, reducing code duplication while preserving
//! provider-specific logic.
//!
//! Verification order matters here: a delivery proves it is authentic before
//! anything in its body is parsed or looked up. Once a delivery is verified,
//! the provider is answered with 200 even when we decide not to apply the
//! event, so it does not retry deliveries that were consciously skipped.

use std::future::Future;

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::{Order, PayerIdentity, ProviderPaymentId, TransitionOutcome};

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, &'static str);

/// Helper to check out a pooled connection with consistent error handling.
fn db_connection(state: &AppState) -> Result<crate::db::PooledConn, WebhookResult> {
    state.db.get().map_err(|e| {
        tracing::error!("DB connection error: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })
}

/// Order lookup with a warning log on unknown payment references.
///
/// An unknown reference is acknowledged with 200: it usually means a stale
/// event for an attempt the customer abandoned and restarted, and retrying
/// the delivery would never change that.
fn lookup_order_by_payment<P: WebhookProvider>(
    provider: &P,
    conn: &Connection,
    key: &ProviderPaymentId,
) -> Result<Order, WebhookResult> {
    match queries::get_order_by_provider_payment(conn, key) {
        Ok(Some(order)) => Ok(order),
        Ok(None) => {
            tracing::warn!(
                "No order found for {} payment reference: {}",
                provider.provider_name(),
                key.as_str()
            );
            Err((StatusCode::OK, "Order not found for payment reference"))
        }
        Err(e) => {
            tracing::error!("DB error: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Database error"))
        }
    }
}

/// Data extracted from a payment success event.
#[derive(Debug)]
pub struct PaymentSuccessData {
    /// Provider's unique event id for replay prevention
    pub event_id: String,
    /// Provider-side payment identifier the order was initiated with
    pub payment: ProviderPaymentId,
    /// Payer identity captured by the provider, stored on success
    pub payer: PayerIdentity,
}

/// Data extracted from a payment failure event.
#[derive(Debug)]
pub struct PaymentFailureData {
    /// Provider's unique event id for replay prevention
    pub event_id: String,
    /// Provider-side payment identifier the order was initiated with
    pub payment: ProviderPaymentId,
    /// Failure reason reported by the provider, if any
    pub reason: Option<String>,
}

/// Parsed webhook event with provider-agnostic data.
#[derive(Debug)]
pub enum WebhookEvent {
    /// Payment completed - order moves to `succeeded`
    PaymentSucceeded(PaymentSuccessData),
    /// Payment failed or was denied - order moves to `failed`
    PaymentFailed(PaymentFailureData),
    /// Event type not relevant to order reconciliation
    Ignored,
}

/// Trait for payment provider webhook handling.
///
/// Implementors provide provider-specific verification and parsing, while
/// the common processing logic handles order state reconciliation.
pub trait WebhookProvider: Send + Sync {
    /// Provider name for logging and database storage (e.g., "stripe", "paypal")
    fn provider_name(&self) -> &'static str;

    /// Verify that this delivery really came from the provider.
    ///
    /// Stripe checks an HMAC locally; PayPal calls its verification API,
    /// hence the async signature.
    fn verify(
        &self,
        state: &AppState,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> impl Future<Output = Result<bool, WebhookResult>> + Send;

    /// Parse the webhook payload into a provider-agnostic event.
    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult>;
}

/// Result of atomically applying one event.
pub enum EventApplication {
    /// New event; the transition outcome says what it did to the order
    Processed(TransitionOutcome),
    /// Event id was seen before - acknowledged without touching the order
    Duplicate,
}

/// Applies a payment event ATOMICALLY - replay prevention and the status
/// transition happen in a single database transaction.
///
/// If the transition fails the event claim is rolled back too, so the
/// provider's retry gets to run the whole thing again.
pub fn apply_event_atomic(
    conn: &mut Connection,
    provider: &str,
    event_id: &str,
    apply: impl FnOnce(&Connection) -> Result<TransitionOutcome, AppError>,
) -> Result<EventApplication, WebhookResult> {
    let tx = conn.transaction().map_err(|e| {
        tracing::error!("Failed to start transaction: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    match queries::try_record_webhook_event(&tx, provider, event_id) {
        Ok(true) => {
            // New event - proceed with processing
        }
        Ok(false) => {
            // Already processed - no need to commit, just return
            return Ok(EventApplication::Duplicate);
        }
        Err(e) => {
            tracing::error!("Failed to record webhook event: {}", e);
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "Database error"));
        }
    }

    let outcome = match apply(&tx) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!("Failed to apply payment event: {}", e);
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "Database error"));
        }
    };

    tx.commit().map_err(|e| {
        tracing::error!("Failed to commit webhook transaction: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    Ok(EventApplication::Processed(outcome))
}

/// Generic webhook handler that delegates to provider-specific implementations.
pub async fn handle_webhook<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    // Hard gate: nothing in the body is trusted before this passes.
    match provider.verify(state, &headers, &body).await {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(e) => return e,
    }

    let event = match provider.parse_event(&body) {
        Ok(e) => e,
        Err(e) => return e,
    };

    match event {
        WebhookEvent::PaymentSucceeded(data) => {
            handle_payment_succeeded(provider, state, data).unwrap_or_else(|e| e)
        }
        WebhookEvent::PaymentFailed(data) => {
            handle_payment_failed(provider, state, data).unwrap_or_else(|e| e)
        }
        WebhookEvent::Ignored => (StatusCode::OK, "Event ignored"),
    }
}

fn handle_payment_succeeded<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    data: PaymentSuccessData,
) -> Result<WebhookResult, WebhookResult> {
    let mut conn = db_connection(state)?;
    let order = lookup_order_by_payment(provider, &conn, &data.payment)?;

    let application = apply_event_atomic(
        &mut conn,
        provider.provider_name(),
        &data.event_id,
        |tx| queries::record_payment_success(tx, &order.id, &data.payer),
    )?;

    match application {
        EventApplication::Duplicate => Ok((StatusCode::OK, "Already processed")),
        EventApplication::Processed(TransitionOutcome::Applied) => {
            tracing::info!(
                "{} payment succeeded: order={}, payment={}",
                provider.provider_name(),
                order.id,
                data.payment.as_str()
            );
            Ok((StatusCode::OK, "OK"))
        }
        EventApplication::Processed(TransitionOutcome::AlreadyApplied) => {
            Ok((StatusCode::OK, "Already succeeded"))
        }
        EventApplication::Processed(TransitionOutcome::Refused { current }) => {
            tracing::warn!(
                "{} success event not applied: order={} is {}",
                provider.provider_name(),
                order.id,
                current.as_ref()
            );
            Ok((StatusCode::OK, "Not applied"))
        }
    }
}

fn handle_payment_failed<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    data: PaymentFailureData,
) -> Result<WebhookResult, WebhookResult> {
    let mut conn = db_connection(state)?;
    let order = lookup_order_by_payment(provider, &conn, &data.payment)?;

    let application = apply_event_atomic(
        &mut conn,
        provider.provider_name(),
        &data.event_id,
        |tx| queries::record_payment_failure(tx, &order.id),
    )?;

    match application {
        EventApplication::Duplicate => Ok((StatusCode::OK, "Already processed")),
        EventApplication::Processed(TransitionOutcome::Applied) => {
            tracing::info!(
                "{} payment failed: order={}, payment={}, reason={:?}",
                provider.provider_name(),
                order.id,
                data.payment.as_str(),
                data.reason
            );
            Ok((StatusCode::OK, "OK"))
        }
        EventApplication::Processed(TransitionOutcome::AlreadyApplied) => {
            Ok((StatusCode::OK, "Already failed"))
        }
        EventApplication::Processed(TransitionOutcome::Refused { current }) => {
            // A paid order is never downgraded by a late failure event.
            tracing::warn!(
                "{} failure event not applied: order={} is {}",
                provider.provider_name(),
                order.id,
                current.as_ref()
            );
            Ok((StatusCode::OK, "Not applied"))
        }
    }
}

/// Converts the internal result into the JSON body providers expect:
/// a 2xx acknowledges with `received: true`, everything else reports why.
pub fn ack_response(result: WebhookResult) -> Response {
    let (status, detail) = result;
    let body = if status.is_success() {
        serde_json::json!({ "received": true })
    } else {
        serde_json::json!({ "error": detail })
    };
    (status, axum::Json(body)).into_response()
}
