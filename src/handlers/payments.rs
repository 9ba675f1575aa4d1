//! Payment initiation, capture and client-side confirmation.
//!
//! These endpoints speak the storefront's wire format (camelCase, euro
//! amounts as decimal numbers); everything stored goes through the cent
//! representation on the order.

use axum::extract::State;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::models::{
    PayerIdentity, PaymentProvider, PaymentStatus, ProviderPaymentId, TransitionOutcome,
    euros_to_cents,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    /// Amount in euros as shown to the customer; must match the stored total
    pub amount: f64,
    pub order_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaypalOrderRequest {
    /// Amount in euros as shown to the customer; must match the stored total
    pub amount: f64,
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePaypalOrderResponse {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePaypalOrderRequest {
    pub order_id: String,
    pub paypal_order_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    /// PayPal capture status; "COMPLETED" is the one the storefront acts on
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub order_id: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmPaymentResponse {
    pub status: &'static str,
}

/// Checks the submitted euro amount against the stored order total.
///
/// The client-sent amount is display data; the stored total is what gets
/// charged. A mismatch means a stale or tampered checkout page.
fn check_amount(submitted_euros: f64, total_amount_cents: i64) -> Result<()> {
    if euros_to_cents(submitted_euros) != total_amount_cents {
        return Err(AppError::BadRequest(msg::AMOUNT_MISMATCH.into()));
    }
    Ok(())
}

/// Moves the order into `processing` for a fresh attempt with `provider`.
/// Refusal means a concurrent path already recorded success.
fn claim_attempt(conn: &Connection, order_id: &str, provider: PaymentProvider) -> Result<()> {
    match queries::begin_payment_attempt(conn, order_id, provider)? {
        TransitionOutcome::Refused { .. } => {
            Err(AppError::Conflict(msg::ORDER_ALREADY_PAID.into()))
        }
        _ => Ok(()),
    }
}

/// Best-effort transition to `failed` after a provider call broke
/// mid-initiation. Never downgrades a success that raced in.
fn mark_attempt_failed(conn: &Connection, order_id: &str) {
    if let Err(e) = queries::record_payment_failure(conn, order_id) {
        tracing::error!("Failed to mark order {} as failed: {}", order_id, e);
    }
}

/// POST /create-payment-intent
///
/// Starts a card payment: order moves to `processing`, a PaymentIntent is
/// created at Stripe and its id is pinned to the order so webhook and
/// confirmation deliveries can find it. Only the client secret leaves the
/// server.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<CreatePaymentIntentResponse>> {
    let conn = state.db.get()?;

    let order = queries::get_order(&conn, &request.order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;
    if order.payment_status == PaymentStatus::Succeeded {
        return Err(AppError::Conflict(msg::ORDER_ALREADY_PAID.into()));
    }
    check_amount(request.amount, order.total_amount_cents)?;

    claim_attempt(&conn, &order.id, PaymentProvider::Stripe)?;

    let intent = match state
        .stripe
        .create_payment_intent(order.total_amount_cents, &order.id)
        .await
    {
        Ok(intent) => intent,
        Err(e) => {
            mark_attempt_failed(&conn, &order.id);
            return Err(AppError::PaymentInitiation(e.to_string()));
        }
    };

    if let Err(e) = queries::attach_provider_payment(
        &conn,
        &order.id,
        &ProviderPaymentId::StripeIntent(intent.id.clone()),
    ) {
        mark_attempt_failed(&conn, &order.id);
        return Err(AppError::PaymentInitiation(e.to_string()));
    }

    tracing::info!(
        "Stripe payment initiated: order={}, intent={}",
        order.id,
        intent.id
    );

    Ok(Json(CreatePaymentIntentResponse {
        client_secret: intent.client_secret,
    }))
}

/// POST /create-paypal-order
///
/// Same flow as the card path, against PayPal: order moves to `processing`,
/// a PayPal order is created and its id pinned for later capture and
/// webhook lookup.
pub async fn create_paypal_order(
    State(state): State<AppState>,
    Json(request): Json<CreatePaypalOrderRequest>,
) -> Result<Json<CreatePaypalOrderResponse>> {
    let conn = state.db.get()?;

    let order = queries::get_order(&conn, &request.order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;
    if order.payment_status == PaymentStatus::Succeeded {
        return Err(AppError::Conflict(msg::ORDER_ALREADY_PAID.into()));
    }
    check_amount(request.amount, order.total_amount_cents)?;

    claim_attempt(&conn, &order.id, PaymentProvider::Paypal)?;

    let paypal_order = match state
        .paypal
        .create_order(order.total_amount_cents, &order.id)
        .await
    {
        Ok(po) => po,
        Err(e) => {
            mark_attempt_failed(&conn, &order.id);
            return Err(AppError::PaymentInitiation(e.to_string()));
        }
    };

    if let Err(e) = queries::attach_provider_payment(
        &conn,
        &order.id,
        &ProviderPaymentId::PaypalOrder(paypal_order.id.clone()),
    ) {
        mark_attempt_failed(&conn, &order.id);
        return Err(AppError::PaymentInitiation(e.to_string()));
    }

    tracing::info!(
        "PayPal payment initiated: order={}, paypal_order={}",
        order.id,
        paypal_order.id
    );

    Ok(Json(CreatePaypalOrderResponse {
        id: paypal_order.id,
        status: paypal_order.status,
    }))
}

/// POST /capture-paypal-order
///
/// Captures an approved PayPal order and reconciles the result. A repeat
/// call for an already-paid order short-circuits without touching PayPal,
/// so double-clicks and webhook races stay idempotent.
pub async fn capture_paypal_order(
    State(state): State<AppState>,
    Json(request): Json<CapturePaypalOrderRequest>,
) -> Result<Json<CaptureResponse>> {
    let conn = state.db.get()?;

    let order = queries::get_order(&conn, &request.order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;

    // The submitted reference must be the one this order was initiated with.
    if order.paypal_order_id.as_deref() != Some(request.paypal_order_id.as_str()) {
        return Err(AppError::BadRequest(msg::PAYMENT_REFERENCE_MISMATCH.into()));
    }

    if order.payment_status == PaymentStatus::Succeeded {
        return Ok(Json(CaptureResponse {
            status: "COMPLETED".to_string(),
            payer_id: order.paypal_payer_id.clone(),
        }));
    }

    let capture = match state.paypal.capture_order(&request.paypal_order_id).await {
        Ok(c) => c,
        Err(e) => {
            mark_attempt_failed(&conn, &order.id);
            return Err(e);
        }
    };

    if !capture.completed() {
        // e.g. PENDING or DECLINED; the customer can retry from `failed`.
        mark_attempt_failed(&conn, &order.id);
        return Err(AppError::ProviderCapture(format!(
            "PayPal capture not completed: order={}, status={}",
            order.id, capture.status
        )));
    }

    let payer_id = capture.payer_id();
    let payer = PayerIdentity::paypal_payer(payer_id.clone());
    match queries::record_payment_success(&conn, &order.id, &payer)? {
        TransitionOutcome::Applied => {
            tracing::info!(
                "PayPal capture completed: order={}, paypal_order={}",
                order.id,
                request.paypal_order_id
            );
        }
        TransitionOutcome::AlreadyApplied => {
            // Webhook got there first; same outcome either way.
        }
        TransitionOutcome::Refused { current } => {
            tracing::warn!(
                "PayPal capture succeeded but order {} is {}",
                order.id,
                current.as_ref()
            );
        }
    }

    Ok(Json(CaptureResponse {
        status: capture.status,
        payer_id,
    }))
}

/// POST /payment-confirmation
///
/// Client-side fallback for the card flow: after the redirect back from
/// Stripe the storefront reports the intent as succeeded. The submitted
/// intent id must be the one pinned at initiation, and the same
/// no-downgrade rule applies as for webhooks, so a spoofed or stale
/// confirmation cannot overwrite a recorded failure or invent a success
/// for someone else's order.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmPaymentResponse>> {
    let conn = state.db.get()?;

    let order = queries::get_order(&conn, &request.order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;

    if order.payment_intent_id.as_deref() != Some(request.payment_intent_id.as_str()) {
        return Err(AppError::BadRequest(msg::PAYMENT_REFERENCE_MISMATCH.into()));
    }

    match queries::record_payment_success(&conn, &order.id, &PayerIdentity::default())? {
        TransitionOutcome::Applied => {
            tracing::info!(
                "Payment confirmed by client: order={}, intent={}",
                order.id,
                request.payment_intent_id
            );
            Ok(Json(ConfirmPaymentResponse {
                status: "succeeded",
            }))
        }
        TransitionOutcome::AlreadyApplied => Ok(Json(ConfirmPaymentResponse {
            status: "succeeded",
        })),
        TransitionOutcome::Refused { current } => {
            tracing::warn!(
                "Confirmation refused: order={} is {}",
                order.id,
                current.as_ref()
            );
            Err(AppError::Conflict(msg::CONFIRMATION_REFUSED.into()))
        }
    }
}
