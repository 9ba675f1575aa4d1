//! HTTP API tests for the storefront routes: order intake, the payment
//! initiation guards, PayPal capture and the client-side card confirmation.
//!
//! Everything here stays in-process. Paths whose happy case would call out
//! to a provider are exercised up to the guard that would reject them, or
//! where reconciliation short-circuits before the network.

mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use serde_json::json;
use tower::ServiceExt;

fn app(state: &AppState) -> Router {
    grundbuch_backend::handlers::router().with_state(state.clone())
}

/// The sample order as the storefront submits it over the wire.
fn order_payload() -> serde_json::Value {
    json!({
        "email": "max.mustermann@example.de",
        "phone": "+49 170 1234567",
        "first_name": "Max",
        "last_name": "Mustermann",
        "street": "Musterstraße",
        "house_number": "12a",
        "postal_code": "10115",
        "city": "Berlin",
        "sheet_number": "1234",
        "field_parcel_number": "Flur 5, Flurstück 123/4",
        "district": "Mitte",
        "selected_documents": [
            { "id": "grundbuchauszug", "name": "Grundbuchauszug (unbeglaubigt)", "price": 29.90 },
            { "id": "liegenschaftskarte", "name": "Liegenschaftskarte", "price": 24.90 }
        ],
        "certified_grundbuchauszug": true,
        "owner_proof_liegenschaftskarte": false,
        "document_purpose": "kauf",
        "legal_interest": "kaufinteresse",
        "signature_data": "data:image/png;base64,iVBORw0KGgo=",
        "total_amount": 54.80
    })
}

async fn post_json(
    state: &AppState,
    uri: &str,
    payload: &serde_json::Value,
) -> axum::response::Response {
    app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(payload).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(state: &AppState, uri: &str) -> axum::response::Response {
    app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).expect("response body should be JSON")
}

/// POST the sample order and return its id.
async fn create_order_http(state: &AppState) -> String {
    let response = post_json(state, "/orders", &order_payload()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    body["id"].as_str().expect("id should be a string").to_string()
}

// ============ Health ============

#[tokio::test]
async fn test_health_endpoint() {
    let state = create_test_app_state();

    let response = get(&state, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
}

// ============ Order Intake ============

#[tokio::test]
async fn test_create_order_returns_id() {
    let state = create_test_app_state();

    let id = create_order_http(&state).await;

    assert!(
        uuid::Uuid::parse_str(&id).is_ok(),
        "order id should be a UUID, got {}",
        id
    );
}

#[tokio::test]
async fn test_create_and_fetch_order_wire_format() {
    let state = create_test_app_state();
    let id = create_order_http(&state).await;

    let response = get(&state, &format!("/orders/{}", id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;

    assert_eq!(body["id"], json!(id));
    assert_eq!(body["email"], json!("max.mustermann@example.de"));
    assert_eq!(body["first_name"], json!("Max"));
    assert_eq!(body["street"], json!("Musterstraße"));
    assert_eq!(body["field_parcel_number"], json!("Flur 5, Flurstück 123/4"));
    assert_eq!(body["payment_status"], json!("pending"));

    // Totals travel as euro decimals on the wire, never as cents.
    assert_eq!(body["total_amount"], json!(54.8));
    assert!(body.get("total_amount_cents").is_none());
    assert_eq!(body["selected_documents"][0]["price"], json!(29.9));
    assert_eq!(body["selected_documents"][1]["id"], json!("liegenschaftskarte"));

    // Payment references that do not exist yet are omitted entirely.
    assert!(body.get("payment_provider").is_none());
    assert!(body.get("payment_intent_id").is_none());
    assert!(body.get("paypal_order_id").is_none());
    assert!(body.get("company_name").is_none());

    assert!(body["created_at"].is_i64());
    assert_eq!(body["created_at"], body["updated_at"]);
}

#[tokio::test]
async fn test_create_order_total_mismatch_rejected() {
    let state = create_test_app_state();

    let mut payload = order_payload();
    payload["total_amount"] = json!(54.79);

    let response = post_json(&state, "/orders", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], json!("Bad request"));
}

#[tokio::test]
async fn test_create_order_without_documents_rejected() {
    let state = create_test_app_state();

    let mut payload = order_payload();
    payload["selected_documents"] = json!([]);
    payload["total_amount"] = json!(0.0);

    let response = post_json(&state, "/orders", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_order_missing_field_rejected() {
    let state = create_test_app_state();

    let mut payload = order_payload();
    payload.as_object_mut().unwrap().remove("email");

    let response = post_json(&state, "/orders", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], json!("Bad request"));
}

#[tokio::test]
async fn test_create_order_malformed_json_rejected() {
    let state = create_test_app_state();

    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], json!("Bad request"));
}

#[tokio::test]
async fn test_get_order_not_found() {
    let state = create_test_app_state();

    let response = get(&state, "/orders/00000000-0000-0000-0000-000000000000").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["error"], json!("Not found"));
    assert_eq!(body["details"], json!("Bestellung nicht gefunden"));
}

// ============ Payment Initiation Guards ============

#[tokio::test]
async fn test_create_payment_intent_unknown_order() {
    let state = create_test_app_state();

    let payload = json!({ "amount": 54.80, "orderId": "does-not-exist" });
    let response = post_json(&state, "/create-payment-intent", &payload).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["details"], json!("Bestellung nicht gefunden"));
}

#[tokio::test]
async fn test_create_payment_intent_amount_mismatch() {
    let state = create_test_app_state();
    let id = create_order_http(&state).await;

    let payload = json!({ "amount": 10.00, "orderId": id });
    let response = post_json(&state, "/create-payment-intent", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(
        body["details"],
        json!("Der Zahlungsbetrag stimmt nicht mit dem Bestellbetrag überein")
    );

    // The guard fires before any attempt is claimed.
    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, &id)
        .expect("query failed")
        .expect("order should exist");
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_create_payment_intent_already_paid() {
    let state = create_test_app_state();

    let order_id;
    {
        let conn = state.db.get().unwrap();
        let order = create_order_with_stripe_intent(&conn, "pi_paid");
        queries::record_payment_success(&conn, &order.id, &PayerIdentity::default())
            .expect("success should apply");
        order_id = order.id;
    }

    let payload = json!({ "amount": 54.80, "orderId": order_id });
    let response = post_json(&state, "/create-payment-intent", &payload).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["details"], json!("Diese Bestellung wurde bereits bezahlt"));
}

#[tokio::test]
async fn test_create_paypal_order_unknown_order() {
    let state = create_test_app_state();

    let payload = json!({ "amount": 54.80, "orderId": "does-not-exist" });
    let response = post_json(&state, "/create-paypal-order", &payload).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_paypal_order_amount_mismatch() {
    let state = create_test_app_state();
    let id = create_order_http(&state).await;

    let payload = json!({ "amount": 54.79, "orderId": id });
    let response = post_json(&state, "/create-paypal-order", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_paypal_order_already_paid() {
    let state = create_test_app_state();

    let order_id;
    {
        let conn = state.db.get().unwrap();
        let order = create_order_with_paypal_order(&conn, "5O190127TN364715T");
        queries::record_payment_success(&conn, &order.id, &PayerIdentity::default())
            .expect("success should apply");
        order_id = order.id;
    }

    let payload = json!({ "amount": 54.80, "orderId": order_id });
    let response = post_json(&state, "/create-paypal-order", &payload).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_payment_endpoints_use_camel_case() {
    // snake_case keys are the order API's dialect, not the payment one.
    let state = create_test_app_state();
    let id = create_order_http(&state).await;

    let payload = json!({ "amount": 54.80, "order_id": id });
    let response = post_json(&state, "/create-payment-intent", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============ PayPal Capture Guards ============

#[tokio::test]
async fn test_capture_unknown_order() {
    let state = create_test_app_state();

    let payload = json!({
        "orderId": "does-not-exist",
        "paypalOrderId": "5O190127TN364715T"
    });
    let response = post_json(&state, "/capture-paypal-order", &payload).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_capture_reference_mismatch() {
    let state = create_test_app_state();

    let order_id;
    {
        let conn = state.db.get().unwrap();
        order_id = create_order_with_paypal_order(&conn, "5O190127TN364715T").id;
    }

    let payload = json!({
        "orderId": order_id,
        "paypalOrderId": "1AB23456CD789012E"
    });
    let response = post_json(&state, "/capture-paypal-order", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(
        body["details"],
        json!("Die Zahlungsreferenz gehört nicht zu dieser Bestellung")
    );

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, &order_id)
        .expect("query failed")
        .expect("order should exist");
    assert_eq!(order.payment_status, PaymentStatus::Processing);
}

#[tokio::test]
async fn test_capture_without_paypal_attempt() {
    // Order was never initiated with PayPal; any submitted reference is
    // foreign to it.
    let state = create_test_app_state();
    let id = create_order_http(&state).await;

    let payload = json!({
        "orderId": id,
        "paypalOrderId": "5O190127TN364715T"
    });
    let response = post_json(&state, "/capture-paypal-order", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capture_already_paid_short_circuits() {
    // The webhook settled the order first; the storefront's capture call
    // must come back COMPLETED without going to PayPal again.
    let state = create_test_app_state();

    let order_id;
    {
        let conn = state.db.get().unwrap();
        let order = create_order_with_paypal_order(&conn, "5O190127TN364715T");
        queries::record_payment_success(
            &conn,
            &order.id,
            &PayerIdentity::paypal_payer(Some("PAYER123".to_string())),
        )
        .expect("success should apply");
        order_id = order.id;
    }

    let payload = json!({
        "orderId": order_id,
        "paypalOrderId": "5O190127TN364715T"
    });
    let response = post_json(&state, "/capture-paypal-order", &payload).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], json!("COMPLETED"));
    assert_eq!(
        body["payerId"],
        json!("PAYER123"),
        "stored payer id should be echoed back"
    );

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, &order_id)
        .expect("query failed")
        .expect("order should exist");
    assert_eq!(order.payment_status, PaymentStatus::Succeeded);
    assert_eq!(order.paypal_payer_id, Some("PAYER123".to_string()));
}

// ============ Client-Side Card Confirmation ============

#[tokio::test]
async fn test_confirm_payment_succeeds() {
    let state = create_test_app_state();

    let order_id;
    {
        let conn = state.db.get().unwrap();
        order_id = create_order_with_stripe_intent(&conn, "pi_confirm").id;
    }

    let payload = json!({ "orderId": order_id, "paymentIntentId": "pi_confirm" });
    let response = post_json(&state, "/payment-confirmation", &payload).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], json!("succeeded"));

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, &order_id)
        .expect("query failed")
        .expect("order should exist");
    assert_eq!(order.payment_status, PaymentStatus::Succeeded);
}

#[tokio::test]
async fn test_confirm_payment_idempotent() {
    let state = create_test_app_state();

    let order_id;
    {
        let conn = state.db.get().unwrap();
        order_id = create_order_with_stripe_intent(&conn, "pi_confirm").id;
    }

    let payload = json!({ "orderId": order_id, "paymentIntentId": "pi_confirm" });

    let first = post_json(&state, "/payment-confirmation", &payload).await;
    assert_eq!(first.status(), StatusCode::OK);

    // The redirect page reloads and reports again.
    let second = post_json(&state, "/payment-confirmation", &payload).await;
    assert_eq!(second.status(), StatusCode::OK);
    let body = response_json(second).await;
    assert_eq!(body["status"], json!("succeeded"));
}

#[tokio::test]
async fn test_confirm_payment_unknown_order() {
    let state = create_test_app_state();

    let payload = json!({ "orderId": "does-not-exist", "paymentIntentId": "pi_x" });
    let response = post_json(&state, "/payment-confirmation", &payload).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_confirm_payment_intent_mismatch() {
    let state = create_test_app_state();

    let order_id;
    {
        let conn = state.db.get().unwrap();
        order_id = create_order_with_stripe_intent(&conn, "pi_confirm").id;
    }

    let payload = json!({ "orderId": order_id, "paymentIntentId": "pi_someone_elses" });
    let response = post_json(&state, "/payment-confirmation", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(
        body["details"],
        json!("Die Zahlungsreferenz gehört nicht zu dieser Bestellung")
    );

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, &order_id)
        .expect("query failed")
        .expect("order should exist");
    assert_eq!(order.payment_status, PaymentStatus::Processing);
}

#[tokio::test]
async fn test_confirm_payment_cannot_target_paypal_attempt() {
    // An order initiated with PayPal has no pinned card intent; a card
    // confirmation for it is always foreign.
    let state = create_test_app_state();

    let order_id;
    {
        let conn = state.db.get().unwrap();
        order_id = create_order_with_paypal_order(&conn, "5O190127TN364715T").id;
    }

    let payload = json!({ "orderId": order_id, "paymentIntentId": "pi_anything" });
    let response = post_json(&state, "/payment-confirmation", &payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_payment_refused_after_failure() {
    let state = create_test_app_state();

    let order_id;
    {
        let conn = state.db.get().unwrap();
        let order = create_order_with_stripe_intent(&conn, "pi_confirm");
        queries::record_payment_failure(&conn, &order.id).expect("failure should apply");
        order_id = order.id;
    }

    // A stale success report arrives after the failure was recorded.
    let payload = json!({ "orderId": order_id, "paymentIntentId": "pi_confirm" });
    let response = post_json(&state, "/payment-confirmation", &payload).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["details"], json!("Die Zahlung konnte nicht bestätigt werden"));

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, &order_id)
        .expect("query failed")
        .expect("order should exist");
    assert_eq!(order.payment_status, PaymentStatus::Failed);
}
