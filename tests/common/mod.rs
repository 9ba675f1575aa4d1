//! Test utilities and fixtures for the order backend integration tests

#![allow(dead_code)]

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use grundbuch_backend::db::{AppState, init_db, queries};
pub use grundbuch_backend::models::*;
use grundbuch_backend::payments::{PaypalClient, PaypalEnv, StripeClient};

/// Webhook secret baked into the test Stripe client; signature helpers in
/// the test files sign with this.
pub const TEST_STRIPE_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// The standard storefront selection: Grundbuchauszug plus
/// Liegenschaftskarte, 54.80 EUR total.
pub fn sample_documents() -> Vec<SelectedDocument> {
    vec![
        SelectedDocument {
            id: "grundbuchauszug".to_string(),
            name: "Grundbuchauszug (unbeglaubigt)".to_string(),
            price: 29.90,
        },
        SelectedDocument {
            id: "liegenschaftskarte".to_string(),
            name: "Liegenschaftskarte".to_string(),
            price: 24.90,
        },
    ]
}

/// A complete order payload the way the storefront form submits it.
pub fn sample_create_order() -> CreateOrder {
    CreateOrder {
        email: "max.mustermann@example.de".to_string(),
        phone: Some("+49 170 1234567".to_string()),
        first_name: "Max".to_string(),
        last_name: "Mustermann".to_string(),
        company_name: None,
        street: "Musterstraße".to_string(),
        house_number: "12a".to_string(),
        postal_code: "10115".to_string(),
        city: "Berlin".to_string(),
        sheet_number: Some("1234".to_string()),
        field_parcel_number: Some("Flur 5, Flurstück 123/4".to_string()),
        district: Some("Mitte".to_string()),
        selected_documents: sample_documents(),
        certified_grundbuchauszug: true,
        owner_proof_liegenschaftskarte: false,
        document_purpose: "kauf".to_string(),
        other_purpose_reason: None,
        legal_interest: "kaufinteresse".to_string(),
        other_interest_reason: None,
        signature_data: Some("data:image/png;base64,iVBORw0KGgo=".to_string()),
        total_amount: 54.80,
    }
}

/// Insert a pending test order with the standard document selection.
pub fn create_test_order(conn: &Connection) -> Order {
    queries::create_order(conn, &sample_create_order()).expect("Failed to create test order")
}

/// Insert an order already in `processing` with a Stripe intent attached,
/// the state an order is in while the customer sits in the card form.
pub fn create_order_with_stripe_intent(conn: &Connection, intent_id: &str) -> Order {
    let order = create_test_order(conn);
    queries::begin_payment_attempt(conn, &order.id, PaymentProvider::Stripe)
        .expect("Failed to begin payment attempt");
    queries::attach_provider_payment(
        conn,
        &order.id,
        &ProviderPaymentId::StripeIntent(intent_id.to_string()),
    )
    .expect("Failed to attach payment intent");
    queries::get_order(conn, &order.id)
        .expect("query failed")
        .expect("order should exist")
}

/// Insert an order already in `processing` with a PayPal order attached.
pub fn create_order_with_paypal_order(conn: &Connection, paypal_order_id: &str) -> Order {
    let order = create_test_order(conn);
    queries::begin_payment_attempt(conn, &order.id, PaymentProvider::Paypal)
        .expect("Failed to begin payment attempt");
    queries::attach_provider_payment(
        conn,
        &order.id,
        &ProviderPaymentId::PaypalOrder(paypal_order_id.to_string()),
    )
    .expect("Failed to attach PayPal order");
    queries::get_order(conn, &order.id)
        .expect("query failed")
        .expect("order should exist")
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Create an AppState for testing with an in-memory database.
///
/// The provider clients carry test credentials. Only flows that never leave
/// the process are reachable in tests: Stripe's HMAC verification, payload
/// parsing, and every database path. PayPal verification needs its live API
/// and is exercised through the parse and store layers instead.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(4).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        stripe: StripeClient::new("sk_test_xxx", TEST_STRIPE_WEBHOOK_SECRET),
        paypal: PaypalClient::new(
            "test_client_id",
            "test_client_secret",
            "test_webhook_id",
            PaypalEnv::Sandbox,
        ),
    }
}
