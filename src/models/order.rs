use serde::{Deserialize, Serialize, Serializer};
use strum::{AsRefStr, EnumString};

use crate::error::{msg, AppError, Result};

/// Payment lifecycle of an order. Allowed edges:
/// pending→processing, processing→succeeded, processing→failed,
/// failed→processing (retry with the same or another provider).
/// `Succeeded` is terminal and must never be overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    Paypal,
}

/// Provider-side payment identifier stored on the order; the join key used
/// by webhook reconciliation to locate the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderPaymentId {
    /// Stripe payment intent id (pi_...).
    StripeIntent(String),
    /// PayPal checkout order id.
    PaypalOrder(String),
}

impl ProviderPaymentId {
    pub fn provider(&self) -> PaymentProvider {
        match self {
            ProviderPaymentId::StripeIntent(_) => PaymentProvider::Stripe,
            ProviderPaymentId::PaypalOrder(_) => PaymentProvider::Paypal,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProviderPaymentId::StripeIntent(id) => id,
            ProviderPaymentId::PaypalOrder(id) => id,
        }
    }
}

/// Payer identity recorded when a payment succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayerIdentity {
    pub stripe_customer_id: Option<String>,
    pub paypal_payer_id: Option<String>,
}

impl PayerIdentity {
    pub fn stripe_customer(customer_id: Option<String>) -> Self {
        Self {
            stripe_customer_id: customer_id,
            ..Default::default()
        }
    }

    pub fn paypal_payer(payer_id: Option<String>) -> Self {
        Self {
            paypal_payer_id: payer_id,
            ..Default::default()
        }
    }
}

/// Outcome of a conditional status update.
///
/// The store never overwrites blindly; callers learn whether their write won,
/// was a duplicate of an earlier equivalent write, or was blocked by the
/// monotonic transition rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The conditional update matched and wrote the row.
    Applied,
    /// The order already carried the target status; nothing changed.
    AlreadyApplied,
    /// The transition rule blocked the write (e.g. failed after succeeded).
    Refused { current: PaymentStatus },
}

impl TransitionOutcome {
    pub fn changed_row(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// One selectable official document, as submitted by the storefront.
/// Price is in euros with two decimal places (e.g. 29.90).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedDocument {
    pub id: String,
    pub name: String,
    pub price: f64,
}

impl SelectedDocument {
    pub fn price_cents(&self) -> i64 {
        euros_to_cents(self.price)
    }
}

/// Convert a decimal euro amount to integer cents, rounding half away from
/// zero (29.90 → 2990). All internal arithmetic is done in cents so that
/// two-decimal sums are exact.
pub fn euros_to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn cents_to_euros(cents: i64) -> f64 {
    cents as f64 / 100.0
}

fn serialize_cents_as_euros<S: Serializer>(cents: &i64, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(cents_to_euros(*cents))
}

/// A property-document order. Aggregate root and the single source of truth
/// for payment status.
///
/// Customer fields are write-once at creation; payment flows only ever touch
/// the payment columns, through conditional updates in `db::queries`.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: String,

    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub street: String,
    pub house_number: String,
    pub postal_code: String,
    pub city: String,

    /// Grundbuch sheet number, if the customer knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_number: Option<String>,
    /// Flur / Flurstück designation from the cadastral map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_parcel_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    pub selected_documents: Vec<SelectedDocument>,
    pub certified_grundbuchauszug: bool,
    pub owner_proof_liegenschaftskarte: bool,

    pub document_purpose: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_purpose_reason: Option<String>,
    /// Legal interest declaration required by §12 GBO for land-registry access.
    pub legal_interest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_interest_reason: Option<String>,
    /// Data-URL PNG from the signature pad.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_data: Option<String>,

    #[serde(rename = "total_amount", serialize_with = "serialize_cents_as_euros")]
    pub total_amount_cents: i64,

    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_provider: Option<PaymentProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paypal_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paypal_payer_id: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// The provider payment id currently attached to this order, if any.
    pub fn provider_payment_id(&self) -> Option<ProviderPaymentId> {
        match self.payment_provider? {
            PaymentProvider::Stripe => self
                .payment_intent_id
                .clone()
                .map(ProviderPaymentId::StripeIntent),
            PaymentProvider::Paypal => self
                .paypal_order_id
                .clone()
                .map(ProviderPaymentId::PaypalOrder),
        }
    }
}

/// Order creation payload as submitted by the storefront form.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    pub street: String,
    pub house_number: String,
    pub postal_code: String,
    pub city: String,
    #[serde(default)]
    pub sheet_number: Option<String>,
    #[serde(default)]
    pub field_parcel_number: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    pub selected_documents: Vec<SelectedDocument>,
    #[serde(default)]
    pub certified_grundbuchauszug: bool,
    #[serde(default)]
    pub owner_proof_liegenschaftskarte: bool,
    pub document_purpose: String,
    #[serde(default)]
    pub other_purpose_reason: Option<String>,
    pub legal_interest: String,
    #[serde(default)]
    pub other_interest_reason: Option<String>,
    #[serde(default)]
    pub signature_data: Option<String>,
    /// Client-computed total in euros; verified against the document sum.
    pub total_amount: f64,
}

impl CreateOrder {
    /// Validate the payload and return the authoritative total in cents.
    ///
    /// The client-supplied total is accepted only if it equals the sum of the
    /// selected document prices to the cent.
    pub fn validate(&self) -> Result<i64> {
        if self.email.trim().is_empty() {
            return Err(AppError::BadRequest("email must not be empty".into()));
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        if self.selected_documents.is_empty() {
            return Err(AppError::BadRequest(
                "selected_documents must not be empty".into(),
            ));
        }
        for doc in &self.selected_documents {
            if doc.price <= 0.0 {
                return Err(AppError::BadRequest(format!(
                    "document {} has a non-positive price",
                    doc.id
                )));
            }
        }

        let sum_cents: i64 = self.selected_documents.iter().map(|d| d.price_cents()).sum();
        if euros_to_cents(self.total_amount) != sum_cents {
            return Err(AppError::BadRequest(msg::AMOUNT_MISMATCH.into()));
        }

        Ok(sum_cents)
    }
}
