use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::{AppError, Result, msg};
use crate::models::{
    CreateOrder, Order, PayerIdentity, PaymentProvider, PaymentStatus, ProviderPaymentId,
    TransitionOutcome,
};

use super::from_row::{ORDER_COLS, query_one};

/// Current unix timestamp in seconds.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Generates a random identifier for new rows.
pub fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Orders ============

/// Inserts a new order in `pending` state.
///
/// Validates the submitted payload first, so a row can only exist with a
/// positive total that matches the sum of its document prices.
pub fn create_order(conn: &Connection, input: &CreateOrder) -> Result<Order> {
    let total_amount_cents = input.validate()?;
    let id = gen_id();
    let ts = now();
    let selected_documents = serde_json::to_string(&input.selected_documents)?;

    conn.execute(
        "INSERT INTO orders (
            id, email, phone, first_name, last_name, company_name,
            street, house_number, postal_code, city,
            sheet_number, field_parcel_number, district,
            selected_documents, certified_grundbuchauszug, owner_proof_liegenschaftskarte,
            document_purpose, other_purpose_reason, legal_interest, other_interest_reason,
            signature_data, total_amount_cents, payment_status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, 'pending', ?23, ?23)",
        params![
            id,
            input.email,
            input.phone,
            input.first_name,
            input.last_name,
            input.company_name,
            input.street,
            input.house_number,
            input.postal_code,
            input.city,
            input.sheet_number,
            input.field_parcel_number,
            input.district,
            selected_documents,
            input.certified_grundbuchauszug,
            input.owner_proof_liegenschaftskarte,
            input.document_purpose,
            input.other_purpose_reason,
            input.legal_interest,
            input.other_interest_reason,
            input.signature_data,
            total_amount_cents,
            ts,
        ],
    )?;

    Ok(Order {
        id,
        email: input.email.clone(),
        phone: input.phone.clone(),
        first_name: input.first_name.clone(),
        last_name: input.last_name.clone(),
        company_name: input.company_name.clone(),
        street: input.street.clone(),
        house_number: input.house_number.clone(),
        postal_code: input.postal_code.clone(),
        city: input.city.clone(),
        sheet_number: input.sheet_number.clone(),
        field_parcel_number: input.field_parcel_number.clone(),
        district: input.district.clone(),
        selected_documents: input.selected_documents.clone(),
        certified_grundbuchauszug: input.certified_grundbuchauszug,
        owner_proof_liegenschaftskarte: input.owner_proof_liegenschaftskarte,
        document_purpose: input.document_purpose.clone(),
        other_purpose_reason: input.other_purpose_reason.clone(),
        legal_interest: input.legal_interest.clone(),
        other_interest_reason: input.other_interest_reason.clone(),
        signature_data: input.signature_data.clone(),
        total_amount_cents,
        payment_status: PaymentStatus::Pending,
        payment_provider: None,
        payment_intent_id: None,
        stripe_customer_id: None,
        paypal_order_id: None,
        paypal_payer_id: None,
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_order(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {ORDER_COLS} FROM orders WHERE id = ?1"),
        params![id],
    )
}

/// Looks up the order a provider event belongs to, by the provider-side
/// payment identifier stored when the payment was initiated.
pub fn get_order_by_provider_payment(
    conn: &Connection,
    key: &ProviderPaymentId,
) -> Result<Option<Order>> {
    let column = match key {
        ProviderPaymentId::StripeIntent(_) => "payment_intent_id",
        ProviderPaymentId::PaypalOrder(_) => "paypal_order_id",
    };
    query_one(
        conn,
        &format!("SELECT {ORDER_COLS} FROM orders WHERE {column} = ?1"),
        params![key.as_str()],
    )
}

// ============ Payment status transitions ============

/// Reads back the stored status after a conditional update matched no rows,
/// and classifies why the write was skipped.
fn resolve_skipped_write(
    conn: &Connection,
    order_id: &str,
    target: PaymentStatus,
) -> Result<TransitionOutcome> {
    let current = conn
        .query_row(
            "SELECT payment_status FROM orders WHERE id = ?1",
            params![order_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    match current {
        None => Err(AppError::NotFound(msg::ORDER_NOT_FOUND.to_string())),
        Some(raw) => {
            let current: PaymentStatus = raw
                .parse()
                .map_err(|_| AppError::Internal(format!("invalid payment_status: {raw}")))?;
            if current == target {
                Ok(TransitionOutcome::AlreadyApplied)
            } else {
                Ok(TransitionOutcome::Refused { current })
            }
        }
    }
}

/// Moves an order into `processing` and pins the provider chosen for this
/// attempt. Allowed from `pending`, from `failed` (retry) and from
/// `processing` itself, so a customer can abandon one provider's checkout and
/// start over with the other. Any provider reference from an earlier attempt
/// is cleared here; the new one is attached once the provider accepts.
pub fn begin_payment_attempt(
    conn: &Connection,
    order_id: &str,
    provider: PaymentProvider,
) -> Result<TransitionOutcome> {
    let provider_str: &str = provider.as_ref();
    let affected = conn.execute(
        "UPDATE orders
         SET payment_status = 'processing', payment_provider = ?2,
             payment_intent_id = NULL, paypal_order_id = NULL, updated_at = ?3
         WHERE id = ?1 AND payment_status IN ('pending', 'processing', 'failed')",
        params![order_id, provider_str, now()],
    )?;

    if affected > 0 {
        Ok(TransitionOutcome::Applied)
    } else {
        resolve_skipped_write(conn, order_id, PaymentStatus::Processing)
    }
}

/// Stores the provider-side payment identifier on the order so later webhook
/// and confirmation calls can find it again.
pub fn attach_provider_payment(
    conn: &Connection,
    order_id: &str,
    key: &ProviderPaymentId,
) -> Result<()> {
    let column = match key {
        ProviderPaymentId::StripeIntent(_) => "payment_intent_id",
        ProviderPaymentId::PaypalOrder(_) => "paypal_order_id",
    };
    let affected = conn.execute(
        &format!("UPDATE orders SET {column} = ?2, updated_at = ?3 WHERE id = ?1"),
        params![order_id, key.as_str(), now()],
    )?;
    if affected == 0 {
        return Err(AppError::NotFound(msg::ORDER_NOT_FOUND.to_string()));
    }
    Ok(())
}

/// Marks an order as paid. Only `pending` and `processing` orders can move to
/// `succeeded`; a repeat of the same outcome reports `AlreadyApplied` and
/// leaves the row untouched, so success is recorded exactly once no matter
/// how many delivery paths (webhook, client confirmation) report it.
pub fn record_payment_success(
    conn: &Connection,
    order_id: &str,
    payer: &PayerIdentity,
) -> Result<TransitionOutcome> {
    let affected = conn.execute(
        "UPDATE orders
         SET payment_status = 'succeeded',
             stripe_customer_id = COALESCE(?2, stripe_customer_id),
             paypal_payer_id = COALESCE(?3, paypal_payer_id),
             updated_at = ?4
         WHERE id = ?1 AND payment_status IN ('pending', 'processing')",
        params![
            order_id,
            payer.stripe_customer_id,
            payer.paypal_payer_id,
            now()
        ],
    )?;

    if affected > 0 {
        Ok(TransitionOutcome::Applied)
    } else {
        resolve_skipped_write(conn, order_id, PaymentStatus::Succeeded)
    }
}

/// Marks a payment attempt as failed. A `succeeded` order is never
/// downgraded; a late failure event for an order that already paid
/// reports `Refused`.
pub fn record_payment_failure(conn: &Connection, order_id: &str) -> Result<TransitionOutcome> {
    let affected = conn.execute(
        "UPDATE orders SET payment_status = 'failed', updated_at = ?2
         WHERE id = ?1 AND payment_status IN ('pending', 'processing')",
        params![order_id, now()],
    )?;

    if affected > 0 {
        Ok(TransitionOutcome::Applied)
    } else {
        resolve_skipped_write(conn, order_id, PaymentStatus::Failed)
    }
}

// ============ Webhook events ============

/// Claims a webhook event id for processing. Returns `false` when the same
/// provider event was already recorded, so redeliveries can be acknowledged
/// without being applied twice.
pub fn try_record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (id, provider, event_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![gen_id(), provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

/// Deletes webhook event records older than the retention window. Provider
/// redelivery stops well within days, so old rows only cost space.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - retention_days * 86_400;
    let affected = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(affected)
}
