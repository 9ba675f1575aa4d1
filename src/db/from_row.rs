//! Row mapping trait and helpers shared by the query layer.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on unexpected database content.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row, enabling the
/// `query_one` helper below.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

// ============ SQL SELECT Constants ============

pub const ORDER_COLS: &str = "id, email, phone, first_name, last_name, company_name, street, house_number, postal_code, city, sheet_number, field_parcel_number, district, selected_documents, certified_grundbuchauszug, owner_proof_liegenschaftskarte, document_purpose, other_purpose_reason, legal_interest, other_interest_reason, signature_data, total_amount_cents, payment_status, payment_provider, payment_intent_id, stripe_customer_id, paypal_order_id, paypal_payer_id, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        // selected_documents is money-bearing, so a corrupt JSON column is a
        // hard error rather than an empty default.
        let docs_json: String = row.get(13)?;
        let selected_documents = serde_json::from_str(&docs_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                13,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

        // payment_provider is NULL until a payment attempt attaches one
        let payment_provider = row
            .get::<_, Option<String>>(23)?
            .map(|s| {
                s.parse::<PaymentProvider>().map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        23,
                        "payment_provider".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })
            })
            .transpose()?;

        Ok(Order {
            id: row.get(0)?,
            email: row.get(1)?,
            phone: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            company_name: row.get(5)?,
            street: row.get(6)?,
            house_number: row.get(7)?,
            postal_code: row.get(8)?,
            city: row.get(9)?,
            sheet_number: row.get(10)?,
            field_parcel_number: row.get(11)?,
            district: row.get(12)?,
            selected_documents,
            certified_grundbuchauszug: row.get(14)?,
            owner_proof_liegenschaftskarte: row.get(15)?,
            document_purpose: row.get(16)?,
            other_purpose_reason: row.get(17)?,
            legal_interest: row.get(18)?,
            other_interest_reason: row.get(19)?,
            signature_data: row.get(20)?,
            total_amount_cents: row.get(21)?,
            payment_status: parse_enum(row, 22, "payment_status")?,
            payment_provider,
            payment_intent_id: row.get(24)?,
            stripe_customer_id: row.get(25)?,
            paypal_order_id: row.get(26)?,
            paypal_payer_id: row.get(27)?,
            created_at: row.get(28)?,
            updated_at: row.get(29)?,
        })
    }
}
