use rusqlite::Connection;

/// Initialize the database schema.
///
/// One row per order. Provider payment identifiers live in plain columns on
/// the order itself; there is at most one active provider attempt per order,
/// so a separate payments table would buy nothing.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        PRAGMA journal_size_limit = 67108864;

        -- Orders (aggregate root; payment_status is the contended field)
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,

            email TEXT NOT NULL,
            phone TEXT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            company_name TEXT,
            street TEXT NOT NULL,
            house_number TEXT NOT NULL,
            postal_code TEXT NOT NULL,
            city TEXT NOT NULL,

            sheet_number TEXT,
            field_parcel_number TEXT,
            district TEXT,

            selected_documents TEXT NOT NULL,     -- JSON array of {id, name, price}
            certified_grundbuchauszug INTEGER NOT NULL DEFAULT 0,
            owner_proof_liegenschaftskarte INTEGER NOT NULL DEFAULT 0,

            document_purpose TEXT NOT NULL,
            other_purpose_reason TEXT,
            legal_interest TEXT NOT NULL,
            other_interest_reason TEXT,
            signature_data TEXT,

            total_amount_cents INTEGER NOT NULL CHECK (total_amount_cents > 0),

            payment_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (payment_status IN ('pending', 'processing', 'succeeded', 'failed')),
            payment_provider TEXT
                CHECK (payment_provider IN ('stripe', 'paypal')),
            payment_intent_id TEXT,
            stripe_customer_id TEXT,
            paypal_order_id TEXT,
            paypal_payer_id TEXT,

            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        -- Webhooks locate orders by the stored provider payment id, never by
        -- a client-supplied order id.
        CREATE INDEX IF NOT EXISTS idx_orders_payment_intent
            ON orders(payment_intent_id) WHERE payment_intent_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_orders_paypal_order
            ON orders(paypal_order_id) WHERE paypal_order_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(payment_status);

        -- Webhook events (for replay/duplicate-delivery prevention; the
        -- UNIQUE pair doubles as the lookup index)
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(provider, event_id)
        );
        "#,
    )?;
    Ok(())
}
