use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Payments. Created pending before any gateway call; completed only
        -- via a verified webhook or a successful wallet debit.
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT,
            enrollment_id TEXT,
            subscription_id TEXT,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            gateway TEXT NOT NULL CHECK (gateway IN ('razorpay', 'stripe', 'wallet')),
            status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'failed')),
            description TEXT,
            gateway_order_id TEXT,
            gateway_payment_id TEXT,
            payment_method TEXT,
            payment_date INTEGER,
            expires_at INTEGER,
            webhook_verified INTEGER NOT NULL DEFAULT 0,
            metadata TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id);
        CREATE INDEX IF NOT EXISTS idx_payments_subscription ON payments(subscription_id);
        CREATE INDEX IF NOT EXISTS idx_payments_gateway_order ON payments(gateway, gateway_order_id);
        CREATE INDEX IF NOT EXISTS idx_payments_pending_expiry ON payments(expires_at) WHERE status = 'pending';

        -- Refunds. Created atomically with the ledger-side bookkeeping,
        -- completed once the gateway confirms.
        CREATE TABLE IF NOT EXISTS refunds (
            id TEXT PRIMARY KEY,
            payment_id TEXT NOT NULL REFERENCES payments(id) ON DELETE CASCADE,
            amount INTEGER NOT NULL,
            reason TEXT NOT NULL,
            requested_by TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'completed')),
            gateway_refund_id TEXT,
            processed_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_refunds_payment ON refunds(payment_id);

        -- Raw inbound webhooks, logged before verification for replay/debugging.
        CREATE TABLE IF NOT EXISTS payment_webhooks (
            id TEXT PRIMARY KEY,
            gateway TEXT NOT NULL,
            payload TEXT NOT NULL,
            signature TEXT,
            verified INTEGER NOT NULL DEFAULT 0,
            received_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payment_webhooks_gateway ON payment_webhooks(gateway, received_at DESC);

        -- Gateway credentials, loaded once at startup.
        CREATE TABLE IF NOT EXISTS payment_gateway_configs (
            gateway TEXT PRIMARY KEY,
            config TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            updated_at INTEGER NOT NULL
        );

        -- Subscriptions. The partial unique index enforces at most one
        -- active subscription per (student, course) even under racing
        -- create calls.
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('active', 'cancelled', 'expired', 'paused')),
            billing_cycle TEXT NOT NULL CHECK (billing_cycle IN ('monthly', 'yearly')),
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            gateway TEXT NOT NULL CHECK (gateway IN ('razorpay', 'stripe', 'wallet')),
            current_period_start INTEGER NOT NULL,
            current_period_end INTEGER NOT NULL,
            next_billing_date INTEGER NOT NULL,
            auto_renew INTEGER NOT NULL DEFAULT 1,
            failed_payment_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_subscriptions_one_active
            ON subscriptions(student_id, course_id) WHERE status = 'active';
        CREATE INDEX IF NOT EXISTS idx_subscriptions_student ON subscriptions(student_id);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_due
            ON subscriptions(next_billing_date) WHERE status = 'active' AND auto_renew = 1;

        -- Append-only audit trail; one row per state transition.
        CREATE TABLE IF NOT EXISTS subscription_events (
            id TEXT PRIMARY KEY,
            subscription_id TEXT NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
            event_type TEXT NOT NULL,
            previous_status TEXT,
            new_status TEXT,
            payment_id TEXT,
            metadata TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscription_events_subscription
            ON subscription_events(subscription_id, created_at);

        -- Wallets. Balance is mutated only by the conditional updates in
        -- db::ledger, never by read-modify-write.
        CREATE TABLE IF NOT EXISTS wallets (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            points INTEGER NOT NULL DEFAULT 0,
            credits INTEGER NOT NULL DEFAULT 0,
            currency TEXT NOT NULL DEFAULT 'INR',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wallet_transactions (
            id TEXT PRIMARY KEY,
            wallet_id TEXT NOT NULL REFERENCES wallets(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('debit', 'credit')),
            amount INTEGER NOT NULL,
            description TEXT NOT NULL,
            reference_id TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_wallet_transactions_wallet
            ON wallet_transactions(wallet_id, created_at DESC);

        -- Invoices. UNIQUE(payment_id) makes creation idempotent under
        -- webhook replays.
        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY,
            payment_id TEXT NOT NULL UNIQUE REFERENCES payments(id) ON DELETE CASCADE,
            student_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            issued_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
