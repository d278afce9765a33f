use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Result;
use crate::gateways::Gateway;
use crate::models::*;

use super::from_row::{
    query_all, query_one, FromRow, GATEWAY_CONFIG_COLS, INVOICE_COLS, PAYMENT_COLS, REFUND_COLS,
    SUBSCRIPTION_COLS, SUBSCRIPTION_EVENT_COLS, WALLET_COLS, WALLET_TRANSACTION_COLS,
    WEBHOOK_LOG_COLS,
};

pub(crate) fn now() -> i64 {
    Utc::now().timestamp()
}

pub(crate) fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Payments ============

/// Insert a payment in `pending` state. Runs before any gateway call so a
/// record exists even if the gateway call later fails.
pub fn create_payment(conn: &Connection, input: &CreatePayment) -> Result<Payment> {
    let id = gen_id();
    let now = now();
    let metadata = input
        .metadata
        .as_ref()
        .map(|m| serde_json::to_string(m))
        .transpose()?;

    conn.execute(
        "INSERT INTO payments (id, student_id, course_id, enrollment_id, subscription_id,
                               amount, currency, gateway, status, description, webhook_verified,
                               metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, 0, ?10, ?11, ?11)",
        params![
            &id,
            &input.student_id,
            &input.course_id,
            &input.enrollment_id,
            &input.subscription_id,
            input.amount,
            &input.currency,
            input.gateway.as_str(),
            &input.description,
            &metadata,
            now,
        ],
    )?;

    Ok(Payment {
        id,
        student_id: input.student_id.clone(),
        course_id: input.course_id.clone(),
        enrollment_id: input.enrollment_id.clone(),
        subscription_id: input.subscription_id.clone(),
        amount: input.amount,
        currency: input.currency.clone(),
        gateway: input.gateway,
        status: PaymentStatus::Pending,
        description: input.description.clone(),
        gateway_order_id: None,
        gateway_payment_id: None,
        payment_method: None,
        payment_date: None,
        expires_at: None,
        webhook_verified: false,
        metadata,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_payment(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLS),
        &[&id],
    )
}

pub fn get_payment_by_order_id(
    conn: &Connection,
    gateway: Gateway,
    order_id: &str,
) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE gateway = ?1 AND gateway_order_id = ?2",
            PAYMENT_COLS
        ),
        &[&gateway.as_str(), &order_id],
    )
}

/// Stamp the gateway order id and completion deadline after a successful
/// order creation.
pub fn set_payment_order(
    conn: &Connection,
    id: &str,
    gateway_order_id: &str,
    expires_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET gateway_order_id = ?2, expires_at = ?3, updated_at = ?4
         WHERE id = ?1",
        params![id, gateway_order_id, expires_at, now()],
    )?;
    Ok(affected > 0)
}

/// Flip a payment to `completed`. Guarded on `status = 'pending'` so a
/// completed payment never moves and replayed webhooks are no-ops.
pub fn mark_payment_completed(
    conn: &Connection,
    id: &str,
    gateway_payment_id: Option<&str>,
    payment_method: &str,
    webhook_verified: bool,
) -> Result<Option<Payment>> {
    let now = now();
    conn.query_row(
        &format!(
            "UPDATE payments
             SET status = 'completed', gateway_payment_id = COALESCE(?2, gateway_payment_id),
                 payment_method = ?3, payment_date = ?4, webhook_verified = ?5, updated_at = ?4
             WHERE id = ?1 AND status = 'pending'
             RETURNING {}",
            PAYMENT_COLS
        ),
        params![id, gateway_payment_id, payment_method, now, webhook_verified],
        Payment::from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Revive a payment the expiry sweep flipped to `failed` before the capture
/// webhook arrived. The sweep is the only writer of `failed`, so the guard
/// targets exactly the expiry-failed rows.
pub fn recover_expired_payment(
    conn: &Connection,
    id: &str,
    gateway_payment_id: Option<&str>,
    payment_method: &str,
) -> Result<Option<Payment>> {
    let now = now();
    conn.query_row(
        &format!(
            "UPDATE payments
             SET status = 'completed', gateway_payment_id = COALESCE(?2, gateway_payment_id),
                 payment_method = ?3, payment_date = ?4, webhook_verified = 1, updated_at = ?4
             WHERE id = ?1 AND status = 'failed'
             RETURNING {}",
            PAYMENT_COLS
        ),
        params![id, gateway_payment_id, payment_method, now],
        Payment::from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Flip pending payments past their completion deadline to `failed`.
/// Returns the number of rows swept.
pub fn expire_pending_payments(conn: &Connection, now_ts: i64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE payments SET status = 'failed', updated_at = ?1
         WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at < ?1",
        params![now_ts],
    )?;
    Ok(affected)
}

// ============ Refunds ============

pub fn get_refund(conn: &Connection, id: &str) -> Result<Option<Refund>> {
    query_one(
        conn,
        &format!("SELECT {} FROM refunds WHERE id = ?1", REFUND_COLS),
        &[&id],
    )
}

pub fn list_refunds_for_payment(conn: &Connection, payment_id: &str) -> Result<Vec<Refund>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM refunds WHERE payment_id = ?1 ORDER BY created_at",
            REFUND_COLS
        ),
        &[&payment_id],
    )
}

/// Mark a refund completed once the gateway confirms. Guarded on
/// `status = 'pending'`.
pub fn mark_refund_completed(
    conn: &Connection,
    id: &str,
    gateway_refund_id: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE refunds SET status = 'completed', gateway_refund_id = ?2, processed_at = ?3
         WHERE id = ?1 AND status = 'pending'",
        params![id, gateway_refund_id, now()],
    )?;
    Ok(affected > 0)
}

// ============ Webhook log ============

/// Persist a raw webhook before verification.
pub fn log_webhook(
    conn: &Connection,
    gateway: Gateway,
    payload: &str,
    signature: Option<&str>,
) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO payment_webhooks (id, gateway, payload, signature, verified, received_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![&id, gateway.as_str(), payload, signature, now()],
    )?;
    Ok(id)
}

pub fn mark_webhook_verified(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_webhooks SET verified = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(affected > 0)
}

/// Deliveries for one gateway, oldest first, for inspection and replay.
pub fn list_webhook_logs(conn: &Connection, gateway: Gateway) -> Result<Vec<WebhookLog>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_webhooks WHERE gateway = ?1 ORDER BY received_at",
            WEBHOOK_LOG_COLS
        ),
        &[&gateway.as_str()],
    )
}

// ============ Gateway configs ============

pub fn upsert_gateway_config(
    conn: &Connection,
    gateway: Gateway,
    config_json: &str,
    enabled: bool,
) -> Result<()> {
    conn.execute(
        "INSERT INTO payment_gateway_configs (gateway, config, enabled, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(gateway) DO UPDATE SET config = ?2, enabled = ?3, updated_at = ?4",
        params![gateway.as_str(), config_json, enabled, now()],
    )?;
    Ok(())
}

pub fn list_enabled_gateway_configs(conn: &Connection) -> Result<Vec<GatewayConfigRow>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_gateway_configs WHERE enabled = 1",
            GATEWAY_CONFIG_COLS
        ),
        &[],
    )
}

// ============ Subscriptions ============

pub struct NewSubscription<'a> {
    pub input: &'a CreateSubscription,
    pub period_start: i64,
    pub period_end: i64,
}

pub fn create_subscription(conn: &Connection, new: &NewSubscription) -> Result<Subscription> {
    let id = gen_id();
    let now = now();
    let input = new.input;

    conn.execute(
        "INSERT INTO subscriptions (id, student_id, course_id, status, billing_cycle, amount,
                                    currency, gateway, current_period_start, current_period_end,
                                    next_billing_date, auto_renew, failed_payment_count,
                                    created_at, updated_at)
         VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?6, ?7, ?8, ?9, ?9, 1, 0, ?10, ?10)",
        params![
            &id,
            &input.student_id,
            &input.course_id,
            input.billing_cycle.as_str(),
            input.amount,
            &input.currency,
            input.gateway.as_str(),
            new.period_start,
            new.period_end,
            now,
        ],
    )?;

    Ok(Subscription {
        id,
        student_id: input.student_id.clone(),
        course_id: input.course_id.clone(),
        status: SubscriptionStatus::Active,
        billing_cycle: input.billing_cycle,
        amount: input.amount,
        currency: input.currency.clone(),
        gateway: input.gateway,
        current_period_start: new.period_start,
        current_period_end: new.period_end,
        next_billing_date: new.period_end,
        auto_renew: true,
        failed_payment_count: 0,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_subscription(conn: &Connection, id: &str) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&id],
    )
}

pub fn active_subscription_exists(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subscriptions
         WHERE student_id = ?1 AND course_id = ?2 AND status = 'active'",
        params![student_id, course_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Compensating delete for a subscription whose initial payment request
/// failed. Events cascade.
pub fn delete_subscription(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM subscriptions WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

pub fn update_subscription_status(
    conn: &Connection,
    id: &str,
    status: SubscriptionStatus,
    auto_renew: bool,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions SET status = ?2, auto_renew = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, status.as_str(), auto_renew, now()],
    )?;
    Ok(affected > 0)
}

pub fn update_subscription_period(
    conn: &Connection,
    id: &str,
    period_start: i64,
    period_end: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions
         SET current_period_start = ?2, current_period_end = ?3, next_billing_date = ?3,
             updated_at = ?4
         WHERE id = ?1",
        params![id, period_start, period_end, now()],
    )?;
    Ok(affected > 0)
}

/// Resume from paused: back to active with a fresh period starting now.
pub fn resume_subscription_row(
    conn: &Connection,
    id: &str,
    period_start: i64,
    period_end: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions
         SET status = 'active', auto_renew = 1, current_period_start = ?2,
             current_period_end = ?3, next_billing_date = ?3, updated_at = ?4
         WHERE id = ?1 AND status = 'paused'",
        params![id, period_start, period_end, now()],
    )?;
    Ok(affected > 0)
}

pub fn increment_failed_payment_count(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions
         SET failed_payment_count = failed_payment_count + 1, updated_at = ?2
         WHERE id = ?1",
        params![id, now()],
    )?;
    Ok(affected > 0)
}

/// Subscriptions due for renewal, oldest first, capped per sweep.
pub fn list_due_renewals(conn: &Connection, now_ts: i64, limit: i64) -> Result<Vec<Subscription>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscriptions
             WHERE status = 'active' AND auto_renew = 1 AND next_billing_date <= ?1
             ORDER BY next_billing_date
             LIMIT ?2",
            SUBSCRIPTION_COLS
        ),
        &[&now_ts, &limit],
    )
}

/// Active, non-renewing subscriptions whose period has lapsed.
pub fn list_lapsed_subscriptions(conn: &Connection, now_ts: i64) -> Result<Vec<Subscription>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscriptions
             WHERE status = 'active' AND auto_renew = 0 AND current_period_end < ?1",
            SUBSCRIPTION_COLS
        ),
        &[&now_ts],
    )
}

// ============ Subscription events ============

pub struct NewSubscriptionEvent<'a> {
    pub subscription_id: &'a str,
    pub event_type: &'a str,
    pub previous_status: Option<SubscriptionStatus>,
    pub new_status: Option<SubscriptionStatus>,
    pub payment_id: Option<&'a str>,
    pub metadata: Option<serde_json::Value>,
}

pub fn insert_subscription_event(
    conn: &Connection,
    event: &NewSubscriptionEvent,
) -> Result<String> {
    let id = gen_id();
    let metadata = event
        .metadata
        .as_ref()
        .map(|m| serde_json::to_string(m))
        .transpose()?;
    conn.execute(
        "INSERT INTO subscription_events (id, subscription_id, event_type, previous_status,
                                          new_status, payment_id, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            event.subscription_id,
            event.event_type,
            event.previous_status.map(|s| s.as_str()),
            event.new_status.map(|s| s.as_str()),
            event.payment_id,
            &metadata,
            now(),
        ],
    )?;
    Ok(id)
}

pub fn list_subscription_events(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Vec<SubscriptionEvent>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscription_events WHERE subscription_id = ?1 ORDER BY created_at",
            SUBSCRIPTION_EVENT_COLS
        ),
        &[&subscription_id],
    )
}

// ============ Wallets ============

pub fn create_wallet(conn: &Connection, user_id: &str, currency: &str) -> Result<Wallet> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO wallets (id, user_id, points, credits, currency, created_at, updated_at)
         VALUES (?1, ?2, 0, 0, ?3, ?4, ?4)",
        params![&id, user_id, currency, now],
    )?;
    Ok(Wallet {
        id,
        user_id: user_id.to_string(),
        points: 0,
        credits: 0,
        currency: currency.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_wallet_by_user(conn: &Connection, user_id: &str) -> Result<Option<Wallet>> {
    query_one(
        conn,
        &format!("SELECT {} FROM wallets WHERE user_id = ?1", WALLET_COLS),
        &[&user_id],
    )
}

pub fn list_wallet_transactions(
    conn: &Connection,
    wallet_id: &str,
) -> Result<Vec<WalletTransaction>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM wallet_transactions WHERE wallet_id = ?1 ORDER BY created_at DESC",
            WALLET_TRANSACTION_COLS
        ),
        &[&wallet_id],
    )
}

// ============ Invoices ============

pub fn get_invoice_for_payment(conn: &Connection, payment_id: &str) -> Result<Option<Invoice>> {
    query_one(
        conn,
        &format!("SELECT {} FROM invoices WHERE payment_id = ?1", INVOICE_COLS),
        &[&payment_id],
    )
}
