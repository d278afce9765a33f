//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

fn parse_enum_opt<T: std::str::FromStr>(row: &Row, col: usize) -> rusqlite::Result<Option<T>> {
    Ok(row
        .get::<_, Option<String>>(col)?
        .and_then(|s| s.parse().ok()))
}

/// Trait for constructing a type from a database row.
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

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PAYMENT_COLS: &str = "id, student_id, course_id, enrollment_id, subscription_id, amount, currency, gateway, status, description, gateway_order_id, gateway_payment_id, payment_method, payment_date, expires_at, webhook_verified, metadata, created_at, updated_at";

pub const REFUND_COLS: &str =
    "id, payment_id, amount, reason, requested_by, status, gateway_refund_id, processed_at, created_at";

pub const SUBSCRIPTION_COLS: &str = "id, student_id, course_id, status, billing_cycle, amount, currency, gateway, current_period_start, current_period_end, next_billing_date, auto_renew, failed_payment_count, created_at, updated_at";

pub const SUBSCRIPTION_EVENT_COLS: &str =
    "id, subscription_id, event_type, previous_status, new_status, payment_id, metadata, created_at";

pub const WALLET_COLS: &str = "id, user_id, points, credits, currency, created_at, updated_at";

pub const WALLET_TRANSACTION_COLS: &str =
    "id, wallet_id, kind, amount, description, reference_id, created_at";

pub const GATEWAY_CONFIG_COLS: &str = "gateway, config, enabled, updated_at";

pub const WEBHOOK_LOG_COLS: &str = "id, gateway, payload, signature, verified, received_at";

pub const INVOICE_COLS: &str = "id, payment_id, student_id, amount, currency, issued_at";

// ============ FromRow Implementations ============

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            student_id: row.get(1)?,
            course_id: row.get(2)?,
            enrollment_id: row.get(3)?,
            subscription_id: row.get(4)?,
            amount: row.get(5)?,
            currency: row.get(6)?,
            gateway: parse_enum(row, 7, "gateway")?,
            status: parse_enum(row, 8, "status")?,
            description: row.get(9)?,
            gateway_order_id: row.get(10)?,
            gateway_payment_id: row.get(11)?,
            payment_method: row.get(12)?,
            payment_date: row.get(13)?,
            expires_at: row.get(14)?,
            webhook_verified: row.get::<_, i32>(15)? != 0,
            metadata: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }
}

impl FromRow for Refund {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Refund {
            id: row.get(0)?,
            payment_id: row.get(1)?,
            amount: row.get(2)?,
            reason: row.get(3)?,
            requested_by: row.get(4)?,
            status: parse_enum(row, 5, "status")?,
            gateway_refund_id: row.get(6)?,
            processed_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            student_id: row.get(1)?,
            course_id: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            billing_cycle: parse_enum(row, 4, "billing_cycle")?,
            amount: row.get(5)?,
            currency: row.get(6)?,
            gateway: parse_enum(row, 7, "gateway")?,
            current_period_start: row.get(8)?,
            current_period_end: row.get(9)?,
            next_billing_date: row.get(10)?,
            auto_renew: row.get::<_, i32>(11)? != 0,
            failed_payment_count: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl FromRow for SubscriptionEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(SubscriptionEvent {
            id: row.get(0)?,
            subscription_id: row.get(1)?,
            event_type: row.get(2)?,
            previous_status: parse_enum_opt(row, 3)?,
            new_status: parse_enum_opt(row, 4)?,
            payment_id: row.get(5)?,
            metadata: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for Wallet {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Wallet {
            id: row.get(0)?,
            user_id: row.get(1)?,
            points: row.get(2)?,
            credits: row.get(3)?,
            currency: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for WalletTransaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WalletTransaction {
            id: row.get(0)?,
            wallet_id: row.get(1)?,
            kind: parse_enum(row, 2, "kind")?,
            amount: row.get(3)?,
            description: row.get(4)?,
            reference_id: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for GatewayConfigRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(GatewayConfigRow {
            gateway: row.get(0)?,
            config: row.get(1)?,
            enabled: row.get::<_, i32>(2)? != 0,
            updated_at: row.get(3)?,
        })
    }
}

impl FromRow for WebhookLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookLog {
            id: row.get(0)?,
            gateway: row.get(1)?,
            payload: row.get(2)?,
            signature: row.get(3)?,
            verified: row.get::<_, i32>(4)? != 0,
            received_at: row.get(5)?,
        })
    }
}

impl FromRow for Invoice {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Invoice {
            id: row.get(0)?,
            payment_id: row.get(1)?,
            student_id: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            issued_at: row.get(5)?,
        })
    }
}
