//! Atomic ledger procedures.
//!
//! These were remote stored procedures in the original deployment; here they
//! are explicit SQLite transactions with pinned semantics:
//!
//! - `use_wallet_credits`: single conditional UPDATE, so concurrent debits
//!   cannot lose updates or partially debit.
//! - `process_refund`: the refundable-balance check and the refund row are
//!   written in one transaction.
//! - `create_invoice_for_payment`: idempotent per payment via the UNIQUE
//!   constraint on `invoices.payment_id`.

use rusqlite::{params, Connection};

use crate::error::{msg, AppError, Result};
use crate::models::{Payment, Refund, RefundStatus, Wallet, WalletTransactionKind};

use super::from_row::{FromRow, WALLET_COLS};
use super::queries::{gen_id, now};

/// Debit `amount` credits from the user's wallet and append the matching
/// ledger entry. Returns the debited amount.
///
/// The debit is a single conditional UPDATE; it either debits the full
/// amount or touches nothing, so there are no partial debits and no lost
/// updates under concurrency.
pub fn use_wallet_credits(
    conn: &mut Connection,
    user_id: &str,
    amount: i64,
    description: &str,
    reference_id: Option<&str>,
) -> Result<i64> {
    if amount <= 0 {
        return Err(AppError::Ledger(format!(
            "Debit amount must be positive, got {}",
            amount
        )));
    }

    let tx = conn.transaction()?;

    let affected = tx.execute(
        "UPDATE wallets SET credits = credits - ?2, updated_at = ?3
         WHERE user_id = ?1 AND credits >= ?2",
        params![user_id, amount, now()],
    )?;

    if affected == 0 {
        // Distinguish a missing wallet from an insufficient one.
        let wallet: Option<Wallet> = tx
            .query_row(
                &format!("SELECT {} FROM wallets WHERE user_id = ?1", WALLET_COLS),
                params![user_id],
                Wallet::from_row,
            )
            .ok();
        return match wallet {
            Some(w) => Err(AppError::InsufficientBalance {
                available: w.credits,
                required: amount,
            }),
            None => Err(AppError::NotFound(msg::WALLET_NOT_FOUND.into())),
        };
    }

    let wallet_id: String = tx.query_row(
        "SELECT id FROM wallets WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;

    insert_wallet_transaction(
        &tx,
        &wallet_id,
        WalletTransactionKind::Debit,
        amount,
        description,
        reference_id,
    )?;

    tx.commit()?;
    Ok(amount)
}

/// Credit `amount` to the user's wallet with a ledger entry (top-ups and
/// wallet-path refunds).
pub fn add_wallet_credits(
    conn: &mut Connection,
    user_id: &str,
    amount: i64,
    description: &str,
    reference_id: Option<&str>,
) -> Result<()> {
    if amount <= 0 {
        return Err(AppError::Ledger(format!(
            "Credit amount must be positive, got {}",
            amount
        )));
    }

    let tx = conn.transaction()?;

    let affected = tx.execute(
        "UPDATE wallets SET credits = credits + ?2, updated_at = ?3 WHERE user_id = ?1",
        params![user_id, amount, now()],
    )?;
    if affected == 0 {
        return Err(AppError::NotFound(msg::WALLET_NOT_FOUND.into()));
    }

    let wallet_id: String = tx.query_row(
        "SELECT id FROM wallets WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;

    insert_wallet_transaction(
        &tx,
        &wallet_id,
        WalletTransactionKind::Credit,
        amount,
        description,
        reference_id,
    )?;

    tx.commit()?;
    Ok(())
}

fn insert_wallet_transaction(
    conn: &Connection,
    wallet_id: &str,
    kind: WalletTransactionKind,
    amount: i64,
    description: &str,
    reference_id: Option<&str>,
) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO wallet_transactions (id, wallet_id, kind, amount, description,
                                          reference_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &id,
            wallet_id,
            kind.as_str(),
            amount,
            description,
            reference_id,
            now()
        ],
    )?;
    Ok(id)
}

/// Record a refund against a completed payment. Checks the refundable
/// balance and inserts the `pending` refund row in one transaction; the
/// gateway-side money movement happens after, and completion is recorded
/// separately.
pub fn process_refund(
    conn: &mut Connection,
    payment: &Payment,
    amount: i64,
    reason: &str,
    requested_by: &str,
) -> Result<Refund> {
    if amount <= 0 {
        return Err(AppError::Validation(msg::INVALID_AMOUNT.into()));
    }

    let tx = conn.transaction()?;

    let already_refunded: i64 = tx.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM refunds WHERE payment_id = ?1",
        params![&payment.id],
        |row| row.get(0),
    )?;

    if already_refunded + amount > payment.amount {
        return Err(AppError::Validation(msg::INVALID_REFUND_AMOUNT.into()));
    }

    let id = gen_id();
    let created_at = now();
    tx.execute(
        "INSERT INTO refunds (id, payment_id, amount, reason, requested_by, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        params![&id, &payment.id, amount, reason, requested_by, created_at],
    )?;

    tx.commit()?;

    Ok(Refund {
        id,
        payment_id: payment.id.clone(),
        amount,
        reason: reason.to_string(),
        requested_by: requested_by.to_string(),
        status: RefundStatus::Pending,
        gateway_refund_id: None,
        processed_at: None,
        created_at,
    })
}

/// Issue an invoice for a completed payment. Safe to call more than once
/// for the same payment; replays are ignored.
pub fn create_invoice_for_payment(conn: &Connection, payment: &Payment) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO invoices (id, payment_id, student_id, amount, currency, issued_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            gen_id(),
            &payment.id,
            &payment.student_id,
            payment.amount,
            &payment.currency,
            now()
        ],
    )?;
    Ok(())
}
