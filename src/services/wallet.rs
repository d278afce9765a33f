//! Wallet ledger bridge.
//!
//! Treats a sufficient credit balance as an immediately-completed payment.
//! The balance check happens before any mutation, so an insufficient wallet
//! leaves the payment row untouched.

use rusqlite::Connection;

use crate::db::{ledger, queries};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::models::Payment;

/// Complete a pending payment by debiting the student's wallet.
pub fn pay_with_wallet(conn: &mut Connection, payment: &Payment) -> Result<Payment> {
    let wallet = queries::get_wallet_by_user(conn, &payment.student_id)
        .or_not_found(msg::WALLET_NOT_FOUND)?;

    if wallet.credits < payment.amount {
        return Err(AppError::InsufficientBalance {
            available: wallet.credits,
            required: payment.amount,
        });
    }

    let description = format!(
        "Course payment {} ({} {})",
        payment.id, payment.amount, payment.currency
    );
    let debited = ledger::use_wallet_credits(
        conn,
        &payment.student_id,
        payment.amount,
        &description,
        Some(&payment.id),
    )?;

    // The ledger debit is all-or-nothing; anything less than the requested
    // amount means the contract was violated and the payment must not
    // complete.
    if debited < payment.amount {
        return Err(AppError::Ledger(format!(
            "Partial wallet debit for payment {}: {} of {}",
            payment.id, debited, payment.amount
        )));
    }

    let completed = queries::mark_payment_completed(conn, &payment.id, None, "wallet", false)?
        .ok_or_else(|| {
            AppError::InvalidState(format!("Payment {} is not pending", payment.id))
        })?;
    ledger::create_invoice_for_payment(conn, &completed)?;

    Ok(completed)
}
