//! Payment orchestrator.
//!
//! Single entry point for creating payments, processing refunds and applying
//! gateway webhooks. A pending payment row is always inserted before any
//! gateway is contacted; if the gateway call fails the row stays pending and
//! is swept to `failed` by [`expire_pending_payments`] once its deadline
//! passes.

use chrono::Utc;

use crate::db::{ledger, queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::gateways::{Gateway, OrderRequest, WebhookEvent};
use crate::models::{CreatePayment, CreateRefund, PaymentStatus};
use crate::services::wallet;

/// How long a client has to complete a pending gateway payment.
pub const PENDING_PAYMENT_TTL_SECS: i64 = 15 * 60;

#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub payment_id: String,
    /// Gateway order/intent id; absent for wallet payments, which complete
    /// immediately.
    pub order_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub gateway_refund_id: Option<String>,
}

fn validate(input: &CreatePayment) -> Result<()> {
    if input.amount <= 0 {
        return Err(AppError::Validation(msg::INVALID_AMOUNT.into()));
    }
    if input.currency.len() != 3 || !input.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::Validation(msg::INVALID_CURRENCY.into()));
    }
    if input.student_id.trim().is_empty() {
        return Err(AppError::Validation(msg::INVALID_STUDENT_ID.into()));
    }
    Ok(())
}

/// Create a payment and dispatch it to the requested gateway.
///
/// On adapter failure the payment row is left pending rather than rolled
/// back; a record of the attempt is worth more than strict atomicity here.
pub async fn create_payment(state: &AppState, input: &CreatePayment) -> Result<PaymentReceipt> {
    validate(input)?;

    let payment = {
        let conn = state.db.get()?;
        queries::create_payment(&conn, input)?
    };

    match input.gateway {
        Gateway::Wallet => {
            let mut conn = state.db.get()?;
            wallet::pay_with_wallet(&mut conn, &payment)?;
            tracing::info!("Payment {} completed from wallet", payment.id);
            Ok(PaymentReceipt {
                payment_id: payment.id,
                order_id: None,
            })
        }
        gateway => {
            let adapter = state
                .gateways
                .adapter(gateway)
                .ok_or_else(|| AppError::Gateway(msg::GATEWAY_NOT_CONFIGURED.into()))?;

            let request = OrderRequest {
                amount: payment.amount,
                currency: payment.currency.clone(),
                receipt: payment.id.clone(),
                notes: input.metadata.clone(),
            };
            let order = adapter.create_order(&request).await?;

            let conn = state.db.get()?;
            let expires_at = Utc::now().timestamp() + PENDING_PAYMENT_TTL_SECS;
            queries::set_payment_order(&conn, &payment.id, &order.order_id, expires_at)?;

            tracing::info!(
                "Payment {} awaiting {} order {}",
                payment.id,
                gateway,
                order.order_id
            );
            Ok(PaymentReceipt {
                payment_id: payment.id,
                order_id: Some(order.order_id),
            })
        }
    }
}

/// Refund a completed payment.
///
/// The ledger-side refund row is written first; the gateway call follows.
/// If the gateway call fails the refund stays pending - reconciling the two
/// is an operational task, not an automatic reversal.
pub async fn process_refund(
    state: &AppState,
    payment_id: &str,
    input: &CreateRefund,
) -> Result<RefundReceipt> {
    let mut conn = state.db.get()?;

    let payment = queries::get_payment(&conn, payment_id).or_not_found(msg::PAYMENT_NOT_FOUND)?;
    if payment.status != PaymentStatus::Completed {
        return Err(AppError::InvalidState(msg::PAYMENT_NOT_COMPLETED.into()));
    }

    let refund = ledger::process_refund(
        &mut conn,
        &payment,
        input.amount,
        &input.reason,
        &input.requested_by,
    )?;

    match payment.gateway {
        Gateway::Wallet => {
            ledger::add_wallet_credits(
                &mut conn,
                &payment.student_id,
                input.amount,
                &format!("Refund for payment {}", payment.id),
                Some(&refund.id),
            )?;
            queries::mark_refund_completed(&conn, &refund.id, None)?;
            tracing::info!("Refund {} credited back to wallet", refund.id);
            Ok(RefundReceipt {
                refund_id: refund.id,
                gateway_refund_id: None,
            })
        }
        gateway => {
            let adapter = state
                .gateways
                .adapter(gateway)
                .ok_or_else(|| AppError::Gateway(msg::GATEWAY_NOT_CONFIGURED.into()))?;
            let gateway_payment_id = payment
                .gateway_payment_id
                .clone()
                .ok_or_else(|| AppError::InvalidState(msg::PAYMENT_MISSING_GATEWAY_ID.into()))?;

            let gateway_refund = adapter.refund(&gateway_payment_id, input.amount).await?;
            queries::mark_refund_completed(&conn, &refund.id, Some(&gateway_refund.refund_id))?;

            tracing::info!(
                "Refund {} confirmed by {} as {}",
                refund.id,
                gateway,
                gateway_refund.refund_id
            );
            Ok(RefundReceipt {
                refund_id: refund.id,
                gateway_refund_id: Some(gateway_refund.refund_id),
            })
        }
    }
}

/// Apply an inbound gateway webhook.
///
/// The raw payload is logged before verification so every delivery can be
/// inspected. Verification failures and unmatched orders leave all payment
/// state untouched; the HTTP layer still answers 200 to the provider.
pub fn handle_webhook(
    state: &AppState,
    gateway: Gateway,
    payload: &[u8],
    signature: Option<&str>,
) -> Result<()> {
    let conn = state.db.get()?;

    let log_id = queries::log_webhook(
        &conn,
        gateway,
        &String::from_utf8_lossy(payload),
        signature,
    )?;

    let adapter = state
        .gateways
        .adapter(gateway)
        .ok_or_else(|| AppError::Gateway(msg::GATEWAY_NOT_CONFIGURED.into()))?;

    let signature = signature.ok_or(AppError::InvalidSignature)?;
    if !adapter.verify_webhook_signature(payload, signature)? {
        return Err(AppError::InvalidSignature);
    }
    queries::mark_webhook_verified(&conn, &log_id)?;

    match adapter.parse_webhook(payload)? {
        WebhookEvent::Ignored => Ok(()),
        WebhookEvent::PaymentCaptured {
            order_id,
            gateway_payment_id,
            method,
        } => {
            let payment = match queries::get_payment_by_order_id(&conn, gateway, &order_id)? {
                Some(p) => p,
                None => {
                    tracing::warn!("No payment matches {} order {}", gateway, order_id);
                    return Ok(());
                }
            };
            if payment.status == PaymentStatus::Completed {
                tracing::debug!("Webhook replay for completed payment {}", payment.id);
                return Ok(());
            }

            let method = method.unwrap_or_else(|| gateway.as_str().to_string());
            let completed = match queries::mark_payment_completed(
                &conn,
                &payment.id,
                Some(&gateway_payment_id),
                &method,
                true,
            )? {
                Some(p) => Some(p),
                None => {
                    // The expiry sweep may have failed the row before this
                    // delivery arrived; the provider still captured the
                    // money, so revive the payment rather than dropping it.
                    let revived = queries::recover_expired_payment(
                        &conn,
                        &payment.id,
                        Some(&gateway_payment_id),
                        &method,
                    )?;
                    if let Some(ref p) = revived {
                        tracing::warn!(
                            "Late {} capture for payment {} recovered after expiry",
                            gateway,
                            p.id
                        );
                    }
                    revived
                }
            };

            match completed {
                Some(completed) => {
                    ledger::create_invoice_for_payment(&conn, &completed)?;
                    tracing::info!(
                        "Payment {} completed via {} webhook ({})",
                        completed.id,
                        gateway,
                        gateway_payment_id
                    );
                }
                None => {
                    tracing::warn!(
                        "Capture webhook for payment {} could not be applied from status {}",
                        payment.id,
                        payment.status
                    );
                }
            }
            Ok(())
        }
    }
}

/// Sweep pending payments whose completion deadline has passed. Run from an
/// external scheduler.
pub fn expire_pending_payments(state: &AppState) -> Result<usize> {
    let conn = state.db.get()?;
    let swept = queries::expire_pending_payments(&conn, Utc::now().timestamp())?;
    if swept > 0 {
        tracing::info!("Expired {} stale pending payments", swept);
    }
    Ok(swept)
}
