//! Subscription lifecycle manager.
//!
//! Status transitions follow a fixed graph: active -> {cancelled, paused,
//! expired}, paused -> {active}. Every transition appends exactly one
//! subscription event. Renewal sweeps and expiry sweeps are batch entry
//! points meant to be driven by an external scheduler.

use chrono::{Months, TimeZone, Utc};

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::models::{
    BillingCycle, CreatePayment, CreateSubscription, Subscription, SubscriptionStatus,
};
use crate::services::payments;

/// Maximum rows handled by one renewal sweep.
pub const RENEWAL_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct SubscriptionReceipt {
    pub subscription_id: String,
    pub payment_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: usize,
    pub failed: usize,
}

/// Advance a Unix timestamp by one billing cycle, calendar-aware. Month-end
/// dates clamp: Jan 31 + 1 month lands on Feb 28/29.
pub fn add_cycle(ts: i64, cycle: BillingCycle) -> Result<i64> {
    let dt = Utc
        .timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| AppError::Internal(format!("Invalid timestamp {}", ts)))?;
    dt.checked_add_months(Months::new(cycle.months()))
        .map(|d| d.timestamp())
        .ok_or_else(|| AppError::Internal("Billing period out of range".into()))
}

fn validate(input: &CreateSubscription) -> Result<()> {
    if input.amount <= 0 {
        return Err(AppError::Validation(msg::INVALID_AMOUNT.into()));
    }
    if input.currency.len() != 3 || !input.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::Validation(msg::INVALID_CURRENCY.into()));
    }
    if input.student_id.trim().is_empty() {
        return Err(AppError::Validation(msg::INVALID_STUDENT_ID.into()));
    }
    if input.course_id.trim().is_empty() {
        return Err(AppError::Validation("Course id must not be empty".into()));
    }
    Ok(())
}

fn initial_payment_request(sub: &Subscription) -> CreatePayment {
    CreatePayment {
        gateway: sub.gateway,
        amount: sub.amount,
        currency: sub.currency.clone(),
        student_id: sub.student_id.clone(),
        description: Some(format!(
            "{} subscription for course {}",
            sub.billing_cycle, sub.course_id
        )),
        course_id: Some(sub.course_id.clone()),
        subscription_id: Some(sub.id.clone()),
        enrollment_id: None,
        metadata: None,
    }
}

/// Create a subscription and request its initial payment.
///
/// If the payment request fails the subscription row is deleted again, so
/// no active-but-unpaid subscription persists.
pub async fn create_subscription(
    state: &AppState,
    input: &CreateSubscription,
) -> Result<SubscriptionReceipt> {
    validate(input)?;

    let subscription = {
        let conn = state.db.get()?;
        if queries::active_subscription_exists(&conn, &input.student_id, &input.course_id)? {
            return Err(AppError::InvalidState(
                msg::SUBSCRIPTION_ALREADY_ACTIVE.into(),
            ));
        }

        let period_start = Utc::now().timestamp();
        let period_end = add_cycle(period_start, input.billing_cycle)?;
        let subscription = queries::create_subscription(
            &conn,
            &queries::NewSubscription {
                input,
                period_start,
                period_end,
            },
        )?;
        queries::insert_subscription_event(
            &conn,
            &queries::NewSubscriptionEvent {
                subscription_id: &subscription.id,
                event_type: "created",
                previous_status: None,
                new_status: Some(SubscriptionStatus::Active),
                payment_id: None,
                metadata: None,
            },
        )?;
        subscription
    };

    match payments::create_payment(state, &initial_payment_request(&subscription)).await {
        Ok(receipt) => {
            tracing::info!(
                "Subscription {} created for student {} course {}",
                subscription.id,
                subscription.student_id,
                subscription.course_id
            );
            Ok(SubscriptionReceipt {
                subscription_id: subscription.id,
                payment_id: receipt.payment_id,
            })
        }
        Err(e) => {
            // Compensating delete: the initial payment never started, so the
            // subscription must not survive.
            let conn = state.db.get()?;
            queries::delete_subscription(&conn, &subscription.id)?;
            tracing::warn!(
                "Subscription {} rolled back, initial payment failed: {}",
                subscription.id,
                e
            );
            Err(e)
        }
    }
}

/// Renew an active subscription.
///
/// On payment failure the failure count is incremented and a
/// `payment_failed` event is logged, but the subscription stays active -
/// suspension is a dunning decision, not an automatic one. On success the
/// billing period advances from the previous period end, keeping the
/// billing calendar continuous even when renewal runs late.
pub async fn renew_subscription(state: &AppState, id: &str) -> Result<SubscriptionReceipt> {
    let subscription = {
        let conn = state.db.get()?;
        let sub = queries::get_subscription(&conn, id).or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;
        if sub.status != SubscriptionStatus::Active {
            return Err(AppError::InvalidState(msg::SUBSCRIPTION_NOT_ACTIVE.into()));
        }
        sub
    };

    let mut request = initial_payment_request(&subscription);
    request.description = Some(format!(
        "Renewal of {} subscription for course {}",
        subscription.billing_cycle, subscription.course_id
    ));

    match payments::create_payment(state, &request).await {
        Ok(receipt) => {
            let conn = state.db.get()?;
            let period_start = subscription.current_period_end;
            let period_end = add_cycle(period_start, subscription.billing_cycle)?;
            queries::update_subscription_period(&conn, &subscription.id, period_start, period_end)?;
            queries::insert_subscription_event(
                &conn,
                &queries::NewSubscriptionEvent {
                    subscription_id: &subscription.id,
                    event_type: "renewed",
                    previous_status: Some(SubscriptionStatus::Active),
                    new_status: Some(SubscriptionStatus::Active),
                    payment_id: Some(&receipt.payment_id),
                    metadata: None,
                },
            )?;
            tracing::info!("Subscription {} renewed", subscription.id);
            Ok(SubscriptionReceipt {
                subscription_id: subscription.id,
                payment_id: receipt.payment_id,
            })
        }
        Err(e) => {
            let conn = state.db.get()?;
            queries::increment_failed_payment_count(&conn, &subscription.id)?;
            queries::insert_subscription_event(
                &conn,
                &queries::NewSubscriptionEvent {
                    subscription_id: &subscription.id,
                    event_type: "payment_failed",
                    previous_status: Some(SubscriptionStatus::Active),
                    new_status: Some(SubscriptionStatus::Active),
                    payment_id: None,
                    metadata: Some(serde_json::json!({ "error": e.to_string() })),
                },
            )?;
            tracing::warn!("Renewal payment failed for subscription {}: {}", id, e);
            Err(e)
        }
    }
}

/// Cancel a subscription. Valid from active or paused; cancelled and
/// expired are terminal.
pub fn cancel_subscription(state: &AppState, id: &str) -> Result<()> {
    let conn = state.db.get()?;
    let sub = queries::get_subscription(&conn, id).or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;
    match sub.status {
        SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
            return Err(AppError::InvalidState(
                msg::SUBSCRIPTION_ALREADY_CLOSED.into(),
            ));
        }
        SubscriptionStatus::Active | SubscriptionStatus::Paused => {}
    }

    queries::update_subscription_status(&conn, id, SubscriptionStatus::Cancelled, false)?;
    queries::insert_subscription_event(
        &conn,
        &queries::NewSubscriptionEvent {
            subscription_id: id,
            event_type: "cancelled",
            previous_status: Some(sub.status),
            new_status: Some(SubscriptionStatus::Cancelled),
            payment_id: None,
            metadata: None,
        },
    )?;
    tracing::info!("Subscription {} cancelled", id);
    Ok(())
}

/// Pause an active subscription. Renewals stop until resumed.
pub fn pause_subscription(state: &AppState, id: &str) -> Result<()> {
    let conn = state.db.get()?;
    let sub = queries::get_subscription(&conn, id).or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;
    if sub.status != SubscriptionStatus::Active {
        return Err(AppError::InvalidState(msg::SUBSCRIPTION_NOT_ACTIVE.into()));
    }

    queries::update_subscription_status(&conn, id, SubscriptionStatus::Paused, false)?;
    queries::insert_subscription_event(
        &conn,
        &queries::NewSubscriptionEvent {
            subscription_id: id,
            event_type: "paused",
            previous_status: Some(SubscriptionStatus::Active),
            new_status: Some(SubscriptionStatus::Paused),
            payment_id: None,
            metadata: None,
        },
    )?;
    tracing::info!("Subscription {} paused", id);
    Ok(())
}

/// Resume a paused subscription. The billing period restarts at the resume
/// timestamp; unused time from the paused period is discarded.
pub fn resume_subscription(state: &AppState, id: &str) -> Result<()> {
    let conn = state.db.get()?;
    let sub = queries::get_subscription(&conn, id).or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;
    if sub.status != SubscriptionStatus::Paused {
        return Err(AppError::InvalidState(msg::SUBSCRIPTION_NOT_PAUSED.into()));
    }

    let period_start = Utc::now().timestamp();
    let period_end = add_cycle(period_start, sub.billing_cycle)?;
    queries::resume_subscription_row(&conn, id, period_start, period_end)?;
    queries::insert_subscription_event(
        &conn,
        &queries::NewSubscriptionEvent {
            subscription_id: id,
            event_type: "resumed",
            previous_status: Some(SubscriptionStatus::Paused),
            new_status: Some(SubscriptionStatus::Active),
            payment_id: None,
            metadata: None,
        },
    )?;
    tracing::info!("Subscription {} resumed", id);
    Ok(())
}

/// Renew every due subscription, isolating failures per row so one bad
/// renewal cannot abort the batch.
pub async fn process_scheduled_renewals(state: &AppState) -> Result<SweepReport> {
    let due = {
        let conn = state.db.get()?;
        queries::list_due_renewals(&conn, Utc::now().timestamp(), RENEWAL_BATCH_SIZE)?
    };

    let mut report = SweepReport::default();
    for subscription in due {
        match renew_subscription(state, &subscription.id).await {
            Ok(_) => report.processed += 1,
            Err(e) => {
                tracing::warn!("Sweep: renewal of {} failed: {}", subscription.id, e);
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        "Renewal sweep done: {} processed, {} failed",
        report.processed,
        report.failed
    );
    Ok(report)
}

/// Flip lapsed, non-renewing subscriptions to expired, one event per row.
pub fn expire_subscriptions(state: &AppState) -> Result<usize> {
    let conn = state.db.get()?;
    let lapsed = queries::list_lapsed_subscriptions(&conn, Utc::now().timestamp())?;

    let mut expired = 0;
    for sub in &lapsed {
        let result = queries::update_subscription_status(
            &conn,
            &sub.id,
            SubscriptionStatus::Expired,
            false,
        )
        .and_then(|_| {
            queries::insert_subscription_event(
                &conn,
                &queries::NewSubscriptionEvent {
                    subscription_id: &sub.id,
                    event_type: "expired",
                    previous_status: Some(SubscriptionStatus::Active),
                    new_status: Some(SubscriptionStatus::Expired),
                    payment_id: None,
                    metadata: None,
                },
            )
        });
        match result {
            Ok(_) => expired += 1,
            Err(e) => tracing::warn!("Sweep: expiring {} failed: {}", sub.id, e),
        }
    }

    if expired > 0 {
        tracing::info!("Expired {} lapsed subscriptions", expired);
    }
    Ok(expired)
}
