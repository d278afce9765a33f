use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{msg, OptionExt, Result};
use crate::extractors::{Json, Path};
use crate::models::{CreateSubscription, Subscription, SubscriptionEvent};
use crate::services::subscriptions;

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Envelope for transitions that carry no new ids (cancel, pause, resume).
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionDetail {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub events: Vec<SubscriptionEvent>,
}

fn subscription_envelope(
    result: Result<subscriptions::SubscriptionReceipt>,
) -> (StatusCode, Json<SubscriptionResponse>) {
    match result {
        Ok(receipt) => (
            StatusCode::OK,
            Json(SubscriptionResponse {
                success: true,
                subscription_id: Some(receipt.subscription_id),
                payment_id: Some(receipt.payment_id),
                error: None,
            }),
        ),
        Err(e) => (
            e.status(),
            Json(SubscriptionResponse {
                success: false,
                subscription_id: None,
                payment_id: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

fn transition_envelope(result: Result<()>) -> (StatusCode, Json<TransitionResponse>) {
    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(TransitionResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => (
            e.status(),
            Json(TransitionResponse {
                success: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Json(request): Json<CreateSubscription>,
) -> (StatusCode, Json<SubscriptionResponse>) {
    subscription_envelope(subscriptions::create_subscription(&state, &request).await)
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionDetail>> {
    let conn = state.db.get()?;
    let subscription =
        queries::get_subscription(&conn, &id).or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;
    let events = queries::list_subscription_events(&conn, &id)?;
    Ok(Json(SubscriptionDetail {
        subscription,
        events,
    }))
}

pub async fn renew_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<SubscriptionResponse>) {
    subscription_envelope(subscriptions::renew_subscription(&state, &id).await)
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<TransitionResponse>) {
    transition_envelope(subscriptions::cancel_subscription(&state, &id))
}

pub async fn pause_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<TransitionResponse>) {
    transition_envelope(subscriptions::pause_subscription(&state, &id))
}

pub async fn resume_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<TransitionResponse>) {
    transition_envelope(subscriptions::resume_subscription(&state, &id))
}
