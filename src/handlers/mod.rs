pub mod payments;
pub mod subscriptions;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::db::AppState;

/// Assemble the full route table.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/payments", post(payments::create_payment))
        .route("/payments/{id}", get(payments::get_payment))
        .route("/payments/{id}/refund", post(payments::refund_payment))
        .route("/subscriptions", post(subscriptions::create_subscription))
        .route("/subscriptions/{id}", get(subscriptions::get_subscription))
        .route(
            "/subscriptions/{id}/renew",
            post(subscriptions::renew_subscription),
        )
        .route(
            "/subscriptions/{id}/cancel",
            post(subscriptions::cancel_subscription),
        )
        .route(
            "/subscriptions/{id}/pause",
            post(subscriptions::pause_subscription),
        )
        .route(
            "/subscriptions/{id}/resume",
            post(subscriptions::resume_subscription),
        )
        .route("/webhooks/razorpay", post(webhooks::handle_razorpay_webhook))
        .route("/webhooks/stripe", post(webhooks::handle_stripe_webhook))
        .with_state(state)
}
