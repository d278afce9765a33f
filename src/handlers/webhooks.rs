//! Gateway webhook endpoints.
//!
//! Providers retry aggressively on non-2xx responses, so these handlers
//! always answer 200. Failures are logged and the raw delivery is kept in
//! `payment_webhooks` for inspection.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::db::AppState;
use crate::gateways::Gateway;
use crate::services::payments;

const RAZORPAY_SIGNATURE_HEADER: &str = "x-razorpay-signature";
const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn apply(state: &AppState, gateway: Gateway, headers: &HeaderMap, body: &Bytes) -> StatusCode {
    let signature = header_str(
        headers,
        match gateway {
            Gateway::Razorpay => RAZORPAY_SIGNATURE_HEADER,
            Gateway::Stripe => STRIPE_SIGNATURE_HEADER,
            Gateway::Wallet => return StatusCode::OK,
        },
    );

    if let Err(e) = payments::handle_webhook(state, gateway, body, signature) {
        tracing::warn!("{} webhook rejected: {}", gateway, e);
    }
    StatusCode::OK
}

pub async fn handle_razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    apply(&state, Gateway::Razorpay, &headers, &body)
}

pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    apply(&state, Gateway::Stripe, &headers, &body)
}
