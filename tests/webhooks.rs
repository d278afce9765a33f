//! End-to-end webhook processing tests: verification gates payment
//! completion, replays are no-ops, and the HTTP surface always answers 200.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use coursepay::gateways::RazorpayClient;
use coursepay::handlers;
use coursepay::services::payments;
use tower::util::ServiceExt;

const WEBHOOK_SECRET: &str = "rzp_webhook_secret";

fn razorpay_state() -> AppState {
    let config = RazorpayConfig {
        key_id: "rzp_test_xxx".to_string(),
        key_secret: "secret_xxx".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
    };
    setup_test_state_with(vec![Arc::new(RazorpayClient::new(&config))])
}

/// Insert a pending payment already linked to a gateway order, as it looks
/// while the student is on the provider's checkout page.
fn pending_payment_with_order(state: &AppState, order_id: &str) -> Payment {
    let conn = state.db.get().unwrap();
    let payment = queries::create_payment(
        &conn,
        &CreatePayment {
            gateway: Gateway::Razorpay,
            amount: 500,
            currency: "INR".to_string(),
            student_id: "s1".to_string(),
            description: None,
            course_id: Some("c1".to_string()),
            subscription_id: None,
            enrollment_id: None,
            metadata: None,
        },
    )
    .unwrap();
    let deadline = chrono::Utc::now().timestamp() + 900;
    queries::set_payment_order(&conn, &payment.id, order_id, deadline).unwrap();
    payment
}

fn captured_payload(order_id: &str) -> Vec<u8> {
    serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_LIVE1",
                    "order_id": order_id,
                    "method": "upi"
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

fn sign(payload: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn webhook_logs(state: &AppState) -> Vec<WebhookLog> {
    let conn = state.db.get().unwrap();
    queries::list_webhook_logs(&conn, Gateway::Razorpay).unwrap()
}

// ============ Service-level processing ============

#[test]
fn valid_webhook_completes_payment_and_issues_invoice() {
    let state = razorpay_state();
    let payment = pending_payment_with_order(&state, "order_A");
    let payload = captured_payload("order_A");
    let signature = sign(&payload);

    payments::handle_webhook(&state, Gateway::Razorpay, &payload, Some(&signature))
        .expect("Webhook should be accepted");

    let updated = get_payment(&state, &payment.id);
    assert_eq!(updated.status, PaymentStatus::Completed);
    assert!(updated.webhook_verified);
    assert_eq!(updated.gateway_payment_id.as_deref(), Some("pay_LIVE1"));
    assert_eq!(updated.payment_method.as_deref(), Some("upi"));
    assert!(invoice_for_payment(&state, &payment.id).is_some());

    let logs = webhook_logs(&state);
    assert_eq!(logs.len(), 1);
    assert!(logs[0].verified, "Delivery should be marked verified");
}

#[test]
fn invalid_signature_never_completes_payment() {
    let state = razorpay_state();
    let payment = pending_payment_with_order(&state, "order_A");
    let payload = captured_payload("order_A");

    let result =
        payments::handle_webhook(&state, Gateway::Razorpay, &payload, Some("bogus-signature"));
    assert!(matches!(result, Err(AppError::InvalidSignature)));

    let updated = get_payment(&state, &payment.id);
    assert_eq!(updated.status, PaymentStatus::Pending);
    assert!(!updated.webhook_verified);
    assert!(invoice_for_payment(&state, &payment.id).is_none());

    // The raw delivery is still on record, unverified.
    let logs = webhook_logs(&state);
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].verified);
}

#[test]
fn missing_signature_is_rejected() {
    let state = razorpay_state();
    let payment = pending_payment_with_order(&state, "order_A");
    let payload = captured_payload("order_A");

    let result = payments::handle_webhook(&state, Gateway::Razorpay, &payload, None);
    assert!(matches!(result, Err(AppError::InvalidSignature)));
    assert_eq!(get_payment(&state, &payment.id).status, PaymentStatus::Pending);
}

#[test]
fn replayed_webhook_is_a_noop() {
    let state = razorpay_state();
    let payment = pending_payment_with_order(&state, "order_A");
    let payload = captured_payload("order_A");
    let signature = sign(&payload);

    payments::handle_webhook(&state, Gateway::Razorpay, &payload, Some(&signature)).unwrap();
    let after_first = get_payment(&state, &payment.id);

    // Same delivery again.
    payments::handle_webhook(&state, Gateway::Razorpay, &payload, Some(&signature))
        .expect("Replay should be accepted quietly");

    let after_second = get_payment(&state, &payment.id);
    assert_eq!(after_second.status, PaymentStatus::Completed);
    assert_eq!(after_second.payment_date, after_first.payment_date);
    assert!(invoice_for_payment(&state, &payment.id).is_some());
}

#[test]
fn webhook_for_unknown_order_is_accepted_without_changes() {
    let state = razorpay_state();
    let payment = pending_payment_with_order(&state, "order_A");
    let payload = captured_payload("order_SOMEONE_ELSES");
    let signature = sign(&payload);

    payments::handle_webhook(&state, Gateway::Razorpay, &payload, Some(&signature))
        .expect("Unmatched order should not be an error");
    assert_eq!(get_payment(&state, &payment.id).status, PaymentStatus::Pending);
}

#[test]
fn irrelevant_event_types_are_ignored() {
    let state = razorpay_state();
    let payment = pending_payment_with_order(&state, "order_A");
    let payload = serde_json::json!({
        "event": "payment.authorized",
        "payload": {
            "payment": {
                "entity": { "id": "pay_LIVE1", "order_id": "order_A" }
            }
        }
    })
    .to_string()
    .into_bytes();
    let signature = sign(&payload);

    payments::handle_webhook(&state, Gateway::Razorpay, &payload, Some(&signature)).unwrap();
    assert_eq!(get_payment(&state, &payment.id).status, PaymentStatus::Pending);
}

#[test]
fn late_capture_after_expiry_sweep_recovers_payment() {
    let state = razorpay_state();
    let payment = pending_payment_with_order(&state, "order_A");

    // The deadline passes and the sweep fails the payment before the
    // provider's delivery arrives.
    {
        let conn = state.db.get().unwrap();
        let past = chrono::Utc::now().timestamp() - 60;
        conn.execute(
            "UPDATE payments SET expires_at = ?1 WHERE id = ?2",
            rusqlite::params![past, payment.id],
        )
        .unwrap();
    }
    assert_eq!(payments::expire_pending_payments(&state).unwrap(), 1);
    assert_eq!(get_payment(&state, &payment.id).status, PaymentStatus::Failed);

    // The capture was real; the late delivery must still complete the payment.
    let payload = captured_payload("order_A");
    let signature = sign(&payload);
    payments::handle_webhook(&state, Gateway::Razorpay, &payload, Some(&signature))
        .expect("Late delivery should be accepted");

    let recovered = get_payment(&state, &payment.id);
    assert_eq!(recovered.status, PaymentStatus::Completed);
    assert!(recovered.webhook_verified);
    assert_eq!(recovered.gateway_payment_id.as_deref(), Some("pay_LIVE1"));
    assert!(invoice_for_payment(&state, &payment.id).is_some());
}

// ============ HTTP surface ============

#[tokio::test]
async fn webhook_endpoint_returns_200_on_garbage() {
    let state = razorpay_state();
    let app = handlers::app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/razorpay")
                .header("content-type", "application/json")
                .body(Body::from("not even json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_endpoint_returns_200_on_bad_signature() {
    let state = razorpay_state();
    let payment = pending_payment_with_order(&state, "order_A");
    let payload = captured_payload("order_A");
    let app = handlers::app(state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/razorpay")
                .header("content-type", "application/json")
                .header("x-razorpay-signature", "bogus")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_payment(&state, &payment.id).status, PaymentStatus::Pending);
}

#[tokio::test]
async fn webhook_endpoint_completes_payment_on_valid_delivery() {
    let state = razorpay_state();
    let payment = pending_payment_with_order(&state, "order_A");
    let payload = captured_payload("order_A");
    let signature = sign(&payload);
    let app = handlers::app(state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/razorpay")
                .header("content-type", "application/json")
                .header("x-razorpay-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_payment(&state, &payment.id).status, PaymentStatus::Completed);
}

#[tokio::test]
async fn webhook_endpoint_returns_200_when_gateway_is_unconfigured() {
    // Stripe route exists but no Stripe adapter is installed.
    let state = razorpay_state();
    let app = handlers::app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/stripe")
                .header("content-type", "application/json")
                .header("stripe-signature", "t=1,v1=deadbeef")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
