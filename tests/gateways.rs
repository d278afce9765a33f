//! Webhook signature verification and parsing tests for the gateway adapters.

mod common;

use common::*;
use coursepay::gateways::{RazorpayClient, StripeClient};

// ============ Razorpay Signature Verification Tests ============

fn create_razorpay_test_client() -> RazorpayClient {
    let config = RazorpayConfig {
        key_id: "rzp_test_xxx".to_string(),
        key_secret: "secret_xxx".to_string(),
        webhook_secret: "rzp_webhook_secret".to_string(),
    };
    RazorpayClient::new(&config)
}

fn compute_razorpay_signature(payload: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[test]
fn test_razorpay_valid_signature() {
    let client = create_razorpay_test_client();
    let payload = b"{\"event\":\"payment.captured\"}";
    let signature = compute_razorpay_signature(payload, "rzp_webhook_secret");

    let result = client
        .verify_webhook_signature(payload, &signature)
        .expect("Verification should not error");

    assert!(result, "Valid signature should be accepted");
}

#[test]
fn test_razorpay_invalid_signature() {
    let client = create_razorpay_test_client();
    let payload = b"{\"event\":\"payment.captured\"}";
    let signature = compute_razorpay_signature(payload, "wrong_secret");

    let result = client
        .verify_webhook_signature(payload, &signature)
        .expect("Verification should not error");

    assert!(!result, "Invalid signature should be rejected");
}

#[test]
fn test_razorpay_modified_payload() {
    let client = create_razorpay_test_client();
    let original = b"{\"event\":\"payment.captured\"}";
    let modified = b"{\"event\":\"payment.captured\",\"hacked\":true}";
    let signature = compute_razorpay_signature(original, "rzp_webhook_secret");

    let result = client
        .verify_webhook_signature(modified, &signature)
        .expect("Verification should not error");

    assert!(!result, "Modified payload should be rejected");
}

#[test]
fn test_razorpay_wrong_length_signature() {
    let client = create_razorpay_test_client();
    let payload = b"{\"event\":\"payment.captured\"}";

    let result = client
        .verify_webhook_signature(payload, "deadbeef")
        .expect("Verification should not error");

    assert!(!result, "Truncated signature should be rejected");
}

#[tokio::test]
async fn test_razorpay_refund_rejects_unrepresentable_amount() {
    let client = create_razorpay_test_client();

    // Paise conversion overflows i64; must fail before any network call.
    let result = client.refund("pay_ABC123", i64::MAX).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

// ============ Razorpay Webhook Parsing Tests ============

#[test]
fn test_razorpay_parse_payment_captured() {
    let client = create_razorpay_test_client();
    let payload = serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_ABC123",
                    "order_id": "order_XYZ789",
                    "method": "upi"
                }
            }
        }
    });

    let event = client
        .parse_webhook(payload.to_string().as_bytes())
        .expect("Parsing should succeed");

    match event {
        WebhookEvent::PaymentCaptured {
            order_id,
            gateway_payment_id,
            method,
        } => {
            assert_eq!(order_id, "order_XYZ789");
            assert_eq!(gateway_payment_id, "pay_ABC123");
            assert_eq!(method.as_deref(), Some("upi"));
        }
        other => panic!("Expected PaymentCaptured, got {:?}", other),
    }
}

#[test]
fn test_razorpay_parse_ignores_other_events() {
    let client = create_razorpay_test_client();
    let payload = serde_json::json!({
        "event": "payment.failed",
        "payload": {}
    });

    let event = client
        .parse_webhook(payload.to_string().as_bytes())
        .expect("Parsing should succeed");
    assert!(matches!(event, WebhookEvent::Ignored));
}

#[test]
fn test_razorpay_parse_ignores_captured_without_order_id() {
    let client = create_razorpay_test_client();
    let payload = serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": { "id": "pay_ABC123" }
            }
        }
    });

    let event = client
        .parse_webhook(payload.to_string().as_bytes())
        .expect("Parsing should succeed");
    assert!(matches!(event, WebhookEvent::Ignored));
}

// ============ Stripe Signature Verification Tests ============

fn create_stripe_test_client() -> StripeClient {
    let config = StripeConfig {
        secret_key: "sk_test_xxx".to_string(),
        webhook_secret: "whsec_test_secret".to_string(),
    };
    StripeClient::new(&config)
}

fn current_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

fn compute_stripe_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[test]
fn test_stripe_valid_signature() {
    let client = create_stripe_test_client();
    let payload = b"{\"type\":\"payment_intent.succeeded\"}";
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(payload, "whsec_test_secret", &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(result, "Valid signature should be accepted");
}

#[test]
fn test_stripe_invalid_signature() {
    let client = create_stripe_test_client();
    let payload = b"{\"type\":\"payment_intent.succeeded\"}";
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(payload, "wrong_secret", &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(!result, "Invalid signature should be rejected");
}

#[test]
fn test_stripe_old_timestamp_rejected() {
    let client = create_stripe_test_client();
    let payload = b"{\"type\":\"payment_intent.succeeded\"}";
    // 10 minutes ago - beyond the 5-minute tolerance.
    let timestamp = (chrono::Utc::now().timestamp() - 600).to_string();
    let signature = compute_stripe_signature(payload, "whsec_test_secret", &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(!result, "Stale timestamp should be rejected");
}

#[test]
fn test_stripe_future_timestamp_rejected() {
    let client = create_stripe_test_client();
    let payload = b"{\"type\":\"payment_intent.succeeded\"}";
    // Well beyond the 60-second clock skew allowance.
    let timestamp = (chrono::Utc::now().timestamp() + 600).to_string();
    let signature = compute_stripe_signature(payload, "whsec_test_secret", &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(!result, "Future timestamp should be rejected");
}

#[test]
fn test_stripe_malformed_signature_header() {
    let client = create_stripe_test_client();
    let payload = b"{\"type\":\"payment_intent.succeeded\"}";

    let result = client.verify_webhook_signature(payload, "garbage");
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn test_stripe_non_numeric_timestamp() {
    let client = create_stripe_test_client();
    let payload = b"{\"type\":\"payment_intent.succeeded\"}";

    let result = client.verify_webhook_signature(payload, "t=abc,v1=deadbeef");
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_stripe_refund_rejects_unrepresentable_amount() {
    let client = create_stripe_test_client();

    let result = client.refund("ch_XYZ789", i64::MAX).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

// ============ Stripe Webhook Parsing Tests ============

#[test]
fn test_stripe_parse_payment_intent_succeeded() {
    let client = create_stripe_test_client();
    let payload = serde_json::json!({
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": "pi_ABC123",
                "latest_charge": "ch_XYZ789",
                "payment_method_types": ["card"]
            }
        }
    });

    let event = client
        .parse_webhook(payload.to_string().as_bytes())
        .expect("Parsing should succeed");

    match event {
        WebhookEvent::PaymentCaptured {
            order_id,
            gateway_payment_id,
            method,
        } => {
            assert_eq!(order_id, "pi_ABC123");
            assert_eq!(gateway_payment_id, "ch_XYZ789");
            assert_eq!(method.as_deref(), Some("card"));
        }
        other => panic!("Expected PaymentCaptured, got {:?}", other),
    }
}

#[test]
fn test_stripe_parse_falls_back_to_intent_id() {
    let client = create_stripe_test_client();
    let payload = serde_json::json!({
        "type": "payment_intent.succeeded",
        "data": {
            "object": { "id": "pi_ABC123" }
        }
    });

    let event = client
        .parse_webhook(payload.to_string().as_bytes())
        .expect("Parsing should succeed");

    match event {
        WebhookEvent::PaymentCaptured {
            gateway_payment_id, ..
        } => assert_eq!(gateway_payment_id, "pi_ABC123"),
        other => panic!("Expected PaymentCaptured, got {:?}", other),
    }
}

#[test]
fn test_stripe_parse_ignores_other_events() {
    let client = create_stripe_test_client();
    let payload = serde_json::json!({
        "type": "charge.refunded",
        "data": { "object": {} }
    });

    let event = client
        .parse_webhook(payload.to_string().as_bytes())
        .expect("Parsing should succeed");
    assert!(matches!(event, WebhookEvent::Ignored));
}
