use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};
use crate::models::StripeConfig;

use super::{Gateway, GatewayAdapter, GatewayOrder, GatewayRefund, OrderRequest, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct CreateIntentResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateRefundResponse {
    id: String,
}

/// Generic Stripe webhook event - object is parsed based on event_type.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub latest_charge: Option<String>,
    pub payment_method_types: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;
}

#[async_trait]
impl GatewayAdapter for StripeClient {
    fn gateway(&self) -> Gateway {
        Gateway::Stripe
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder> {
        // Stripe amounts are in the smallest currency unit
        let amount_minor = super::to_minor_units(request.amount)?.to_string();
        let currency = request.currency.to_lowercase();

        let response = self
            .client
            .post("https://api.stripe.com/v1/payment_intents")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("amount", amount_minor.as_str()),
                ("currency", currency.as_str()),
                ("metadata[coursepay_payment_id]", request.receipt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))?;
        let intent: CreateIntentResponse = serde_json::from_value(raw.clone())?;

        Ok(GatewayOrder {
            order_id: intent.id,
            raw,
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        // Stripe signature format: t=timestamp,v1=signature
        let parts: Vec<&str> = signature.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str = timestamp
            .ok_or_else(|| AppError::Validation(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::Validation(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        // Reject stale timestamps to prevent replay attacks.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::Validation(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
        if age < -60 {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks. Signature
        // length is not secret (always 64 hex chars for SHA-256), so the
        // length check is fine.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookEvent> {
        let event: StripeWebhookEvent = serde_json::from_slice(payload)?;

        if event.event_type != "payment_intent.succeeded" {
            return Ok(WebhookEvent::Ignored);
        }

        let intent: StripePaymentIntent = serde_json::from_value(event.data.object)?;

        // The intent id doubles as our stored order id; the charge id is the
        // refundable payment reference.
        let gateway_payment_id = intent.latest_charge.unwrap_or_else(|| intent.id.clone());
        let method = intent
            .payment_method_types
            .and_then(|types| types.into_iter().next());

        Ok(WebhookEvent::PaymentCaptured {
            order_id: intent.id,
            gateway_payment_id,
            method,
        })
    }

    async fn refund(&self, gateway_payment_id: &str, amount: i64) -> Result<GatewayRefund> {
        let amount_minor = super::to_minor_units(amount)?.to_string();

        let response = self
            .client
            .post("https://api.stripe.com/v1/refunds")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("charge", gateway_payment_id),
                ("amount", amount_minor.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Stripe refund rejected: {}",
                error_text
            )));
        }

        let refund: CreateRefundResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(GatewayRefund {
            refund_id: refund.id,
        })
    }
}
