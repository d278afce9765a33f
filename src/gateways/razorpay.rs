use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};
use crate::models::RazorpayConfig;

use super::{Gateway, GatewayAdapter, GatewayOrder, GatewayRefund, OrderRequest, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateRefundResponse {
    id: String,
}

/// Razorpay webhook envelope. Only `payment.captured` is acted on; the
/// entity carries the order id used to match our pending payment.
#[derive(Debug, Deserialize)]
pub struct RazorpayWebhookEvent {
    pub event: String,
    pub payload: RazorpayWebhookPayload,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayWebhookPayload {
    pub payment: Option<RazorpayPaymentWrapper>,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayPaymentWrapper {
    pub entity: RazorpayPaymentEntity,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayPaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RazorpayClient {
    client: Client,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

impl RazorpayClient {
    pub fn new(config: &RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }
}

#[async_trait]
impl GatewayAdapter for RazorpayClient {
    fn gateway(&self) -> Gateway {
        Gateway::Razorpay
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder> {
        let body = serde_json::json!({
            // Razorpay amounts are in paise
            "amount": super::to_minor_units(request.amount)?,
            "currency": request.currency,
            "receipt": request.receipt,
            "notes": request.notes.clone().unwrap_or_else(|| serde_json::json!({})),
        });

        let response = self
            .client
            .post("https://api.razorpay.com/v1/orders")
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Razorpay API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Razorpay API error: {}",
                error_text
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Razorpay response: {}", e)))?;
        let order: CreateOrderResponse = serde_json::from_value(raw.clone())?;

        Ok(GatewayOrder {
            order_id: order.id,
            raw,
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        // HMAC-SHA256 over the raw JSON body, hex-encoded in the
        // x-razorpay-signature header.
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = signature.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookEvent> {
        let event: RazorpayWebhookEvent = serde_json::from_slice(payload)?;

        if event.event != "payment.captured" {
            return Ok(WebhookEvent::Ignored);
        }

        let entity = match event.payload.payment {
            Some(wrapper) => wrapper.entity,
            None => return Ok(WebhookEvent::Ignored),
        };
        let order_id = match entity.order_id {
            Some(id) => id,
            None => return Ok(WebhookEvent::Ignored),
        };

        Ok(WebhookEvent::PaymentCaptured {
            order_id,
            gateway_payment_id: entity.id,
            method: entity.method,
        })
    }

    async fn refund(&self, gateway_payment_id: &str, amount: i64) -> Result<GatewayRefund> {
        let body = serde_json::json!({ "amount": super::to_minor_units(amount)? });

        let response = self
            .client
            .post(format!(
                "https://api.razorpay.com/v1/payments/{}/refund",
                gateway_payment_id
            ))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Razorpay API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Razorpay refund rejected: {}",
                error_text
            )));
        }

        let refund: CreateRefundResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Razorpay response: {}", e)))?;

        Ok(GatewayRefund {
            refund_id: refund.id,
        })
    }
}
