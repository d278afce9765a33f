//! Payment gateway adapters.
//!
//! Each remote provider implements [`GatewayAdapter`]; the orchestrator
//! resolves adapters through an immutable [`GatewaySet`] built once at
//! startup from the `payment_gateway_configs` table. The `wallet` gateway
//! has no adapter here - it is routed to the ledger bridge by the
//! orchestrator.

mod razorpay;
mod stripe;

pub use razorpay::*;
pub use stripe::*;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::error::{msg, AppError, Result};
use crate::models::{RazorpayConfig, StripeConfig};

/// Convert a major-unit amount to the provider's minor unit (paise/cents).
/// Overflow is a validation failure, not a silent wrap.
pub(crate) fn to_minor_units(amount: i64) -> Result<i64> {
    amount
        .checked_mul(100)
        .ok_or_else(|| AppError::Validation(msg::AMOUNT_OVERFLOW.into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    Razorpay,
    Stripe,
    Wallet,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Razorpay => "razorpay",
            Self::Stripe => "stripe",
            Self::Wallet => "wallet",
        }
    }
}

impl FromStr for Gateway {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "razorpay" => Ok(Self::Razorpay),
            "stripe" => Ok(Self::Stripe),
            "wallet" => Ok(Self::Wallet),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-agnostic order request. `amount` is in major currency units;
/// adapters convert to the provider's minor unit.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub amount: i64,
    pub currency: String,
    /// Internal payment id, passed through as the provider receipt/metadata
    /// so webhooks can be matched back.
    pub receipt: String,
    pub notes: Option<serde_json::Value>,
}

/// Result of a successful order/intent creation.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub order_id: String,
    pub raw: serde_json::Value,
}

/// Result of a successful gateway refund.
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub refund_id: String,
}

/// Provider-agnostic webhook event.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    /// A payment was captured by the provider.
    PaymentCaptured {
        /// Provider order/intent id used to look up the pending payment.
        order_id: String,
        /// Provider's own payment id, stored for refund linkage.
        gateway_payment_id: String,
        /// Instrument used (e.g. "card", "upi"), when the provider reports it.
        method: Option<String>,
    },
    /// Event type not relevant to payment completion.
    Ignored,
}

#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn gateway(&self) -> Gateway;

    /// Create a provider-side order/intent for the given request.
    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder>;

    /// Verify an inbound webhook signature against the raw body.
    /// Returns Ok(false) on mismatch; Err only for malformed input.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool>;

    /// Parse a verified webhook body into a provider-agnostic event.
    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookEvent>;

    /// Issue a refund against a captured payment. `amount` in major units.
    async fn refund(&self, gateway_payment_id: &str, amount: i64) -> Result<GatewayRefund>;
}

/// Immutable set of configured adapters, built once at startup and shared
/// through `AppState`.
#[derive(Clone, Default)]
pub struct GatewaySet {
    adapters: HashMap<Gateway, Arc<dyn GatewayAdapter>>,
}

impl GatewaySet {
    /// An empty set; payments through any remote gateway will fail with
    /// `GATEWAY_NOT_CONFIGURED`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load enabled configs from the store and construct the adapters.
    pub fn init(conn: &Connection) -> Result<Self> {
        let mut set = Self::default();
        for row in queries::list_enabled_gateway_configs(conn)? {
            let gateway = match row.gateway.parse::<Gateway>() {
                Ok(g) => g,
                Err(_) => {
                    tracing::warn!("Skipping unknown gateway config: {}", row.gateway);
                    continue;
                }
            };
            match gateway {
                Gateway::Razorpay => {
                    let config: RazorpayConfig = serde_json::from_str(&row.config)?;
                    set = set.with_adapter(Arc::new(RazorpayClient::new(&config)));
                }
                Gateway::Stripe => {
                    let config: StripeConfig = serde_json::from_str(&row.config)?;
                    set = set.with_adapter(Arc::new(StripeClient::new(&config)));
                }
                Gateway::Wallet => {
                    // Wallet needs no remote client.
                    continue;
                }
            }
            tracing::info!("Configured payment gateway: {}", gateway);
        }
        Ok(set)
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn GatewayAdapter>) -> Self {
        self.adapters.insert(adapter.gateway(), adapter);
        self
    }

    pub fn adapter(&self, gateway: Gateway) -> Option<Arc<dyn GatewayAdapter>> {
        self.adapters.get(&gateway).cloned()
    }
}
