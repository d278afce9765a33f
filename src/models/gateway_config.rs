use serde::{Deserialize, Serialize};

/// Razorpay credentials (card/UPI processor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
}

/// Stripe credentials (global processor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

/// One row of the `payment_gateway_configs` table. The `config` column holds
/// the provider-specific credentials as JSON; disabled rows are skipped when
/// the adapter set is built at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfigRow {
    pub gateway: String,
    pub config: String,
    pub enabled: bool,
    pub updated_at: i64,
}
