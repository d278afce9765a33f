use serde::{Deserialize, Serialize};

/// A refund against a completed payment.
///
/// The row is created atomically with the ledger-side bookkeeping, then
/// marked completed once the gateway confirms the money moved back. A refund
/// left in `pending` after a failed gateway call is picked up by
/// reconciliation, not retried automatically.
#[derive(Debug, Clone, Serialize)]
pub struct Refund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub reason: String,
    pub requested_by: String,
    pub status: RefundStatus,
    pub gateway_refund_id: Option<String>,
    pub processed_at: Option<i64>,
    pub created_at: i64,
}

/// Request to refund a payment.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRefund {
    pub amount: i64,
    pub reason: String,
    pub requested_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Completed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for RefundStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
