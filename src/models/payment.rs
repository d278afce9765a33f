use serde::{Deserialize, Serialize};

use crate::gateways::Gateway;

/// A payment attempt by a student.
///
/// Created in `pending` state before any gateway is contacted, so a record
/// exists even if the gateway call later fails. Transitions to `completed`
/// only via a verified webhook or a successful wallet debit, and never moves
/// backward once completed.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: String,
    pub student_id: String,
    pub course_id: Option<String>,
    pub enrollment_id: Option<String>,
    pub subscription_id: Option<String>,

    /// Amount in major currency units; adapters convert to minor units.
    pub amount: i64,
    pub currency: String,
    pub gateway: Gateway,
    pub status: PaymentStatus,
    pub description: Option<String>,

    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub payment_date: Option<i64>,
    /// Deadline for client-side completion of a pending payment.
    pub expires_at: Option<i64>,
    pub webhook_verified: bool,

    /// Caller-supplied metadata (JSON).
    pub metadata: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Request to create a payment.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayment {
    pub gateway: Gateway,
    pub amount: i64,
    pub currency: String,
    pub student_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub enrollment_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
