use serde::{Deserialize, Serialize};

use crate::gateways::Gateway;

/// A recurring billing record for a (student, course) pair.
///
/// Status transitions follow a fixed graph: active -> {cancelled, paused,
/// expired}, paused -> {active}. Cancelled and expired are terminal. At most
/// one active subscription exists per (student, course); the partial unique
/// index on the subscriptions table backs that invariant.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub amount: i64,
    pub currency: String,
    /// Gateway used for the initial payment and renewals.
    pub gateway: Gateway,
    pub current_period_start: i64,
    pub current_period_end: i64,
    pub next_billing_date: i64,
    pub auto_renew: bool,
    pub failed_payment_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Request to create a subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscription {
    pub student_id: String,
    pub course_id: String,
    pub billing_cycle: BillingCycle,
    pub amount: i64,
    pub currency: String,
    pub gateway: Gateway,
}

/// Append-only audit record; every status transition writes exactly one.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionEvent {
    pub id: String,
    pub subscription_id: String,
    pub event_type: String,
    pub previous_status: Option<SubscriptionStatus>,
    pub new_status: Option<SubscriptionStatus>,
    pub payment_id: Option<String>,
    pub metadata: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Paused => "paused",
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            "paused" => Ok(Self::Paused),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Number of calendar months in one cycle.
    pub fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
