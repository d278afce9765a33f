use serde::Serialize;

/// Invoice issued when a payment completes. At most one per payment; the
/// UNIQUE constraint on `payment_id` makes creation idempotent under webhook
/// replays.
#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub id: String,
    pub payment_id: String,
    pub student_id: String,
    pub amount: i64,
    pub currency: String,
    pub issued_at: i64,
}
