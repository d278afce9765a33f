use serde::Serialize;

/// Raw inbound webhook, persisted before signature verification so every
/// delivery can be replayed or inspected regardless of outcome.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookLog {
    pub id: String,
    pub gateway: String,
    pub payload: String,
    pub signature: Option<String>,
    pub verified: bool,
    pub received_at: i64,
}
