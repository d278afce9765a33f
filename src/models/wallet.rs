use serde::Serialize;

/// A student's stored-value balance.
///
/// The balance is never mutated by read-modify-write from service code; all
/// changes go through the conditional single-statement updates in
/// `db::ledger`, which also append the matching transaction record.
#[derive(Debug, Clone, Serialize)]
pub struct Wallet {
    pub id: String,
    pub user_id: String,
    pub points: i64,
    pub credits: i64,
    pub currency: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One ledger entry. `reference_id` links debits/credits back to the payment
/// or refund that caused them.
#[derive(Debug, Clone, Serialize)]
pub struct WalletTransaction {
    pub id: String,
    pub wallet_id: String,
    pub kind: WalletTransactionKind,
    pub amount: i64,
    pub description: String,
    pub reference_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionKind {
    Debit,
    Credit,
}

impl WalletTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl std::str::FromStr for WalletTransactionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for WalletTransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
