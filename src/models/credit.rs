use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Append-only credit ledger entry. `balance_after` reflects every entry up
/// to and including this one for the user and is never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditLedgerEntry {
    pub id: String,
    pub user_id: String,
    pub entry_type: String,
    pub delta_credits: i64,
    pub balance_after: i64,
    pub reason: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub billing_provider: Option<String>,
    pub billing_reference: Option<String>,
    /// YYYY-MM, set for monthly grants only
    pub period_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditEntryType {
    MonthlyGrant,
    Debit,
    Purchase,
}

impl CreditEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditEntryType::MonthlyGrant => "monthly_grant",
            CreditEntryType::Debit => "debit",
            CreditEntryType::Purchase => "purchase",
        }
    }
}
