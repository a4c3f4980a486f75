use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AccountId;

/// Description used for credits and debits when the caller gives none.
pub const DEFAULT_UPDATE_DESCRIPTION: &str = "Update request";

/// A single balance-affecting event. Records are append-only; the `delta`
/// equals the signed change applied to the account's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Monotonically increasing across the whole log, assigned on append
    pub sequence: i64,
    pub account_id: AccountId,
    pub delta: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A record that has not been appended yet (no sequence number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub account_id: AccountId,
    pub delta: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl NewRecord {
    pub fn new(
        account_id: AccountId,
        delta: i64,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            delta,
            description: description.into(),
            created_at,
        }
    }

    pub(crate) fn into_record(self, sequence: i64) -> TransactionRecord {
        TransactionRecord {
            sequence,
            account_id: self.account_id,
            delta: self.delta,
            description: self.description,
            created_at: self.created_at,
        }
    }
}

/// Resolve the description for a credit or debit.
pub fn update_description(description: Option<String>) -> String {
    match description {
        Some(desc) if !desc.trim().is_empty() => desc,
        _ => DEFAULT_UPDATE_DESCRIPTION.to_string(),
    }
}

/// Sum of deltas, i.e. the balance the log implies for one account.
pub fn sum_deltas<'a>(records: impl IntoIterator<Item = &'a TransactionRecord>) -> i64 {
    records.into_iter().map(|r| r.delta).sum()
}

/// Column a transaction log query is ordered by. Always descending, with the
/// sequence number as tie-break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Time,
    Amount,
    Description,
    Sequence,
}

impl SortKey {
    /// Parse a caller-supplied sort key. Unknown keys fall back to `Time`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "amount" | "sum" | "delta" => SortKey::Amount,
            "description" => SortKey::Description,
            "sequence" => SortKey::Sequence,
            _ => SortKey::Time,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Time => "time",
            SortKey::Amount => "amount",
            SortKey::Description => "description",
            SortKey::Sequence => "sequence",
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
