//! Request and response bodies. Requests are decoded into these types and
//! passed straight to the handlers.

use serde::{Deserialize, Serialize};

use crate::domain::{Account, AccountId, Amount, TransferReceipt};

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub id: AccountId,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub id: AccountId,
    #[serde(default)]
    pub sort: Option<String>,
}

/// `sum` is a signed delta: positive credits, negative debits.
#[derive(Debug, Deserialize)]
pub struct UpdateBalanceRequest {
    pub id: AccountId,
    pub sum: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    #[serde(rename = "fromID")]
    pub from_id: AccountId,
    #[serde(rename = "toID")]
    pub to_id: AccountId,
    pub sum: i64,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferRequest {
    /// Upstream clients may send the sum with either sign; only the
    /// magnitude is transferred.
    pub fn amount(&self) -> Amount {
        self.sum.unsigned_abs()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub id: AccountId,
    pub balance: u64,
}

impl From<Account> for BalanceResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            balance: account.balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResponse {
    pub from: BalanceResponse,
    pub to: BalanceResponse,
    pub description: String,
}

impl From<TransferReceipt> for TransferResponse {
    fn from(receipt: TransferReceipt) -> Self {
        Self {
            description: receipt.debit.description.clone(),
            from: receipt.from.into(),
            to: receipt.to.into(),
        }
    }
}
