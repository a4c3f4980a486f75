use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Account, AccountId, Amount, TransactionRecord, positive_delta};

/// A request to move `amount` from one account to another.
///
/// A committed transfer produces exactly two records sharing description and
/// timestamp: `-amount` on the sender and `+amount` on the receiver. An aborted
/// transfer produces none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub from_id: AccountId,
    pub to_id: AccountId,
    /// Always a positive magnitude
    pub amount: Amount,
    pub description: Option<String>,
}

impl TransferOperation {
    pub fn new(from_id: AccountId, to_id: AccountId, amount: Amount) -> Self {
        Self {
            from_id,
            to_id,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    /// Check the operation's shape. Does not look at balances.
    pub fn validate(&self) -> Result<i64, TransferError> {
        if self.from_id == self.to_id {
            return Err(TransferError::SameAccount(self.from_id));
        }
        positive_delta(self.amount).ok_or(TransferError::InvalidAmount(self.amount))
    }

    /// Description recorded on both legs.
    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("Transfer money from {} to {}", self.from_id, self.to_id))
    }

    /// Both account ids in ascending order. Locks are always taken in this
    /// order, whichever direction the money moves.
    pub fn lock_order(&self) -> [AccountId; 2] {
        if self.from_id < self.to_id {
            [self.from_id, self.to_id]
        } else {
            [self.to_id, self.from_id]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    InsufficientBalance,
    Conflict,
    StorageUnavailable,
    InvariantViolation,
    Invalid,
}

/// Lifecycle of a transfer. Only `Committed` and `Aborted` are terminal and
/// neither exposes half-applied balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Validating,
    Reserving,
    Applying,
    Committed,
    Aborted(AbortReason),
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Validating => write!(f, "validating"),
            TransferState::Reserving => write!(f, "reserving"),
            TransferState::Applying => write!(f, "applying"),
            TransferState::Committed => write!(f, "committed"),
            TransferState::Aborted(reason) => write!(f, "aborted({:?})", reason),
        }
    }
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub from: Account,
    pub to: Account,
    pub debit: TransactionRecord,
    pub credit: TransactionRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    SameAccount(AccountId),
    InvalidAmount(Amount),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::SameAccount(id) => {
                write!(f, "cannot transfer from account {} to itself", id)
            }
            TransferError::InvalidAmount(amount) => {
                write!(f, "transfer amount must be positive and storable, got {}", amount)
            }
        }
    }
}

impl std::error::Error for TransferError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_description_names_both_accounts() {
        let op = TransferOperation::new(1, 2, 40);
        assert_eq!(op.description(), "Transfer money from 1 to 2");

        let op = op.with_description(Some("rent".into()));
        assert_eq!(op.description(), "rent");
    }

    #[test]
    fn test_blank_description_uses_default() {
        let op = TransferOperation::new(3, 9, 1).with_description(Some("".into()));
        assert_eq!(op.description(), "Transfer money from 3 to 9");
    }

    #[test]
    fn test_lock_order_is_ascending_in_both_directions() {
        assert_eq!(TransferOperation::new(1, 2, 5).lock_order(), [1, 2]);
        assert_eq!(TransferOperation::new(2, 1, 5).lock_order(), [1, 2]);
    }

    #[test]
    fn test_validate() {
        assert_eq!(TransferOperation::new(1, 2, 40).validate(), Ok(40));
        assert_eq!(
            TransferOperation::new(1, 1, 40).validate(),
            Err(TransferError::SameAccount(1))
        );
        assert_eq!(
            TransferOperation::new(1, 2, 0).validate(),
            Err(TransferError::InvalidAmount(0))
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TransferState::Reserving.to_string(), "reserving");
        assert_eq!(
            TransferState::Aborted(AbortReason::InsufficientBalance).to_string(),
            "aborted(InsufficientBalance)"
        );
    }
}
