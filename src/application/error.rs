use thiserror::Error;

use crate::domain::{AccountId, Amount, TransferError};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid account id: {0}")]
    InvalidAccountId(AccountId),

    #[error("Cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    #[error("Insufficient balance in account {account_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        account_id: AccountId,
        balance: u64,
        required: Amount,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    /// Transient failures a caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Conflict(_) | LedgerError::StorageUnavailable(_)
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(e) => LedgerError::StorageUnavailable(e.to_string()),
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            StoreError::InvariantViolation(msg) => LedgerError::InvariantViolation(msg),
            StoreError::IdOutOfRange(id) => LedgerError::InvalidAccountId(id),
            // The engine ensures accounts before touching them; a missing row
            // inside a scope means the store and the engine disagree.
            StoreError::AccountNotFound(id) => {
                LedgerError::InvariantViolation(format!("account {} vanished mid-operation", id))
            }
            StoreError::Corrupt(msg) => LedgerError::InvariantViolation(msg),
        }
    }
}

impl From<TransferError> for LedgerError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::SameAccount(id) => LedgerError::SameAccount(id),
            TransferError::InvalidAmount(_) => LedgerError::InvalidAmount(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_onto_taxonomy() {
        let err = LedgerError::from(StoreError::Conflict("busy".into()));
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert!(err.is_retryable());

        let err = LedgerError::from(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, LedgerError::StorageUnavailable(_)));
        assert!(err.is_retryable());

        let err = LedgerError::from(StoreError::InvariantViolation("negative".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transfer_errors() {
        assert!(matches!(
            LedgerError::from(TransferError::SameAccount(4)),
            LedgerError::SameAccount(4)
        ));
        assert!(matches!(
            LedgerError::from(TransferError::InvalidAmount(0)),
            LedgerError::InvalidAmount(_)
        ));
    }

    #[test]
    fn test_insufficient_balance_message() {
        let err = LedgerError::InsufficientBalance {
            account_id: 1,
            balance: 10,
            required: 40,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance in account 1: balance 10, required 40"
        );
        assert!(!err.is_retryable());
    }
}
