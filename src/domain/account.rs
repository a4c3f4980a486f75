use serde::{Deserialize, Serialize};

pub type AccountId = u64;

/// Unsigned money magnitude in minor units.
pub type Amount = u64;

/// Largest id or magnitude the store can represent (SQLite integers are 64-bit signed).
pub const MAX_STORABLE: u64 = i64::MAX as u64;

/// An account holding a non-negative balance. Accounts are never deleted and
/// start at zero the first time they are referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Amount,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Self { id, balance: 0 }
    }

    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.balance = balance;
        self
    }
}

/// Convert a positive magnitude into the signed delta stored in the log.
/// Returns `None` for zero or for values the store cannot hold.
pub fn positive_delta(amount: Amount) -> Option<i64> {
    if amount == 0 {
        return None;
    }
    i64::try_from(amount).ok()
}

/// Returns true if the id fits in the store's key column.
pub fn is_storable_id(id: AccountId) -> bool {
    id <= MAX_STORABLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_starts_at_zero() {
        let account = Account::new(7);
        assert_eq!(account.balance, 0);
        assert_eq!(account.with_balance(77).balance, 77);
    }

    #[test]
    fn test_positive_delta() {
        assert_eq!(positive_delta(40), Some(40));
        assert_eq!(positive_delta(0), None);
        assert_eq!(positive_delta(MAX_STORABLE), Some(i64::MAX));
        assert_eq!(positive_delta(MAX_STORABLE + 1), None);
    }

    #[test]
    fn test_storable_id() {
        assert!(is_storable_id(0));
        assert!(is_storable_id(MAX_STORABLE));
        assert!(!is_storable_id(u64::MAX));
    }
}
