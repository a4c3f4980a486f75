use thiserror::Error;

use crate::domain::AccountId;

/// SQLite primary result codes that mean another writer holds the lock.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    #[error("Conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("Balance invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Account id out of range: {0}")]
    IdOutOfRange(AccountId),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_check_violation() {
                return StoreError::InvariantViolation(db_err.message().to_string());
            }
            let primary_code = db_err
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| code & 0xff);
            if matches!(primary_code, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
                return StoreError::Conflict(format!("lock not acquired: {}", db_err.message()));
            }
        }
        StoreError::Unavailable(err)
    }
}

/// Convert an account id into the store's key type.
pub(crate) fn sql_id(id: AccountId) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::IdOutOfRange(id))
}

pub(crate) fn account_id(raw: i64) -> Result<AccountId, StoreError> {
    AccountId::try_from(raw)
        .map_err(|_| StoreError::Corrupt(format!("negative account id {}", raw)))
}

pub(crate) fn balance(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| {
        StoreError::InvariantViolation(format!("stored balance {} is negative", raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_id_bounds() {
        assert_eq!(sql_id(42).unwrap(), 42);
        assert!(matches!(sql_id(u64::MAX), Err(StoreError::IdOutOfRange(_))));
    }

    #[test]
    fn test_negative_balance_is_an_invariant_violation() {
        assert_eq!(balance(10).unwrap(), 10);
        assert!(matches!(balance(-1), Err(StoreError::InvariantViolation(_))));
    }

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
