//! Account store: the `accounts` relation.
//!
//! Mutating functions take the connection of an open transaction so every
//! balance change lands in the caller's atomic scope.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use crate::domain::{Account, AccountId};

use super::error::{self, StoreError, sql_id};
use super::timestamp;

/// Create a zero-balance account if it does not exist yet. Never touches an
/// existing row.
///
/// This is a write statement, so issuing it first in a transaction makes
/// SQLite grant the write lock before any balance is read.
pub async fn ensure_account(conn: &mut SqliteConnection, id: AccountId) -> Result<(), StoreError> {
    let now = timestamp(Utc::now());
    sqlx::query(
        r#"
        INSERT INTO accounts (id, balance, created_at, updated_at)
        VALUES (?, 0, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(sql_id(id)?)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Read an account's balance. Returns `None` for unknown accounts.
pub async fn get_balance(
    conn: &mut SqliteConnection,
    id: AccountId,
) -> Result<Option<u64>, StoreError> {
    let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
        .bind(sql_id(id)?)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|row| error::balance(row.get("balance"))).transpose()
}

/// Apply a signed delta to an account and return the new balance.
///
/// With `expected` set, the update only happens if the stored balance still
/// equals it. The final write is a compare-and-set on the balance that was
/// read, so a concurrent writer surfaces as `Conflict`, never as a lost update.
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    id: AccountId,
    delta: i64,
    expected: Option<u64>,
) -> Result<u64, StoreError> {
    let key = sql_id(id)?;
    let current: i64 = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| row.get("balance"))
        .ok_or(StoreError::AccountNotFound(id))?;

    if let Some(expected) = expected {
        if error::balance(current)? != expected {
            return Err(StoreError::Conflict(format!(
                "account {} balance is {}, expected {}",
                id, current, expected
            )));
        }
    }

    let updated = current.checked_add(delta).ok_or_else(|| {
        StoreError::InvariantViolation(format!(
            "balance {} of account {} overflows when applying {}",
            current, id, delta
        ))
    })?;
    if updated < 0 {
        return Err(StoreError::InvariantViolation(format!(
            "account {} would go negative ({} + {})",
            id, current, delta
        )));
    }

    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = ?, updated_at = ?
        WHERE id = ? AND balance = ?
        "#,
    )
    .bind(updated)
    .bind(timestamp(Utc::now()))
    .bind(key)
    .bind(current)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "account {} changed while applying {}",
            id, delta
        )));
    }

    error::balance(updated)
}

/// List all accounts ordered by id.
pub async fn list_accounts(conn: &mut SqliteConnection) -> Result<Vec<Account>, StoreError> {
    let rows = sqlx::query("SELECT id, balance FROM accounts ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(row_to_account).collect()
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account, StoreError> {
    Ok(Account {
        id: error::account_id(row.get("id"))?,
        balance: error::balance(row.get("balance"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_pool;

    #[tokio::test]
    async fn test_ensure_account_is_idempotent() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        ensure_account(&mut conn, 1).await.unwrap();
        apply_delta(&mut conn, 1, 77, None).await.unwrap();
        ensure_account(&mut conn, 1).await.unwrap();

        assert_eq!(get_balance(&mut conn, 1).await.unwrap(), Some(77));
    }

    #[tokio::test]
    async fn test_get_balance_does_not_create() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        assert_eq!(get_balance(&mut conn, 9).await.unwrap(), None);
        assert!(list_accounts(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_delta_checks_expected_balance() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        ensure_account(&mut conn, 1).await.unwrap();
        apply_delta(&mut conn, 1, 100, None).await.unwrap();

        let err = apply_delta(&mut conn, 1, -10, Some(50)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let balance = apply_delta(&mut conn, 1, -10, Some(100)).await.unwrap();
        assert_eq!(balance, 90);
    }

    #[tokio::test]
    async fn test_apply_delta_rejects_negative_result() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        ensure_account(&mut conn, 1).await.unwrap();
        apply_delta(&mut conn, 1, 30, None).await.unwrap();

        let err = apply_delta(&mut conn, 1, -31, None).await.unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
        assert_eq!(get_balance(&mut conn, 1).await.unwrap(), Some(30));
    }

    #[tokio::test]
    async fn test_apply_delta_on_missing_account() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let err = apply_delta(&mut conn, 3, 5, None).await.unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(3)));
    }
}
