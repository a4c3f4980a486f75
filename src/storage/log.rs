//! Transaction log: the append-only `transactions` relation.

use std::collections::HashMap;

use sqlx::{Row, SqliteConnection};

use crate::domain::{AccountId, NewRecord, SortKey, TransactionRecord};

use super::error::{self, StoreError, sql_id};
use super::{parse_timestamp, timestamp};

/// Append a record inside the caller's transaction and return it with its
/// sequence number.
pub async fn append(
    conn: &mut SqliteConnection,
    record: NewRecord,
) -> Result<TransactionRecord, StoreError> {
    let sequence = next_sequence(conn).await?;

    sqlx::query(
        r#"
        INSERT INTO transactions (sequence, account_id, delta, description, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(sequence)
    .bind(sql_id(record.account_id)?)
    .bind(record.delta)
    .bind(&record.description)
    .bind(timestamp(record.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(record.into_record(sequence))
}

/// Get the next sequence number and increment the counter. Rolled back
/// together with the rest of the transaction, so aborted scopes leave no gaps.
async fn next_sequence(conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    let row = sqlx::query(
        r#"
        UPDATE sequence_counter
        SET value = value + 1
        WHERE name = 'transaction_sequence'
        RETURNING value
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get("value"))
}

/// All records of one account, most significant first for the sort key.
pub async fn query(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    sort: SortKey,
) -> Result<Vec<TransactionRecord>, StoreError> {
    let rows = sqlx::query(select_for_account(sort))
        .bind(sql_id(account_id)?)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(row_to_record).collect()
}

// Sort columns come from a closed set of static statements.
fn select_for_account(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Time => {
            "SELECT sequence, account_id, delta, description, created_at FROM transactions \
             WHERE account_id = ? ORDER BY created_at DESC, sequence DESC"
        }
        SortKey::Amount => {
            "SELECT sequence, account_id, delta, description, created_at FROM transactions \
             WHERE account_id = ? ORDER BY delta DESC, sequence DESC"
        }
        SortKey::Description => {
            "SELECT sequence, account_id, delta, description, created_at FROM transactions \
             WHERE account_id = ? ORDER BY description DESC, sequence DESC"
        }
        SortKey::Sequence => {
            "SELECT sequence, account_id, delta, description, created_at FROM transactions \
             WHERE account_id = ? ORDER BY sequence DESC"
        }
    }
}

/// `SUM(delta)` per account.
pub async fn ledger_sums(
    conn: &mut SqliteConnection,
) -> Result<HashMap<AccountId, i64>, StoreError> {
    let rows = sqlx::query(
        "SELECT account_id, SUM(delta) AS total FROM transactions GROUP BY account_id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut sums = HashMap::new();
    for row in rows {
        sums.insert(error::account_id(row.get("account_id"))?, row.get("total"));
    }
    Ok(sums)
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<TransactionRecord, StoreError> {
    let created_at: String = row.get("created_at");

    Ok(TransactionRecord {
        sequence: row.get("sequence"),
        account_id: error::account_id(row.get("account_id"))?,
        delta: row.get("delta"),
        description: row.get("description"),
        created_at: parse_timestamp(&created_at)?,
    })
}
