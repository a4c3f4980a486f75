use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::config::DatabaseConfig;
use crate::domain::{Account, AccountId, SortKey, TransactionRecord};

use super::{MIGRATION_001_INITIAL, StoreError, accounts, log};

/// Statistics for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub record_count: i64,
    pub has_sequence_gaps: bool,
    pub orphan_records: i64,
}

/// Consistent view of the store for the integrity check.
#[derive(Debug, Clone)]
pub struct IntegritySnapshot {
    pub stats: IntegrityStats,
    pub accounts: Vec<Account>,
    pub ledger_sums: HashMap<AccountId, i64>,
}

/// Owner of the SQLite pool. Hands out atomic scopes to the engine and serves
/// read-only queries directly from the pool.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database described by `config`. With `create` set the
    /// file is created if it doesn't exist.
    pub async fn connect(config: &DatabaseConfig, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))
            .with_context(|| format!("Invalid database path '{}'", config.path))?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database '{}'", config.path))?;

        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        Ok(())
    }

    /// Initialize a database (connect, creating the file, + migrate).
    pub async fn init(config: &DatabaseConfig) -> Result<Self> {
        let repo = Self::connect(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Open an atomic scope. Dropping the transaction without committing
    /// rolls back everything done through it.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        let tx = self.pool.begin().await?;
        tracing::debug!("atomic scope opened");
        Ok(tx)
    }

    pub async fn commit(&self, tx: Transaction<'static, Sqlite>) -> Result<(), StoreError> {
        tx.commit().await?;
        tracing::debug!("atomic scope committed");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Read-only queries
    // ========================

    /// Balance of an account, without creating it.
    pub async fn get_balance(&self, id: AccountId) -> Result<Option<u64>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        accounts::get_balance(&mut conn, id).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        accounts::list_accounts(&mut conn).await
    }

    pub async fn list_transactions(
        &self,
        account_id: AccountId,
        sort: SortKey,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        log::query(&mut conn, account_id, sort).await
    }

    /// Everything the integrity check compares, read inside one transaction
    /// so accounts, log sums and sequence stats come from the same snapshot.
    pub async fn integrity_snapshot(&self) -> Result<IntegritySnapshot, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sequence_check = sqlx::query(
            r#"
            SELECT
                MIN(sequence) as min_seq,
                MAX(sequence) as max_seq,
                COUNT(*) as count
            FROM transactions
            "#,
        )
        .fetch_one(&mut *tx)
        .await?;

        let min_seq: Option<i64> = sequence_check.get("min_seq");
        let max_seq: Option<i64> = sequence_check.get("max_seq");
        let record_count: i64 = sequence_check.get("count");

        let has_sequence_gaps = match (min_seq, max_seq) {
            (Some(min), Some(max)) => (max - min + 1) != record_count || min != 1,
            _ => false,
        };

        let orphan_records: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM transactions t
            WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = t.account_id)
            "#,
        )
        .fetch_one(&mut *tx)
        .await?
        .get("count");

        let accounts = accounts::list_accounts(&mut tx).await?;
        let ledger_sums = log::ledger_sums(&mut tx).await?;

        // Read-only; nothing to keep.
        tx.rollback().await?;

        Ok(IntegritySnapshot {
            stats: IntegrityStats {
                record_count,
                has_sequence_gaps,
                orphan_records,
            },
            accounts,
            ledger_sums,
        })
    }
}
