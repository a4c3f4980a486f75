use std::cmp::Ordering;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{Config, LedgerConfig};
use crate::domain::{
    AbortReason, Account, AccountId, Amount, MAX_STORABLE, NewRecord, SortKey, TransactionRecord,
    TransferOperation, TransferReceipt, TransferState, is_storable_id, positive_delta,
    update_description,
};
use crate::storage::{Repository, StoreError, accounts, log};

use super::{LedgerError, QueryFacade};

/// Pause between transfer attempts, multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// Upper bound for one operation, lock waits and retries included
    pub deadline: Duration,
    /// Extra attempts a transfer gets after a transient storage failure
    pub max_transfer_retries: u32,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        LedgerOptions::from(&LedgerConfig::default())
    }
}

impl From<&LedgerConfig> for LedgerOptions {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            deadline: config.deadline(),
            max_transfer_retries: config.max_transfer_retries,
        }
    }
}

/// The balance ledger engine. The only writer of balances and log entries:
/// every operation runs in one atomic scope, so a balance change and its log
/// record become durable together or not at all.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct Ledger {
    repo: Repository,
    options: LedgerOptions,
}

impl Ledger {
    pub fn new(repo: Repository, options: LedgerOptions) -> Self {
        Self { repo, options }
    }

    /// Create the database if needed and apply the schema.
    pub async fn init(config: &Config) -> anyhow::Result<Self> {
        let repo = Repository::init(&config.database).await?;
        Ok(Self::new(repo, LedgerOptions::from(&config.ledger)))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let repo = Repository::connect(&config.database, false).await?;
        Ok(Self::new(repo, LedgerOptions::from(&config.ledger)))
    }

    /// A handle whose operations use the caller's deadline instead of the
    /// configured one.
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        let mut ledger = self.clone();
        ledger.options.deadline = deadline;
        ledger
    }

    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Read-only view over the same store.
    pub fn queries(&self) -> QueryFacade {
        QueryFacade::new(self.repo.clone())
    }

    // ========================
    // Mutations
    // ========================

    /// Create the account with a zero balance unless it already exists.
    pub async fn ensure_account(&self, id: AccountId) -> Result<(), LedgerError> {
        check_id(id)?;
        self.within_deadline("ensure_account", self.ensure_scope(id))
            .await
    }

    async fn ensure_scope(&self, id: AccountId) -> Result<(), LedgerError> {
        let mut tx = self.repo.begin().await?;
        accounts::ensure_account(&mut tx, id).await?;
        self.repo.commit(tx).await?;
        Ok(())
    }

    /// Add `amount` to the account, creating it if unseen. Returns the new balance.
    pub async fn credit(
        &self,
        id: AccountId,
        amount: Amount,
        description: Option<String>,
    ) -> Result<u64, LedgerError> {
        check_id(id)?;
        let delta = check_amount(amount)?;
        let description = update_description(description);

        let balance = self
            .within_deadline("credit", self.credit_scope(id, delta, description))
            .await?;
        info!(account_id = id, amount, balance, "credit committed");
        Ok(balance)
    }

    async fn credit_scope(
        &self,
        id: AccountId,
        delta: i64,
        description: String,
    ) -> Result<u64, LedgerError> {
        let mut tx = self.repo.begin().await?;
        accounts::ensure_account(&mut tx, id).await?;
        let balance = accounts::apply_delta(&mut tx, id, delta, None).await?;
        log::append(&mut tx, NewRecord::new(id, delta, description, Utc::now())).await?;
        self.repo.commit(tx).await?;
        Ok(balance)
    }

    /// Take `amount` from the account. Fails with `InsufficientBalance`, and
    /// changes nothing, if the balance does not cover it.
    pub async fn debit(
        &self,
        id: AccountId,
        amount: Amount,
        description: Option<String>,
    ) -> Result<u64, LedgerError> {
        check_id(id)?;
        let delta = check_amount(amount)?;
        let description = update_description(description);

        let balance = self
            .within_deadline("debit", self.debit_scope(id, amount, delta, description))
            .await?;
        info!(account_id = id, amount, balance, "debit committed");
        Ok(balance)
    }

    async fn debit_scope(
        &self,
        id: AccountId,
        amount: Amount,
        delta: i64,
        description: String,
    ) -> Result<u64, LedgerError> {
        let mut tx = self.repo.begin().await?;
        accounts::ensure_account(&mut tx, id).await?;
        let balance = accounts::get_balance(&mut tx, id)
            .await?
            .ok_or(StoreError::AccountNotFound(id))?;

        if balance < amount {
            // Dropping `tx` rolls the scope back.
            return Err(LedgerError::InsufficientBalance {
                account_id: id,
                balance,
                required: amount,
            });
        }

        let balance = accounts::apply_delta(&mut tx, id, -delta, Some(balance)).await?;
        log::append(&mut tx, NewRecord::new(id, -delta, description, Utc::now())).await?;
        self.repo.commit(tx).await?;
        Ok(balance)
    }

    /// Signed entry point: positive credits, negative debits the magnitude,
    /// zero is rejected.
    pub async fn update_balance(
        &self,
        id: AccountId,
        signed_amount: i64,
        description: Option<String>,
    ) -> Result<u64, LedgerError> {
        match signed_amount.cmp(&0) {
            Ordering::Greater => {
                self.credit(id, signed_amount.unsigned_abs(), description)
                    .await
            }
            Ordering::Less => {
                self.debit(id, signed_amount.unsigned_abs(), description)
                    .await
            }
            Ordering::Equal => Err(LedgerError::InvalidAmount(
                "amount must not be zero".to_string(),
            )),
        }
    }

    /// Move `amount` from `from_id` to `to_id` as one atomic unit.
    ///
    /// Both accounts are locked in ascending id order, the sender's balance is
    /// re-read under the lock, and both legs plus both log records commit
    /// together. Transient storage failures retry the whole operation with
    /// fresh reads; once retries are exhausted the result is `Conflict`.
    pub async fn transfer(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Amount,
        description: Option<String>,
    ) -> Result<TransferReceipt, LedgerError> {
        let op = TransferOperation::new(from_id, to_id, amount).with_description(description);
        debug!(from_id, to_id, amount, state = %TransferState::Validating, "transfer");

        check_id(from_id)?;
        check_id(to_id)?;
        let delta = op.validate()?;

        self.within_deadline("transfer", self.transfer_with_retry(&op, delta))
            .await
    }

    async fn transfer_with_retry(
        &self,
        op: &TransferOperation,
        delta: i64,
    ) -> Result<TransferReceipt, LedgerError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.try_transfer(op, delta).await {
                Ok(receipt) => {
                    info!(
                        from_id = op.from_id,
                        to_id = op.to_id,
                        amount = op.amount,
                        attempt,
                        from_balance = receipt.from.balance,
                        to_balance = receipt.to.balance,
                        state = %TransferState::Committed,
                        "transfer committed"
                    );
                    return Ok(receipt);
                }
                Err(err) if err.is_retryable() => {
                    let state = TransferState::Aborted(abort_reason(&err));
                    if attempt > self.options.max_transfer_retries {
                        warn!(
                            from_id = op.from_id,
                            to_id = op.to_id,
                            attempts = attempt,
                            error = %err,
                            %state,
                            "transfer retries exhausted"
                        );
                        return Err(LedgerError::Conflict(format!(
                            "transfer from {} to {} gave up after {} attempts: {}",
                            op.from_id, op.to_id, attempt, err
                        )));
                    }
                    warn!(
                        from_id = op.from_id,
                        to_id = op.to_id,
                        attempt,
                        error = %err,
                        %state,
                        "transfer attempt aborted, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(err) => {
                    debug!(
                        from_id = op.from_id,
                        to_id = op.to_id,
                        error = %err,
                        state = %TransferState::Aborted(abort_reason(&err)),
                        "transfer"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn try_transfer(
        &self,
        op: &TransferOperation,
        delta: i64,
    ) -> Result<TransferReceipt, LedgerError> {
        let mut tx = self.repo.begin().await?;

        debug!(lock_order = ?op.lock_order(), state = %TransferState::Reserving, "transfer");
        for id in op.lock_order() {
            accounts::ensure_account(&mut tx, id).await?;
        }

        debug!(state = %TransferState::Applying, "transfer");
        let from_balance = accounts::get_balance(&mut tx, op.from_id)
            .await?
            .ok_or(StoreError::AccountNotFound(op.from_id))?;
        let to_balance = accounts::get_balance(&mut tx, op.to_id)
            .await?
            .ok_or(StoreError::AccountNotFound(op.to_id))?;

        if from_balance < op.amount {
            return Err(LedgerError::InsufficientBalance {
                account_id: op.from_id,
                balance: from_balance,
                required: op.amount,
            });
        }

        let from_after =
            accounts::apply_delta(&mut tx, op.from_id, -delta, Some(from_balance)).await?;
        let to_after =
            accounts::apply_delta(&mut tx, op.to_id, delta, Some(to_balance)).await?;

        let created_at = Utc::now();
        let description = op.description();
        let debit = log::append(
            &mut tx,
            NewRecord::new(op.from_id, -delta, description.clone(), created_at),
        )
        .await?;
        let credit = log::append(
            &mut tx,
            NewRecord::new(op.to_id, delta, description, created_at),
        )
        .await?;

        self.repo.commit(tx).await?;

        Ok(TransferReceipt {
            from: Account::new(op.from_id).with_balance(from_after),
            to: Account::new(op.to_id).with_balance(to_after),
            debit,
            credit,
        })
    }

    // ========================
    // Reads
    // ========================

    /// Current balance; an unseen account is provisioned at zero.
    pub async fn get_balance(&self, id: AccountId) -> Result<u64, LedgerError> {
        check_id(id)?;
        self.within_deadline("get_balance", self.provisioned_balance(id))
            .await
    }

    async fn provisioned_balance(&self, id: AccountId) -> Result<u64, LedgerError> {
        if let Some(balance) = self.repo.get_balance(id).await? {
            return Ok(balance);
        }

        let mut tx = self.repo.begin().await?;
        accounts::ensure_account(&mut tx, id).await?;
        let balance = accounts::get_balance(&mut tx, id)
            .await?
            .ok_or(StoreError::AccountNotFound(id))?;
        self.repo.commit(tx).await?;
        debug!(account_id = id, "account provisioned on read");
        Ok(balance)
    }

    /// The account's transaction history. Unknown sort keys order by time.
    pub async fn get_log(
        &self,
        id: AccountId,
        sort: Option<&str>,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        check_id(id)?;
        let sort = sort.map(SortKey::parse).unwrap_or_default();
        self.within_deadline("get_log", self.queries().log(id, sort))
            .await
    }

    async fn within_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        let deadline = self.options.deadline;
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, ?deadline, "operation exceeded its deadline");
                Err(LedgerError::Conflict(format!(
                    "{} exceeded its deadline of {:?}",
                    operation, deadline
                )))
            }
        }
    }
}

fn check_id(id: AccountId) -> Result<(), LedgerError> {
    if is_storable_id(id) {
        Ok(())
    } else {
        Err(LedgerError::InvalidAccountId(id))
    }
}

fn check_amount(amount: Amount) -> Result<i64, LedgerError> {
    positive_delta(amount).ok_or_else(|| {
        LedgerError::InvalidAmount(format!(
            "amount must be between 1 and {}, got {}",
            MAX_STORABLE, amount
        ))
    })
}

fn abort_reason(err: &LedgerError) -> AbortReason {
    match err {
        LedgerError::InsufficientBalance { .. } => AbortReason::InsufficientBalance,
        LedgerError::Conflict(_) => AbortReason::Conflict,
        LedgerError::StorageUnavailable(_) => AbortReason::StorageUnavailable,
        LedgerError::InvariantViolation(_) => AbortReason::InvariantViolation,
        LedgerError::InvalidAmount(_)
        | LedgerError::InvalidAccountId(_)
        | LedgerError::SameAccount(_) => AbortReason::Invalid,
    }
}
