use crate::domain::{
    Account, AccountId, IntegrityReport, SortKey, TransactionRecord, build_integrity_report,
};
use crate::storage::Repository;

use super::LedgerError;

/// Read-only lookups over balances and the transaction log. Nothing here
/// creates accounts or writes to the store.
#[derive(Clone)]
pub struct QueryFacade {
    repo: Repository,
}

impl QueryFacade {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Balance of the account, or `None` if it has never been referenced.
    pub async fn balance(&self, id: AccountId) -> Result<Option<u64>, LedgerError> {
        Ok(self.repo.get_balance(id).await?)
    }

    /// The account's records ordered by `sort`, descending.
    pub async fn log(
        &self,
        id: AccountId,
        sort: SortKey,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        Ok(self.repo.list_transactions(id, sort).await?)
    }

    pub async fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.repo.list_accounts().await?)
    }

    /// Check ledger integrity and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let snapshot = self.repo.integrity_snapshot().await?;

        Ok(build_integrity_report(
            &snapshot.accounts,
            &snapshot.ledger_sums,
            snapshot.stats.record_count,
            snapshot.stats.orphan_records,
            snapshot.stats.has_sequence_gaps,
        ))
    }
}
