use std::collections::HashMap;

use serde::Serialize;

use super::{Account, AccountId};

/// An account whose stored balance disagrees with the sum of its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    pub stored_balance: u64,
    pub ledger_sum: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub record_count: i64,
    pub total_balance: u128,
    pub mismatches: Vec<BalanceMismatch>,
    pub orphan_records: i64,
    pub has_sequence_gaps: bool,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Compare every account's stored balance with the sum of its deltas.
/// `ledger_sums` holds `SUM(delta)` per account id; accounts without
/// records are expected to hold zero.
pub fn build_integrity_report(
    accounts: &[Account],
    ledger_sums: &HashMap<AccountId, i64>,
    record_count: i64,
    orphan_records: i64,
    has_sequence_gaps: bool,
) -> IntegrityReport {
    let mut issues = Vec::new();
    let mut mismatches = Vec::new();

    for account in accounts {
        let ledger_sum = ledger_sums.get(&account.id).copied().unwrap_or(0);
        if i128::from(ledger_sum) != i128::from(account.balance) {
            issues.push(format!(
                "Account {} holds {} but its log sums to {}",
                account.id, account.balance, ledger_sum
            ));
            mismatches.push(BalanceMismatch {
                account_id: account.id,
                stored_balance: account.balance,
                ledger_sum,
            });
        }
    }

    if orphan_records > 0 {
        issues.push(format!(
            "{} log record(s) reference unknown accounts",
            orphan_records
        ));
    }
    if has_sequence_gaps {
        issues.push("Log sequence numbers have gaps".to_string());
    }

    IntegrityReport {
        account_count: accounts.len(),
        record_count,
        total_balance: accounts.iter().map(|a| u128::from(a.balance)).sum(),
        mismatches,
        orphan_records,
        has_sequence_gaps,
        issues,
    }
}
