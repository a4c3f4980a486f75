// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use balance_ledger::application::Ledger;
use balance_ledger::config::Config;
use balance_ledger::domain::{SortKey, sum_deltas};
use tempfile::TempDir;

/// Config pointing at a fresh database inside `temp_dir`
pub fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .into_owned();
    config
}

/// Helper to create a ledger with a temporary database
pub async fn test_ledger() -> Result<(Ledger, TempDir)> {
    test_ledger_with(|_| {}).await
}

/// Same as `test_ledger`, with the config adjusted before connecting
pub async fn test_ledger_with(adjust: impl FnOnce(&mut Config)) -> Result<(Ledger, TempDir)> {
    let temp_dir = TempDir::new()?;
    let mut config = test_config(&temp_dir);
    adjust(&mut config);
    let ledger = Ledger::init(&config).await?;
    Ok((ledger, temp_dir))
}

/// Assert every account's balance equals the sum of its log deltas
pub async fn assert_balances_match_log(ledger: &Ledger) -> Result<()> {
    let report = ledger.queries().check_integrity().await?;
    assert!(report.is_healthy(), "ledger issues: {:?}", report.issues);

    let queries = ledger.queries();
    for account in queries.accounts().await? {
        let log = queries.log(account.id, SortKey::Sequence).await?;
        assert_eq!(
            i128::from(sum_deltas(&log)),
            i128::from(account.balance),
            "account {} log does not add up",
            account.id
        );
    }
    Ok(())
}
