mod common;

use std::time::Duration;

use anyhow::Result;
use balance_ledger::application::LedgerError;
use balance_ledger::storage::accounts;
use common::{assert_balances_match_log, test_ledger, test_ledger_with};

#[tokio::test]
async fn test_transfer_moves_money_and_logs_both_legs() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    ledger.credit(1, 100, None).await?;

    let receipt = ledger.transfer(1, 2, 40, None).await?;

    assert_eq!(receipt.from.balance, 60);
    assert_eq!(receipt.to.balance, 40);
    assert_eq!(ledger.get_balance(1).await?, 60);
    assert_eq!(ledger.get_balance(2).await?, 40);

    let from_log = ledger.get_log(1, None).await?;
    let to_log = ledger.get_log(2, None).await?;
    assert_eq!(from_log[0].delta, -40);
    assert_eq!(from_log[0].description, "Transfer money from 1 to 2");
    assert_eq!(to_log.len(), 1);
    assert_eq!(to_log[0].delta, 40);
    assert_eq!(to_log[0].description, from_log[0].description);
    assert_eq!(to_log[0].created_at, from_log[0].created_at);

    Ok(())
}

#[tokio::test]
async fn test_failed_transfer_leaves_no_trace() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    ledger.credit(1, 30, None).await?;

    let err = ledger.transfer(1, 2, 31, None).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));

    assert_eq!(ledger.get_balance(1).await?, 30);
    assert_eq!(ledger.get_log(1, None).await?.len(), 1);
    assert_eq!(ledger.queries().balance(2).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_transfer_rejects_bad_input() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    ledger.credit(1, 30, None).await?;

    assert!(matches!(
        ledger.transfer(1, 1, 10, None).await,
        Err(LedgerError::SameAccount(1))
    ));
    assert!(matches!(
        ledger.transfer(1, 2, 0, None).await,
        Err(LedgerError::InvalidAmount(_))
    ));
    assert_eq!(ledger.get_balance(1).await?, 30);

    Ok(())
}

#[tokio::test]
async fn test_transfers_conserve_total() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    ledger.credit(1, 1000, None).await?;
    ledger.credit(2, 500, None).await?;

    let plan = [(1, 2, 300), (2, 3, 650), (3, 1, 100), (1, 3, 2000), (3, 2, 50)];
    for (from, to, amount) in plan {
        let _ = ledger.transfer(from, to, amount, None).await;
    }

    let total: u64 = ledger
        .queries()
        .accounts()
        .await?
        .iter()
        .map(|a| a.balance)
        .sum();
    assert_eq!(total, 1500);
    assert_balances_match_log(&ledger).await?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_debits_never_overdraw() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    ledger.credit(1, 100, None).await?;

    let (a, b) = tokio::join!(ledger.debit(1, 60, None), ledger.debit(1, 50, None));

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let failure = if a.is_err() { a } else { b };
    assert!(matches!(
        failure,
        Err(LedgerError::InsufficientBalance { .. })
    ));

    let balance = ledger.get_balance(1).await?;
    assert!(balance == 40 || balance == 50);
    assert_balances_match_log(&ledger).await?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_complete() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    ledger.credit(1, 500, None).await?;
    ledger.credit(2, 500, None).await?;

    let mut handles = Vec::new();
    for i in 0..10u64 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                ledger.transfer(1, 2, 10, None).await
            } else {
                ledger.transfer(2, 1, 20, None).await
            }
        }));
    }

    for handle in handles {
        handle.await??;
    }

    assert_eq!(ledger.get_balance(1).await?, 550);
    assert_eq!(ledger.get_balance(2).await?, 450);
    assert_balances_match_log(&ledger).await?;

    Ok(())
}

#[tokio::test]
async fn test_deadline_exceeded_is_conflict() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;

    // Hold the write lock from another scope.
    let mut holder = ledger.repository().begin().await?;
    accounts::ensure_account(&mut holder, 99).await?;

    let err = ledger
        .with_deadline(Duration::from_millis(100))
        .credit(7, 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)));

    let err = ledger
        .with_deadline(Duration::from_millis(100))
        .transfer(99, 7, 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)));

    holder.rollback().await?;

    let queries = ledger.queries();
    assert_eq!(queries.balance(7).await?, None);
    assert_eq!(queries.balance(99).await?, None);
    assert!(queries.log(7, Default::default()).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transfer_gives_up_after_bounded_retries() -> Result<()> {
    let (ledger, _temp) = test_ledger_with(|config| {
        config.database.busy_timeout_ms = 50;
        config.ledger.max_transfer_retries = 2;
        config.ledger.deadline_ms = 10_000;
    })
    .await?;
    ledger.credit(1, 100, None).await?;
    ledger.credit(2, 5, None).await?;

    let mut holder = ledger.repository().begin().await?;
    accounts::ensure_account(&mut holder, 99).await?;

    let err = ledger.transfer(1, 2, 10, None).await.unwrap_err();
    let attempts = ledger.options().max_transfer_retries + 1;
    match &err {
        LedgerError::Conflict(msg) => {
            assert!(
                msg.contains(&format!("after {} attempts", attempts)),
                "unexpected message: {}",
                msg
            );
        }
        other => panic!("expected conflict, got {:?}", other),
    }

    holder.rollback().await?;

    assert_eq!(ledger.get_balance(1).await?, 100);
    assert_eq!(ledger.get_balance(2).await?, 5);
    assert_eq!(ledger.get_log(1, None).await?.len(), 1);
    assert_eq!(ledger.get_log(2, None).await?.len(), 1);
    assert_balances_match_log(&ledger).await?;

    Ok(())
}
