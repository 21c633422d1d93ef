mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use common::{
    FailingRateProvider, RecordingNotifier, TestEnv, parse_date, test_env, test_env_full,
    test_env_with,
};
use fenus::application::{LEASE_NAME, OverdueScheduler, RunOutcome};
use fenus::config::OverdueConfig;
use fenus::domain::{
    AttemptOutcome, Credit, CreditStatus, DefaultPolicy, HOUSE_ACCOUNT_ID, Installment,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

/// 1000.00 at 12% over 3 months: installments of 340.02, 374.02 with penalty
const INSTALLMENT: i64 = 34_002;
const WITH_PENALTY: i64 = 37_402;

/// Issue the standard credit on 2024-01-10; installments fall due on the 10th
/// of February, March and April.
async fn issue_credit(env: &TestEnv, owner: i64, account: i64) -> Result<Credit> {
    let created = env
        .credits
        .create_credit_at(owner, account, 100_000, Some(dec!(12)), 3, parse_date("2024-01-10"))
        .await?;
    assert_eq!(created.monthly_payment, INSTALLMENT);
    Ok(created.credit)
}

fn completed(outcome: RunOutcome) -> fenus::application::EnforcementReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::Skipped => panic!("run was unexpectedly skipped"),
    }
}

#[tokio::test]
async fn test_collects_overdue_installments_with_penalty() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 100_000).await?;
    let credit = issue_credit(&env, 1, account.id).await?;

    let report = completed(env.overdue.run_once(parse_date("2024-03-15")).await?);

    assert_eq!(report.scanned, 2);
    assert_eq!(report.paid, 2);
    assert_eq!(report.insufficient_funds, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.collected, 2 * WITH_PENALTY);

    assert_eq!(env.balance(&account).await?, 100_000 - 2 * WITH_PENALTY);

    let schedule = env.credits.get_schedule(1, credit.id).await?;
    assert!(schedule[0].paid);
    assert!(schedule[1].paid);
    assert!(!schedule[2].paid, "April installment is not yet due");

    let to_house: Vec<_> = env
        .repo
        .list_transactions_for_account(account.id)
        .await?
        .into_iter()
        .filter(|tx| tx.to_account == HOUSE_ACCOUNT_ID)
        .collect();
    assert_eq!(to_house.len(), 2);
    assert!(to_house.iter().all(|tx| tx.amount == WITH_PENALTY));

    assert!(env.notifier.sent().is_empty());
    assert!(env.ledger.check_integrity().await?.is_consistent());

    Ok(())
}

#[tokio::test]
async fn test_due_exactly_now_is_not_overdue() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 100_000).await?;
    issue_credit(&env, 1, account.id).await?;

    let report = completed(env.overdue.run_once(parse_date("2024-02-10")).await?);
    assert_eq!(report.scanned, 0);
    assert_eq!(env.balance(&account).await?, 100_000);

    Ok(())
}

#[tokio::test]
async fn test_exact_balance_is_enough() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, WITH_PENALTY).await?;
    issue_credit(&env, 1, account.id).await?;

    let report = completed(env.overdue.run_once(parse_date("2024-02-15")).await?);
    assert_eq!(report.paid, 1);
    assert_eq!(env.balance(&account).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_notifies_owner_once() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(5, 10_000).await?;
    let credit = issue_credit(&env, 5, account.id).await?;

    let report = completed(env.overdue.run_once(parse_date("2024-02-15")).await?);

    assert_eq!(report.insufficient_funds, 1);
    assert_eq!(report.paid, 0);
    assert_eq!(env.balance(&account).await?, 10_000);

    let schedule = env.credits.get_schedule(5, credit.id).await?;
    assert!(!schedule[0].paid);

    let sent = env.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 5);
    assert!(sent[0].1.contains("374.02 RUB"), "got {:?}", sent[0].1);

    let attempts = env.overdue.recent_attempts(10).await?;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, AttemptOutcome::InsufficientFunds);
    assert_eq!(attempts[0].amount, WITH_PENALTY);

    Ok(())
}

#[tokio::test]
async fn test_notification_failure_does_not_abort_run() -> Result<()> {
    let env = test_env_full(
        Arc::new(FailingRateProvider),
        Arc::new(RecordingNotifier::failing()),
        OverdueConfig::default(),
    )
    .await?;
    let poor = env.funded_account(1, 0).await?;
    let rich = env.funded_account(2, 100_000).await?;
    issue_credit(&env, 1, poor.id).await?;
    issue_credit(&env, 2, rich.id).await?;

    let report = completed(env.overdue.run_once(parse_date("2024-02-15")).await?);
    assert_eq!(report.insufficient_funds, 1);
    assert_eq!(report.paid, 1);
    assert_eq!(env.notifier.sent().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_one_broken_item_does_not_stop_the_batch() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 100_000).await?;
    issue_credit(&env, 1, account.id).await?;

    // A credit whose account has disappeared
    let mut orphan = Credit::new(
        2,
        4242,
        100_000,
        dec!(12),
        1,
        parse_date("2024-01-01"),
    );
    env.repo.insert_credit(&mut orphan).await?;
    let mut broken = Installment::new(orphan.id, parse_date("2024-02-01"), INSTALLMENT);
    env.repo.insert_installment(&mut broken).await?;

    let report = completed(env.overdue.run_once(parse_date("2024-02-15")).await?);

    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.paid, 1);
    assert_eq!(env.balance(&account).await?, 100_000 - WITH_PENALTY);

    let broken = env.repo.get_installment(broken.id).await?.unwrap();
    assert!(!broken.paid);
    assert_eq!(
        env.repo
            .count_attempts(broken.id, AttemptOutcome::Failed)
            .await?,
        1
    );

    Ok(())
}

#[tokio::test]
async fn test_run_skipped_while_lease_is_held() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 100_000).await?;
    issue_credit(&env, 1, account.id).await?;

    let now = parse_date("2024-03-15");
    let other = Uuid::new_v4();
    assert!(
        env.repo
            .try_acquire_lease(LEASE_NAME, other, Utc::now(), chrono::Duration::hours(1))
            .await?
    );

    assert_eq!(env.overdue.run_once(now).await?, RunOutcome::Skipped);
    assert_eq!(env.balance(&account).await?, 100_000);

    // Once the other holder lets go, the next run proceeds
    env.repo.release_lease(LEASE_NAME, other).await?;
    let report = completed(env.overdue.run_once(now).await?);
    assert_eq!(report.paid, 2);

    Ok(())
}

#[tokio::test]
async fn test_expired_lease_is_taken_over() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 100_000).await?;
    issue_credit(&env, 1, account.id).await?;

    // A crashed run left a lease behind that has since expired
    let stale_at = parse_date("2024-03-01");
    env.repo
        .try_acquire_lease(LEASE_NAME, Uuid::new_v4(), stale_at, chrono::Duration::hours(1))
        .await?;

    let report = completed(env.overdue.run_once(parse_date("2024-03-15")).await?);
    assert_eq!(report.paid, 2);

    Ok(())
}

#[tokio::test]
async fn test_lease_expiry_follows_wall_clock() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 100_000).await?;
    issue_credit(&env, 1, account.id).await?;

    // Expired an hour ago, though still in the future of the scan cutoff
    env.repo
        .try_acquire_lease(
            LEASE_NAME,
            Uuid::new_v4(),
            Utc::now() - chrono::Duration::hours(2),
            chrono::Duration::hours(1),
        )
        .await?;

    let cutoff = parse_date("2024-03-15");
    let report = completed(env.overdue.run_once(cutoff).await?);
    assert_eq!(report.paid, 2);

    // A live lease blocks a run whatever its cutoff
    assert!(
        env.repo
            .try_acquire_lease(LEASE_NAME, Uuid::new_v4(), Utc::now(), chrono::Duration::hours(1))
            .await?
    );
    assert_eq!(
        env.overdue.run_once(parse_date("2020-01-01")).await?,
        RunOutcome::Skipped
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_collection_racing_a_transfer_never_spends_funds_twice() -> Result<()> {
    for _ in 0..20 {
        let env = test_env().await?;
        let account = env.funded_account(1, WITH_PENALTY).await?;
        let other = env.funded_account(2, 0).await?;
        issue_credit(&env, 1, account.id).await?;

        let processor = Arc::clone(&env.overdue);
        let run = tokio::spawn(async move { processor.run_once(parse_date("2024-02-15")).await });
        let ledger = env.ledger.clone();
        let (from, to) = (account.id, other.id);
        let transfer = tokio::spawn(async move { ledger.transfer(from, to, WITH_PENALTY).await });

        let report = completed(run.await??);
        let transfer = transfer.await??;

        let history = env.ledger.list_transactions(account.id, 1).await?;
        let collection = history.iter().find(|tx| tx.is_to_house());
        if report.paid == 1 {
            // Collected from the funds before the transfer moved them
            let collection = collection.expect("collection record");
            assert!(collection.id < transfer.id);
            assert_eq!(env.balance(&account).await?, -WITH_PENALTY);
        } else {
            assert_eq!(report.insufficient_funds, 1);
            assert!(collection.is_none());
            assert_eq!(env.balance(&account).await?, 0);
            let schedule = env.repo.list_overdue_installments(parse_date("2024-02-15")).await?;
            assert_eq!(schedule.len(), 1);
        }
        assert!(env.ledger.check_integrity().await?.is_consistent());
    }

    Ok(())
}

#[tokio::test]
async fn test_penalty_overflow_fails_only_that_item() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 100_000).await?;
    issue_credit(&env, 1, account.id).await?;

    let mut huge = Credit::new(
        1,
        account.id,
        i64::MAX,
        dec!(12),
        1,
        parse_date("2024-01-01"),
    );
    env.repo.insert_credit(&mut huge).await?;
    let mut installment = Installment::new(huge.id, parse_date("2024-02-01"), i64::MAX);
    env.repo.insert_installment(&mut installment).await?;

    let report = completed(env.overdue.run_once(parse_date("2024-02-15")).await?);
    assert_eq!(report.failed, 1);
    assert_eq!(report.paid, 1);
    assert_eq!(env.balance(&account).await?, 100_000 - WITH_PENALTY);

    let installment = env.repo.get_installment(installment.id).await?.unwrap();
    assert!(!installment.paid);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_runs_never_double_collect() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 1_000_000).await?;
    issue_credit(&env, 1, account.id).await?;

    let now = parse_date("2024-05-01");
    let mut handles = Vec::new();
    for _ in 0..4 {
        let processor = Arc::clone(&env.overdue);
        handles.push(tokio::spawn(async move { processor.run_once(now).await }));
    }

    let mut paid = 0;
    for handle in handles {
        if let RunOutcome::Completed(report) = handle.await?? {
            paid += report.paid;
        }
    }

    assert_eq!(paid, 3);
    assert_eq!(env.balance(&account).await?, 1_000_000 - 3 * WITH_PENALTY);

    Ok(())
}

#[tokio::test]
async fn test_default_policy_marks_credit_defaulted() -> Result<()> {
    let settings = OverdueConfig {
        default_after_failed_attempts: Some(2),
        ..OverdueConfig::default()
    };
    let env = test_env_with(Arc::new(FailingRateProvider), settings).await?;
    assert_eq!(env.overdue.policy(), DefaultPolicy::AfterFailedAttempts(2));

    let account = env.funded_account(1, 0).await?;
    let credit = issue_credit(&env, 1, account.id).await?;
    let now = parse_date("2024-02-15");

    let first = completed(env.overdue.run_once(now).await?);
    assert_eq!(first.defaulted, 0);
    assert_eq!(
        env.credits.get_credit(1, credit.id).await?.status,
        CreditStatus::Active
    );

    let second = completed(env.overdue.run_once(now).await?);
    assert_eq!(second.defaulted, 1);
    assert_eq!(
        env.credits.get_credit(1, credit.id).await?.status,
        CreditStatus::Defaulted
    );

    // Already defaulted: no second transition, but enforcement continues
    let third = completed(env.overdue.run_once(now).await?);
    assert_eq!(third.defaulted, 0);
    assert_eq!(third.insufficient_funds, 1);

    env.ledger.deposit(account.id, WITH_PENALTY).await?;
    let fourth = completed(env.overdue.run_once(now).await?);
    assert_eq!(fourth.paid, 1);

    Ok(())
}

#[tokio::test]
async fn test_default_policy_off_keeps_credit_active() -> Result<()> {
    let env = test_env().await?;
    assert_eq!(env.overdue.policy(), DefaultPolicy::Never);

    let account = env.funded_account(1, 0).await?;
    let credit = issue_credit(&env, 1, account.id).await?;

    for _ in 0..3 {
        let report = completed(env.overdue.run_once(parse_date("2024-02-15")).await?);
        assert_eq!(report.insufficient_funds, 1);
    }
    assert_eq!(
        env.credits.get_credit(1, credit.id).await?.status,
        CreditStatus::Active
    );
    assert_eq!(env.notifier.sent().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_scheduler_runs_until_stopped() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 200_000).await?;
    let credit = issue_credit(&env, 1, account.id).await?;

    let handle = OverdueScheduler::new(
        Arc::clone(&env.overdue),
        Duration::from_millis(50),
        true,
    )
    .spawn();

    // All three 2024 installments are long overdue by now
    let mut settled = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let schedule = env.credits.get_schedule(1, credit.id).await?;
        if schedule.iter().all(|i| i.paid) {
            settled = true;
            break;
        }
    }
    handle.stop().await;

    assert!(settled, "scheduler did not settle the overdue installments");
    assert_eq!(env.balance(&account).await?, 200_000 - 3 * WITH_PENALTY);

    Ok(())
}

#[tokio::test]
async fn test_scheduler_stop_before_first_tick() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 200_000).await?;
    issue_credit(&env, 1, account.id).await?;

    let handle = OverdueScheduler::new(
        Arc::clone(&env.overdue),
        Duration::from_secs(3600),
        false,
    )
    .spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop().await;

    assert_eq!(env.balance(&account).await?, 200_000);
    assert!(env.overdue.recent_attempts(10).await?.is_empty());
    assert!(env.overdue.run_once(Utc::now()).await.is_ok());

    Ok(())
}

#[tokio::test]
async fn test_scheduler_accepts_huge_interval() -> Result<()> {
    let env = test_env().await?;

    let handle = OverdueScheduler::new(Arc::clone(&env.overdue), Duration::MAX, false).spawn();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!handle.is_finished(), "scheduler loop ended on its own");
    handle.stop().await;

    Ok(())
}
