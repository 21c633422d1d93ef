use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OverdueConfig;
use crate::domain::{
    AttemptOutcome, Cents, CreditStatus, DefaultPolicy, EnforcementAttempt, HOUSE_ACCOUNT_ID,
    Installment, RunId, amortization, format_amount,
};
use crate::storage::Repository;

use super::ledger::Collection;
use super::{AppError, Ledger, NotificationSender};

/// Name of the persisted lease that keeps enforcement runs from overlapping
/// across processes.
pub const LEASE_NAME: &str = "overdue-enforcement";

/// Counters for one enforcement run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnforcementReport {
    pub run_id: RunId,
    pub scanned: usize,
    pub paid: usize,
    pub insufficient_funds: usize,
    pub failed: usize,
    /// Claimed by someone else between the scan and the attempt
    pub already_settled: usize,
    pub defaulted: usize,
    /// Penalty-inclusive total moved to the house account
    pub collected: Cents,
}

impl EnforcementReport {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            scanned: 0,
            paid: 0,
            insufficient_funds: 0,
            failed: 0,
            already_settled: 0,
            defaulted: 0,
            collected: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(EnforcementReport),
    /// Another run held the guard; nothing was touched
    Skipped,
}

enum ItemOutcome {
    Paid(Cents),
    Shortfall { defaulted: bool },
    AlreadySettled,
}

/// Collects overdue installments plus a penalty from the credit's account.
///
/// Installments are handled one at a time and independently: a failure on one
/// is logged, recorded and counted, and the run moves on.
pub struct OverdueProcessor {
    repo: Repository,
    notifier: Arc<dyn NotificationSender>,
    penalty_percent: u32,
    policy: DefaultPolicy,
    lease_ttl: chrono::Duration,
    running: Mutex<()>,
}

impl OverdueProcessor {
    pub fn new(
        repo: Repository,
        notifier: Arc<dyn NotificationSender>,
        settings: &OverdueConfig,
    ) -> Self {
        Self {
            repo,
            notifier,
            penalty_percent: settings.penalty_percent,
            policy: DefaultPolicy::from_threshold(settings.default_after_failed_attempts),
            lease_ttl: settings.lease_ttl(),
            running: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> DefaultPolicy {
        self.policy
    }

    /// Enforce every installment due strictly before `now`.
    ///
    /// Returns `RunOutcome::Skipped` when a run is already in progress in this
    /// process or another process holds the lease. The lease is timed on the
    /// wall clock whatever `now` is.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunOutcome, AppError> {
        let Ok(_running) = self.running.try_lock() else {
            info!("overdue enforcement already running, skipping");
            return Ok(RunOutcome::Skipped);
        };

        let run_id = Uuid::new_v4();
        if !self
            .repo
            .try_acquire_lease(LEASE_NAME, run_id, Utc::now(), self.lease_ttl)
            .await?
        {
            info!(%run_id, "enforcement lease held elsewhere, skipping");
            return Ok(RunOutcome::Skipped);
        }

        let result = self.process(run_id, now).await;

        if let Err(err) = self.repo.release_lease(LEASE_NAME, run_id).await {
            warn!(%run_id, error = %err, "failed to release enforcement lease");
        }

        result.map(RunOutcome::Completed)
    }

    async fn process(
        &self,
        run_id: RunId,
        now: DateTime<Utc>,
    ) -> Result<EnforcementReport, AppError> {
        let overdue = self.repo.list_overdue_installments(now).await?;

        let mut report = EnforcementReport::new(run_id);
        report.scanned = overdue.len();
        info!(%run_id, overdue = overdue.len(), "overdue enforcement started");

        for installment in &overdue {
            match self.enforce(run_id, installment).await {
                Ok(ItemOutcome::Paid(amount)) => {
                    report.paid += 1;
                    report.collected += amount;
                }
                Ok(ItemOutcome::Shortfall { defaulted }) => {
                    report.insufficient_funds += 1;
                    if defaulted {
                        report.defaulted += 1;
                    }
                }
                Ok(ItemOutcome::AlreadySettled) => report.already_settled += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        %run_id,
                        installment_id = installment.id,
                        credit_id = installment.credit_id,
                        error = %err,
                        "overdue installment could not be enforced"
                    );
                    let attempt = EnforcementAttempt::new(
                        installment.id,
                        run_id,
                        AttemptOutcome::Failed,
                        installment.amount,
                    )
                    .with_detail(err.to_string());
                    self.record(attempt).await;
                }
            }
        }

        info!(
            %run_id,
            scanned = report.scanned,
            paid = report.paid,
            insufficient_funds = report.insufficient_funds,
            failed = report.failed,
            collected = report.collected,
            "overdue enforcement finished"
        );
        Ok(report)
    }

    async fn enforce(
        &self,
        run_id: RunId,
        installment: &Installment,
    ) -> Result<ItemOutcome, AppError> {
        let credit = self
            .repo
            .get_credit(installment.credit_id)
            .await?
            .ok_or(AppError::CreditNotFound(installment.credit_id))?;
        let due = amortization::apply_penalty(installment.amount, self.penalty_percent)
            .ok_or_else(|| {
                AppError::InvalidAmount(format!(
                    "penalty on {} overflows",
                    format_amount(installment.amount)
                ))
            })?;

        // Claim, cover check and debit share one unit of work. Dropping it
        // releases the claim.
        let mut uow = self.repo.begin().await?;
        if !uow.mark_installment_paid(installment.id).await? {
            return Ok(ItemOutcome::AlreadySettled);
        }
        let balance =
            match Ledger::collect_within(&mut uow, credit.account_id, HOUSE_ACCOUNT_ID, due)
                .await?
            {
                Collection::Collected(transaction) => {
                    uow.commit().await?;

                    info!(
                        %run_id,
                        installment_id = installment.id,
                        credit_id = credit.id,
                        amount = due,
                        transaction_id = transaction.id,
                        "overdue installment collected"
                    );
                    self.record(EnforcementAttempt::new(
                        installment.id,
                        run_id,
                        AttemptOutcome::Paid,
                        due,
                    ))
                    .await;
                    return Ok(ItemOutcome::Paid(due));
                }
                Collection::Uncovered { balance } => balance,
            };
        drop(uow);

        info!(
            %run_id,
            installment_id = installment.id,
            credit_id = credit.id,
            balance,
            due,
            "insufficient funds for overdue installment"
        );
        self.record(
            EnforcementAttempt::new(
                installment.id,
                run_id,
                AttemptOutcome::InsufficientFunds,
                due,
            )
            .with_detail(format!("balance {}", format_amount(balance))),
        )
        .await;

        let message = format!("Payment due: {}", format_amount(due));
        if let Err(err) = self.notifier.notify(credit.owner_id, &message).await {
            warn!(owner_id = credit.owner_id, error = %err, "failed to send payment notification");
        }

        let defaulted = match self.policy {
            DefaultPolicy::Never => false,
            policy => {
                let shortfalls = self
                    .repo
                    .count_attempts(installment.id, AttemptOutcome::InsufficientFunds)
                    .await?;
                policy.should_default(shortfalls)
                    && self
                        .repo
                        .transition_credit_status(
                            credit.id,
                            CreditStatus::Active,
                            CreditStatus::Defaulted,
                        )
                        .await?
            }
        };
        if defaulted {
            warn!(credit_id = credit.id, owner_id = credit.owner_id, "credit marked defaulted");
        }

        Ok(ItemOutcome::Shortfall { defaulted })
    }

    async fn record(&self, mut attempt: EnforcementAttempt) {
        if let Err(err) = self.repo.record_attempt(&mut attempt).await {
            warn!(
                installment_id = attempt.installment_id,
                outcome = %attempt.outcome,
                error = %err,
                "failed to record enforcement attempt"
            );
        }
    }

    /// Latest enforcement attempts, newest first.
    pub async fn recent_attempts(&self, limit: u32) -> Result<Vec<EnforcementAttempt>, AppError> {
        Ok(self.repo.list_recent_attempts(limit).await?)
    }
}
