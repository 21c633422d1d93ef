use std::sync::Arc;

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Cents, CreditId, InstallmentId, OwnerId};
use crate::storage::Repository;

use super::{AccountDirectory, AppError};

/// Expected balance of an account after its scheduled credit payments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceForecast {
    pub account_id: AccountId,
    pub as_of: DateTime<Utc>,
    pub horizon_end: DateTime<Utc>,
    pub current_balance: Cents,
    pub scheduled_payments: Cents,
    pub projected_balance: Cents,
    pub events: Vec<ForecastEvent>,
}

/// One unpaid installment falling inside the horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastEvent {
    pub installment_id: InstallmentId,
    pub credit_id: CreditId,
    pub due_date: DateTime<Utc>,
    pub amount: Cents,
    /// Balance once this and every earlier event is paid
    pub balance_after: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditLoad {
    pub owner_id: OwnerId,
    pub active_credits: usize,
    /// Sum of the original principal of active credits
    pub active_principal: Cents,
    /// Unpaid installments left on active credits
    pub outstanding: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub owner_id: OwnerId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub income: Cents,
    pub expenses: Cents,
    pub net: Cents,
}

/// Read-only views over accounts, credits and the transaction log.
#[derive(Clone)]
pub struct AnalyticsReader {
    repo: Repository,
    directory: Arc<dyn AccountDirectory>,
}

impl AnalyticsReader {
    pub fn new(repo: Repository, directory: Arc<dyn AccountDirectory>) -> Self {
        Self { repo, directory }
    }

    /// Current balance of an owned account minus the unpaid installments of
    /// its credits due in `(now, now + days]`. Penalties are not projected.
    pub async fn forecast_balance(
        &self,
        account_id: AccountId,
        owner_id: OwnerId,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<BalanceForecast, AppError> {
        let account = self.directory.get_account(account_id, owner_id).await?;

        let horizon_end = now + Duration::days(i64::from(days));
        let upcoming = self
            .repo
            .list_upcoming_installments_for_account(account.id, now, horizon_end)
            .await?;

        let mut running = account.balance;
        let events: Vec<ForecastEvent> = upcoming
            .into_iter()
            .map(|installment| {
                running = running.saturating_sub(installment.amount);
                ForecastEvent {
                    installment_id: installment.id,
                    credit_id: installment.credit_id,
                    due_date: installment.due_date,
                    amount: installment.amount,
                    balance_after: running,
                }
            })
            .collect();

        let scheduled_payments = events.iter().map(|e| e.amount).sum();

        Ok(BalanceForecast {
            account_id: account.id,
            as_of: now,
            horizon_end,
            current_balance: account.balance,
            scheduled_payments,
            projected_balance: account.balance.saturating_sub(scheduled_payments),
            events,
        })
    }

    /// Principal of the owner's active credits. Closed and defaulted credits
    /// are excluded.
    pub async fn credit_load(&self, owner_id: OwnerId) -> Result<CreditLoad, AppError> {
        let active: Vec<_> = self
            .repo
            .list_credits_for_owner(owner_id)
            .await?
            .into_iter()
            .filter(|credit| credit.is_active())
            .collect();

        let outstanding = self.repo.sum_outstanding_for_owner(owner_id).await?;

        Ok(CreditLoad {
            owner_id,
            active_credits: active.len(),
            active_principal: active.iter().map(|c| c.principal).sum(),
            outstanding,
        })
    }

    /// Money into and out of the owner's accounts during one calendar month (UTC).
    pub async fn monthly_summary(
        &self,
        owner_id: OwnerId,
        year: i32,
        month: u32,
    ) -> Result<MonthlySummary, AppError> {
        let (period_start, period_end) = month_bounds(year, month)?;

        let income = self
            .repo
            .sum_incoming_for_owner(owner_id, period_start, period_end)
            .await?;
        let expenses = self
            .repo
            .sum_outgoing_for_owner(owner_id, period_start, period_end)
            .await?;

        Ok(MonthlySummary {
            owner_id,
            period_start,
            period_end,
            income,
            expenses,
            net: income - expenses,
        })
    }
}

/// `[first instant of the month, first instant of the next month)`
fn month_bounds(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let invalid = || AppError::InvalidPeriod(format!("{}-{:02}", year, month));

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next = first.checked_add_months(Months::new(1)).ok_or_else(invalid)?;

    let start = first.and_hms_opt(0, 0, 0).ok_or_else(invalid)?.and_utc();
    let end = next.and_hms_opt(0, 0, 0).ok_or_else(invalid)?.and_utc();
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_month_bounds() {
        let (start, end) = month_bounds(2024, 12).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_month_bounds_rejects_bad_month() {
        assert!(matches!(month_bounds(2024, 13), Err(AppError::InvalidPeriod(_))));
        assert!(matches!(month_bounds(2024, 0), Err(AppError::InvalidPeriod(_))));
    }
}
