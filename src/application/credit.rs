use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::CreditConfig;
use crate::domain::{
    AccountId, Cents, Credit, CreditId, HOUSE_ACCOUNT_ID, Installment, InstallmentId, OwnerId,
    Transaction, amortization,
};
use crate::storage::Repository;

use super::{AccountDirectory, AppError, Ledger, RateProvider};

/// Where the rate of a new credit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// Supplied by the caller
    Requested,
    /// Fetched from the rate provider
    Provider,
    /// Provider failed; configured default used
    Fallback,
}

/// Result of originating a credit
#[derive(Debug, Clone)]
pub struct CreatedCredit {
    pub credit: Credit,
    pub schedule: Vec<Installment>,
    pub monthly_payment: Cents,
    pub rate_source: RateSource,
}

/// Result of an explicit installment payment
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    Paid(Transaction),
    /// Nothing was moved; the installment had been settled before
    AlreadyPaid,
}

/// Originates credits and owns their repayment schedules.
pub struct CreditEngine {
    repo: Repository,
    directory: Arc<dyn AccountDirectory>,
    rates: Arc<dyn RateProvider>,
    settings: CreditConfig,
}

impl CreditEngine {
    pub fn new(
        repo: Repository,
        directory: Arc<dyn AccountDirectory>,
        rates: Arc<dyn RateProvider>,
        settings: CreditConfig,
    ) -> Self {
        Self {
            repo,
            directory,
            rates,
            settings,
        }
    }

    /// Issue a credit against an owned account and persist its annuity schedule.
    /// A missing or non-positive `rate` is resolved through the rate provider.
    pub async fn create_credit(
        &self,
        owner_id: OwnerId,
        account_id: AccountId,
        principal: Cents,
        rate: Option<Decimal>,
        term_months: u32,
    ) -> Result<CreatedCredit, AppError> {
        self.create_credit_at(owner_id, account_id, principal, rate, term_months, Utc::now())
            .await
    }

    /// Same as `create_credit`, with an explicit issue time that anchors the
    /// due dates.
    pub async fn create_credit_at(
        &self,
        owner_id: OwnerId,
        account_id: AccountId,
        principal: Cents,
        rate: Option<Decimal>,
        term_months: u32,
        issued_at: DateTime<Utc>,
    ) -> Result<CreatedCredit, AppError> {
        if principal <= 0 {
            return Err(AppError::InvalidCreditParameters(format!(
                "principal must be positive, got {}",
                principal
            )));
        }
        if term_months == 0 || term_months > self.settings.max_term_months {
            return Err(AppError::InvalidCreditParameters(format!(
                "term must be between 1 and {} months, got {}",
                self.settings.max_term_months, term_months
            )));
        }

        let account = self.directory.get_account(account_id, owner_id).await?;
        let (rate, rate_source) = self.resolve_rate(rate).await;

        // Compute everything before writing so arithmetic errors persist nothing
        let payments = amortization::build_schedule(principal, rate, term_months, issued_at)?;
        let monthly_payment = payments.first().map(|p| p.amount).unwrap_or_default();
        if monthly_payment <= 0 {
            return Err(AppError::InvalidCreditParameters(
                "principal too small for the term: installments round to zero".to_string(),
            ));
        }

        let mut credit = Credit::new(
            owner_id,
            account.id,
            principal,
            rate,
            term_months,
            issued_at,
        );
        self.repo.insert_credit(&mut credit).await?;

        // A store failure here aborts the rest; earlier rows stay written
        let mut schedule = Vec::with_capacity(payments.len());
        for payment in payments {
            let mut installment = Installment::new(credit.id, payment.due_date, payment.amount);
            self.repo.insert_installment(&mut installment).await?;
            schedule.push(installment);
        }

        info!(
            credit_id = credit.id,
            owner_id,
            account_id = account.id,
            principal,
            rate = %rate,
            term_months,
            monthly_payment,
            "credit issued"
        );

        Ok(CreatedCredit {
            credit,
            schedule,
            monthly_payment,
            rate_source,
        })
    }

    async fn resolve_rate(&self, requested: Option<Decimal>) -> (Decimal, RateSource) {
        if let Some(rate) = requested.filter(|r| *r > Decimal::ZERO) {
            return (rate, RateSource::Requested);
        }

        let fallback = self.settings.default_rate_percent;
        match self.rates.current_rate().await {
            Ok(rate) if rate > Decimal::ZERO => (rate, RateSource::Provider),
            Ok(rate) => {
                warn!(
                    provided = %rate,
                    fallback = %fallback,
                    "rate provider returned a non-positive rate, using default"
                );
                (fallback, RateSource::Fallback)
            }
            Err(err) => {
                warn!(error = %err, fallback = %fallback, "rate lookup failed, using default");
                (fallback, RateSource::Fallback)
            }
        }
    }

    /// Get a credit belonging to `owner_id`.
    pub async fn get_credit(
        &self,
        owner_id: OwnerId,
        credit_id: CreditId,
    ) -> Result<Credit, AppError> {
        self.repo
            .get_credit(credit_id)
            .await?
            .filter(|credit| credit.owner_id == owner_id)
            .ok_or(AppError::CreditNotFound(credit_id))
    }

    /// Credits issued against an owned account.
    pub async fn list_credits(
        &self,
        owner_id: OwnerId,
        account_id: AccountId,
    ) -> Result<Vec<Credit>, AppError> {
        let account = self.directory.get_account(account_id, owner_id).await?;
        Ok(self.repo.list_credits_for_account(account.id).await?)
    }

    /// Every credit of an owner.
    pub async fn list_credits_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Credit>, AppError> {
        Ok(self.repo.list_credits_for_owner(owner_id).await?)
    }

    /// Repayment schedule of an owned credit, ordered by due date.
    pub async fn get_schedule(
        &self,
        owner_id: OwnerId,
        credit_id: CreditId,
    ) -> Result<Vec<Installment>, AppError> {
        let credit = self.get_credit(owner_id, credit_id).await?;
        Ok(self.repo.list_installments_for_credit(credit.id).await?)
    }

    /// Pay one installment from the credit's account to the house account.
    /// Claiming the installment and moving the money commit together; paying
    /// an already settled installment moves nothing.
    pub async fn pay_installment(
        &self,
        owner_id: OwnerId,
        installment_id: InstallmentId,
    ) -> Result<PaymentOutcome, AppError> {
        let installment = self
            .repo
            .get_installment(installment_id)
            .await?
            .ok_or(AppError::InstallmentNotFound(installment_id))?;

        let credit = self
            .get_credit(owner_id, installment.credit_id)
            .await
            .map_err(|err| match err {
                AppError::CreditNotFound(_) => AppError::InstallmentNotFound(installment_id),
                other => other,
            })?;

        if installment.paid {
            return Ok(PaymentOutcome::AlreadyPaid);
        }

        let mut uow = self.repo.begin().await?;
        if !uow.mark_installment_paid(installment.id).await? {
            return Ok(PaymentOutcome::AlreadyPaid);
        }
        let transaction = Ledger::transfer_within(
            &mut uow,
            credit.account_id,
            HOUSE_ACCOUNT_ID,
            installment.amount,
        )
        .await?;
        uow.commit().await?;

        info!(
            installment_id,
            credit_id = credit.id,
            amount = installment.amount,
            "installment paid"
        );
        Ok(PaymentOutcome::Paid(transaction))
    }

    /// Flag an installment as paid without moving money (e.g. settled out of
    /// band). Returns whether the flag changed; repeating the call is a no-op.
    pub async fn mark_installment_paid(
        &self,
        installment_id: InstallmentId,
    ) -> Result<bool, AppError> {
        if self.repo.get_installment(installment_id).await?.is_none() {
            return Err(AppError::InstallmentNotFound(installment_id));
        }

        let mut uow = self.repo.begin().await?;
        let changed = uow.mark_installment_paid(installment_id).await?;
        uow.commit().await?;

        if changed {
            info!(installment_id, "installment marked paid");
        }
        Ok(changed)
    }
}
