use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::{
    Account, AccountId, Cents, HOUSE_ACCOUNT_ID, IntegrityReport, OwnerId, Transaction, reconcile,
};
use crate::storage::{BalanceChange, Repository, UnitOfWork};

use super::{AccountDirectory, AppError};

/// Outcome of a covered collection
#[derive(Debug)]
pub(crate) enum Collection {
    Collected(Transaction),
    Uncovered { balance: Cents },
}

/// Moves money between accounts. Every movement is all-or-nothing and leaves
/// exactly one transaction record behind.
///
/// Policy: no overdraft check. A transfer debits the source whatever its
/// resulting balance. Callers that need cover (the overdue processor) go
/// through `collect_within`. A credit that would overflow a balance is
/// rejected with `InvalidAmount`.
#[derive(Clone)]
pub struct Ledger {
    repo: Repository,
}

impl Ledger {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Account operations
    // ========================

    /// Open an empty account for an owner.
    pub async fn open_account(&self, owner_id: OwnerId) -> Result<Account, AppError> {
        let mut account = Account::new(owner_id);
        self.repo.insert_account(&mut account).await?;
        info!(account_id = account.id, owner_id, "account opened");
        Ok(account)
    }

    /// Look up an account regardless of owner. Used by background jobs.
    pub async fn find_account(&self, account_id: AccountId) -> Result<Account, AppError> {
        self.repo
            .get_account(account_id)
            .await?
            .ok_or(AppError::AccountNotFound(account_id))
    }

    /// List an owner's accounts.
    pub async fn list_accounts(&self, owner_id: OwnerId) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts_for_owner(owner_id).await?)
    }

    /// Transaction history of an owned account, oldest first.
    pub async fn list_transactions(
        &self,
        account_id: AccountId,
        owner_id: OwnerId,
    ) -> Result<Vec<Transaction>, AppError> {
        let account = AccountDirectory::get_account(self, account_id, owner_id).await?;
        Ok(self.repo.list_transactions_for_account(account.id).await?)
    }

    // ========================
    // Money movement
    // ========================

    /// Credit money from outside the ledger to an account.
    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: Cents,
    ) -> Result<Transaction, AppError> {
        validate_amount(amount)?;

        let mut uow = self.repo.begin().await?;
        ensure_applied(uow.adjust_balance(account_id, amount).await?, account_id)?;

        let mut record = Transaction::deposit(account_id, amount);
        uow.insert_transaction(&mut record).await?;
        uow.commit().await?;

        info!(account_id, amount, transaction_id = record.id, "deposit");
        Ok(record)
    }

    /// Move `amount` from one account to another, or to the house account
    /// when `to == HOUSE_ACCOUNT_ID`.
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Cents,
    ) -> Result<Transaction, AppError> {
        validate_transfer(from, to, amount)?;

        let mut uow = self.repo.begin().await?;
        let record = Self::transfer_within(&mut uow, from, to, amount).await?;
        uow.commit().await?;

        info!(
            from,
            to,
            amount,
            transaction_id = record.id,
            "transfer committed"
        );
        Ok(record)
    }

    /// The transfer legs and record, executed inside a caller-owned unit of
    /// work so they can commit together with other changes. On error the
    /// caller must drop `uow` without committing.
    pub(crate) async fn transfer_within(
        uow: &mut UnitOfWork,
        from: AccountId,
        to: AccountId,
        amount: Cents,
    ) -> Result<Transaction, AppError> {
        validate_transfer(from, to, amount)?;

        ensure_applied(uow.adjust_balance(from, -amount).await?, from)?;
        Self::credit_leg(uow, from, to, amount).await
    }

    /// Like `transfer_within`, but the source is debited only if its balance,
    /// as seen inside `uow`, covers `amount`. Nothing is changed otherwise.
    pub(crate) async fn collect_within(
        uow: &mut UnitOfWork,
        from: AccountId,
        to: AccountId,
        amount: Cents,
    ) -> Result<Collection, AppError> {
        validate_transfer(from, to, amount)?;

        match uow.withdraw_covered(from, amount).await? {
            BalanceChange::Insufficient(balance) => return Ok(Collection::Uncovered { balance }),
            change => ensure_applied(change, from)?,
        }
        Self::credit_leg(uow, from, to, amount)
            .await
            .map(Collection::Collected)
    }

    async fn credit_leg(
        uow: &mut UnitOfWork,
        from: AccountId,
        to: AccountId,
        amount: Cents,
    ) -> Result<Transaction, AppError> {
        if to != HOUSE_ACCOUNT_ID {
            ensure_applied(uow.adjust_balance(to, amount).await?, to)?;
        }

        let mut record = Transaction::transfer(from, to, amount);
        uow.insert_transaction(&mut record).await?;
        debug!(from, to, amount, "transfer legs applied");
        Ok(record)
    }

    // ========================
    // Integrity
    // ========================

    /// Compare every stored balance with the transaction log.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let accounts = self.repo.list_accounts().await?;
        let transactions = self.repo.list_transactions().await?;
        Ok(reconcile(&accounts, &transactions))
    }
}

#[async_trait]
impl AccountDirectory for Ledger {
    async fn get_account(
        &self,
        account_id: AccountId,
        owner_id: OwnerId,
    ) -> Result<Account, AppError> {
        self.repo
            .get_account(account_id)
            .await?
            .filter(|account| account.is_owned_by(owner_id))
            .ok_or(AppError::AccountNotFound(account_id))
    }
}

fn ensure_applied(change: BalanceChange, account_id: AccountId) -> Result<(), AppError> {
    match change {
        BalanceChange::Applied(_) => Ok(()),
        BalanceChange::AccountMissing => Err(AppError::AccountNotFound(account_id)),
        BalanceChange::Overflow => Err(AppError::InvalidAmount(format!(
            "balance of account {} would overflow",
            account_id
        ))),
        BalanceChange::Insufficient(balance) => Err(AppError::InvalidTransfer(format!(
            "account {} holds only {}",
            account_id, balance
        ))),
    }
}

fn validate_amount(amount: Cents) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount(format!(
            "Amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

fn validate_transfer(from: AccountId, to: AccountId, amount: Cents) -> Result<(), AppError> {
    validate_amount(amount)?;
    if from == to {
        return Err(AppError::InvalidTransfer(
            "source and destination are the same account".to_string(),
        ));
    }
    if from == HOUSE_ACCOUNT_ID {
        return Err(AppError::InvalidTransfer(
            "the house account cannot be debited".to_string(),
        ));
    }
    Ok(())
}
