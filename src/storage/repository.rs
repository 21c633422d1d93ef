use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::{
    Account, AccountId, AttemptOutcome, Cents, Credit, CreditId, CreditStatus,
    EnforcementAttempt, Installment, InstallmentId, OwnerId, Transaction,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_ENFORCEMENT};

const ACCOUNT_COLUMNS: &str = "id, owner_id, balance, currency, created_at";
const TRANSACTION_COLUMNS: &str =
    "id, from_account_id, to_account_id, amount, currency, created_at";
const CREDIT_COLUMNS: &str = "id, owner_id, account_id, amount, rate, period, status, created_at";
const INSTALLMENT_COLUMNS: &str = "id, credit_id, due_date, amount, paid, created_at";

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that SQL
/// string comparison orders them chronologically.
pub fn encode_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(value: &str, what: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {} timestamp", what))?
        .with_timezone(&Utc))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .with_context(|| format!("Invalid value in column {}", name))
}

/// Result of changing an account balance inside a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    /// The new balance
    Applied(Cents),
    AccountMissing,
    /// The result would not fit in `Cents`; the balance is unchanged
    Overflow,
    /// A covered withdrawal found less than the amount; carries the balance seen
    Insufficient(Cents),
}

/// Repository for persisting and querying accounts, transactions, credits
/// and their payment schedules.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to an existing SQLite database.
    pub async fn connect(settings: &DatabaseConfig) -> Result<Self> {
        Self::open(settings, false).await
    }

    /// Create the database if needed and run migrations.
    pub async fn init(settings: &DatabaseConfig) -> Result<Self> {
        let repo = Self::open(settings, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn open(settings: &DatabaseConfig, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)
            .with_context(|| format!("Invalid database URL: {}", settings.url))?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(settings.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_ENFORCEMENT)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Start an atomic unit of work. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(UnitOfWork { tx })
    }

    // ========================
    // Account operations
    // ========================

    /// Insert a new account and assign its id.
    pub async fn insert_account(&self, account: &mut Account) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (owner_id, balance, currency, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(account.owner_id)
        .bind(account.balance)
        .bind(&account.currency)
        .bind(encode_timestamp(&account.created_at))
        .fetch_one(&self.pool)
        .await
        .context("Failed to save account")?;

        account.id = column(&row, "id")?;
        Ok(())
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// List accounts belonging to an owner.
    pub async fn list_accounts_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE owner_id = ? ORDER BY id",
            ACCOUNT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    /// List every account.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!("SELECT {} FROM accounts ORDER BY id", ACCOUNT_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let created_at: String = column(row, "created_at")?;

        Ok(Account {
            id: column(row, "id")?,
            owner_id: column(row, "owner_id")?,
            balance: column(row, "balance")?,
            currency: column(row, "currency")?,
            created_at: decode_timestamp(&created_at, "account created_at")?,
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// List transactions touching an account (as source or destination), oldest first.
    pub async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE from_account_id = ? OR to_account_id = ? ORDER BY id",
            TRANSACTION_COLUMNS
        ))
        .bind(account_id)
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for account")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// List the whole transaction log, oldest first.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions ORDER BY id",
            TRANSACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Total credited to the owner's accounts within `[from, to)`.
    pub async fn sum_incoming_for_owner(
        &self,
        owner_id: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(t.amount), 0) as total
            FROM transactions t
            JOIN accounts a ON t.to_account_id = a.id
            WHERE a.owner_id = ? AND t.created_at >= ? AND t.created_at < ?
            "#,
        )
        .bind(owner_id)
        .bind(encode_timestamp(&from))
        .bind(encode_timestamp(&to))
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum incoming transactions")?;

        column(&row, "total")
    }

    /// Total debited from the owner's accounts within `[from, to)`.
    pub async fn sum_outgoing_for_owner(
        &self,
        owner_id: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(t.amount), 0) as total
            FROM transactions t
            JOIN accounts a ON t.from_account_id = a.id
            WHERE a.owner_id = ? AND t.created_at >= ? AND t.created_at < ?
            "#,
        )
        .bind(owner_id)
        .bind(encode_timestamp(&from))
        .bind(encode_timestamp(&to))
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum outgoing transactions")?;

        column(&row, "total")
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let created_at: String = column(row, "created_at")?;

        Ok(Transaction {
            id: column(row, "id")?,
            from_account: column(row, "from_account_id")?,
            to_account: column(row, "to_account_id")?,
            amount: column(row, "amount")?,
            currency: column(row, "currency")?,
            created_at: decode_timestamp(&created_at, "transaction created_at")?,
        })
    }

    // ========================
    // Credit operations
    // ========================

    /// Insert a new credit and assign its id.
    pub async fn insert_credit(&self, credit: &mut Credit) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO credits (owner_id, account_id, amount, rate, period, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(credit.owner_id)
        .bind(credit.account_id)
        .bind(credit.principal)
        .bind(credit.annual_rate_percent.to_string())
        .bind(i64::from(credit.term_months))
        .bind(credit.status.as_str())
        .bind(encode_timestamp(&credit.created_at))
        .fetch_one(&self.pool)
        .await
        .context("Failed to save credit")?;

        credit.id = column(&row, "id")?;
        Ok(())
    }

    /// Get a credit by ID.
    pub async fn get_credit(&self, id: CreditId) -> Result<Option<Credit>> {
        let row = sqlx::query(&format!("SELECT {} FROM credits WHERE id = ?", CREDIT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch credit")?;

        row.as_ref().map(Self::row_to_credit).transpose()
    }

    /// List credits issued against an account.
    pub async fn list_credits_for_account(&self, account_id: AccountId) -> Result<Vec<Credit>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM credits WHERE account_id = ? ORDER BY id",
            CREDIT_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list credits for account")?;

        rows.iter().map(Self::row_to_credit).collect()
    }

    /// List credits belonging to an owner.
    pub async fn list_credits_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Credit>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM credits WHERE owner_id = ? ORDER BY id",
            CREDIT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list credits for owner")?;

        rows.iter().map(Self::row_to_credit).collect()
    }

    /// Move a credit from `from` to `to`. Returns false if it was not in `from`.
    pub async fn transition_credit_status(
        &self,
        id: CreditId,
        from: CreditStatus,
        to: CreditStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE credits SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .context("Failed to update credit status")?;

        Ok(result.rows_affected() == 1)
    }

    fn row_to_credit(row: &SqliteRow) -> Result<Credit> {
        let rate: String = column(row, "rate")?;
        let period: i64 = column(row, "period")?;
        let status: String = column(row, "status")?;
        let created_at: String = column(row, "created_at")?;

        Ok(Credit {
            id: column(row, "id")?,
            owner_id: column(row, "owner_id")?,
            account_id: column(row, "account_id")?,
            principal: column(row, "amount")?,
            annual_rate_percent: Decimal::from_str(&rate).context("Invalid credit rate")?,
            term_months: u32::try_from(period).context("Invalid credit period")?,
            status: CreditStatus::from_str(&status)
                .ok_or_else(|| anyhow::anyhow!("Invalid credit status: {}", status))?,
            created_at: decode_timestamp(&created_at, "credit created_at")?,
        })
    }

    // ========================
    // Installment operations
    // ========================

    /// Insert one scheduled installment and assign its id.
    pub async fn insert_installment(&self, installment: &mut Installment) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO payment_schedules (credit_id, due_date, amount, paid, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(installment.credit_id)
        .bind(encode_timestamp(&installment.due_date))
        .bind(installment.amount)
        .bind(installment.paid)
        .bind(encode_timestamp(&installment.created_at))
        .fetch_one(&self.pool)
        .await
        .context("Failed to save installment")?;

        installment.id = column(&row, "id")?;
        Ok(())
    }

    /// Get an installment by ID.
    pub async fn get_installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_schedules WHERE id = ?",
            INSTALLMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch installment")?;

        row.as_ref().map(Self::row_to_installment).transpose()
    }

    /// The schedule of a credit, ordered by due date.
    pub async fn list_installments_for_credit(
        &self,
        credit_id: CreditId,
    ) -> Result<Vec<Installment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payment_schedules WHERE credit_id = ? ORDER BY due_date, id",
            INSTALLMENT_COLUMNS
        ))
        .bind(credit_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list installments")?;

        rows.iter().map(Self::row_to_installment).collect()
    }

    /// Unpaid installments with a due date strictly before `before`.
    pub async fn list_overdue_installments(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<Installment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payment_schedules WHERE due_date < ? AND paid = 0 ORDER BY due_date, id",
            INSTALLMENT_COLUMNS
        ))
        .bind(encode_timestamp(&before))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list overdue installments")?;

        rows.iter().map(Self::row_to_installment).collect()
    }

    /// Unpaid installments of all credits on an account due within `(after, until]`.
    pub async fn list_upcoming_installments_for_account(
        &self,
        account_id: AccountId,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Installment>> {
        let rows = sqlx::query(
            r#"
            SELECT ps.id, ps.credit_id, ps.due_date, ps.amount, ps.paid, ps.created_at
            FROM payment_schedules ps
            JOIN credits c ON ps.credit_id = c.id
            WHERE c.account_id = ? AND ps.paid = 0 AND ps.due_date > ? AND ps.due_date <= ?
            ORDER BY ps.due_date, ps.id
            "#,
        )
        .bind(account_id)
        .bind(encode_timestamp(&after))
        .bind(encode_timestamp(&until))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list upcoming installments")?;

        rows.iter().map(Self::row_to_installment).collect()
    }

    /// Sum of unpaid installments across the owner's active credits.
    pub async fn sum_outstanding_for_owner(&self, owner_id: OwnerId) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(ps.amount), 0) as total
            FROM payment_schedules ps
            JOIN credits c ON ps.credit_id = c.id
            WHERE c.owner_id = ? AND c.status = ? AND ps.paid = 0
            "#,
        )
        .bind(owner_id)
        .bind(CreditStatus::Active.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum outstanding installments")?;

        column(&row, "total")
    }

    fn row_to_installment(row: &SqliteRow) -> Result<Installment> {
        let due_date: String = column(row, "due_date")?;
        let created_at: String = column(row, "created_at")?;

        Ok(Installment {
            id: column(row, "id")?,
            credit_id: column(row, "credit_id")?,
            due_date: decode_timestamp(&due_date, "installment due_date")?,
            amount: column(row, "amount")?,
            paid: column::<i32>(row, "paid")? != 0,
            created_at: decode_timestamp(&created_at, "installment created_at")?,
        })
    }

    // ========================
    // Enforcement bookkeeping
    // ========================

    /// Append an enforcement attempt to the audit log.
    pub async fn record_attempt(&self, attempt: &mut EnforcementAttempt) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO enforcement_attempts (installment_id, run_id, outcome, amount, detail, attempted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(attempt.installment_id)
        .bind(attempt.run_id.to_string())
        .bind(attempt.outcome.as_str())
        .bind(attempt.amount)
        .bind(&attempt.detail)
        .bind(encode_timestamp(&attempt.attempted_at))
        .fetch_one(&self.pool)
        .await
        .context("Failed to record enforcement attempt")?;

        attempt.id = column(&row, "id")?;
        Ok(())
    }

    /// Number of attempts with the given outcome for an installment.
    pub async fn count_attempts(
        &self,
        installment_id: InstallmentId,
        outcome: AttemptOutcome,
    ) -> Result<u32> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM enforcement_attempts WHERE installment_id = ? AND outcome = ?",
        )
        .bind(installment_id)
        .bind(outcome.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count enforcement attempts")?;

        let count: i64 = column(&row, "count")?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Most recent enforcement attempts, newest first.
    pub async fn list_recent_attempts(&self, limit: u32) -> Result<Vec<EnforcementAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT id, installment_id, run_id, outcome, amount, detail, attempted_at
            FROM enforcement_attempts
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list enforcement attempts")?;

        rows.iter().map(Self::row_to_attempt).collect()
    }

    fn row_to_attempt(row: &SqliteRow) -> Result<EnforcementAttempt> {
        let run_id: String = column(row, "run_id")?;
        let outcome: String = column(row, "outcome")?;
        let attempted_at: String = column(row, "attempted_at")?;

        Ok(EnforcementAttempt {
            id: column(row, "id")?,
            installment_id: column(row, "installment_id")?,
            run_id: Uuid::parse_str(&run_id).context("Invalid run ID")?,
            outcome: AttemptOutcome::from_str(&outcome)
                .ok_or_else(|| anyhow::anyhow!("Invalid attempt outcome: {}", outcome))?,
            amount: column(row, "amount")?,
            detail: column(row, "detail")?,
            attempted_at: decode_timestamp(&attempted_at, "attempted_at")?,
        })
    }

    // ========================
    // Job leases
    // ========================

    /// Take the named lease for `holder` unless another holder has an unexpired one.
    pub async fn try_acquire_lease(
        &self,
        name: &str,
        holder: Uuid,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<bool> {
        let now_str = encode_timestamp(&now);
        let result = sqlx::query(
            r#"
            INSERT INTO job_leases (name, holder, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE job_leases.expires_at <= ?
            "#,
        )
        .bind(name)
        .bind(holder.to_string())
        .bind(&now_str)
        .bind(encode_timestamp(&(now + ttl)))
        .bind(&now_str)
        .execute(&self.pool)
        .await
        .context("Failed to acquire job lease")?;

        Ok(result.rows_affected() == 1)
    }

    /// Release the named lease if `holder` still owns it.
    pub async fn release_lease(&self, name: &str, holder: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM job_leases WHERE name = ? AND holder = ?")
            .bind(name)
            .bind(holder.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to release job lease")?;
        Ok(())
    }
}

/// One SQL transaction. Every mutation made through it becomes visible on
/// `commit`, or not at all.
pub struct UnitOfWork {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    /// Add `delta` to an account balance in place. The balance may go negative.
    pub async fn adjust_balance(
        &mut self,
        account_id: AccountId,
        delta: Cents,
    ) -> Result<BalanceChange> {
        self.apply_delta(account_id, delta, Cents::MIN).await
    }

    /// Take `amount` from an account only if its current balance covers it.
    /// Check and debit are a single statement, so no concurrent writer can
    /// slip in between.
    pub async fn withdraw_covered(
        &mut self,
        account_id: AccountId,
        amount: Cents,
    ) -> Result<BalanceChange> {
        self.apply_delta(account_id, -amount, amount).await
    }

    async fn apply_delta(
        &mut self,
        account_id: AccountId,
        delta: Cents,
        floor: Cents,
    ) -> Result<BalanceChange> {
        // Bounds on the current balance that keep `balance + delta` in range
        let (mut lower, upper) = if delta >= 0 {
            (Cents::MIN, Cents::MAX - delta)
        } else {
            (Cents::MIN - delta, Cents::MAX)
        };
        lower = lower.max(floor);

        let row = sqlx::query(
            r#"
            UPDATE accounts SET balance = balance + ?
            WHERE id = ? AND balance >= ? AND balance <= ?
            RETURNING balance
            "#,
        )
        .bind(delta)
        .bind(account_id)
        .bind(lower)
        .bind(upper)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to adjust balance")?;

        if let Some(row) = row {
            return Ok(BalanceChange::Applied(column(&row, "balance")?));
        }

        let current = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to fetch balance")?;

        Ok(match current {
            None => BalanceChange::AccountMissing,
            Some(row) => {
                let balance: Cents = column(&row, "balance")?;
                if balance < floor {
                    BalanceChange::Insufficient(balance)
                } else {
                    BalanceChange::Overflow
                }
            }
        })
    }

    /// Append a transaction record and assign its id.
    pub async fn insert_transaction(&mut self, transaction: &mut Transaction) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (from_account_id, to_account_id, amount, currency, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(transaction.from_account)
        .bind(transaction.to_account)
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(encode_timestamp(&transaction.created_at))
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to save transaction")?;

        transaction.id = column(&row, "id")?;
        Ok(())
    }

    /// Flip an installment to paid. Returns false if it was already paid (or
    /// does not exist), which makes claiming idempotent.
    pub async fn mark_installment_paid(&mut self, id: InstallmentId) -> Result<bool> {
        let result = sqlx::query("UPDATE payment_schedules SET paid = 1 WHERE id = ? AND paid = 0")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to mark installment as paid")?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }
}
