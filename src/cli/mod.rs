use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use crate::application::{
    AccountDirectory, AnalyticsReader, ConfiguredRateProvider, CreditEngine, Ledger, LogNotifier,
    OverdueProcessor, OverdueScheduler, PaymentOutcome, RateSource, RunOutcome,
};
use crate::config::AppConfig;
use crate::domain::{
    AccountId, CreditId, HOUSE_ACCOUNT_ID, InstallmentId, OwnerId, format_amount, format_cents,
    parse_cents,
};
use crate::storage::Repository;

/// Fenus - ledger and credit settlement engine
#[derive(Parser)]
#[command(name = "fenus")]
#[command(about = "Accounts, transfers and annuity credits with scheduled overdue enforcement")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides the configured URL)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Add money to an account from outside the ledger
    Deposit {
        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,

        /// Destination account ID
        #[arg(long)]
        to: AccountId,
    },

    /// Move money between accounts (use `--to 0` for the house account)
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account ID
        #[arg(long)]
        from: AccountId,

        /// Destination account ID
        #[arg(long)]
        to: AccountId,

        /// Owner of the source account
        #[arg(long)]
        owner: OwnerId,
    },

    /// Show the transaction history of an account
    Transactions {
        /// Account ID
        account: AccountId,

        #[arg(long)]
        owner: OwnerId,
    },

    /// Credit management commands
    #[command(subcommand)]
    Credit(CreditCommands),

    /// Overdue enforcement commands
    #[command(subcommand)]
    Overdue(OverdueCommands),

    /// Run the overdue scheduler until interrupted
    Serve,

    /// Analytics commands
    #[command(subcommand)]
    Analytics(AnalyticsCommands),

    /// Export data to CSV or JSON
    Export {
        /// Export type: schedule, transactions, owner
        #[arg(value_name = "TYPE")]
        export_type: String,

        #[arg(long)]
        owner: OwnerId,

        /// Credit ID for `schedule`, account ID for `transactions`
        #[arg(long)]
        id: Option<i64>,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Verify stored balances against the transaction log
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account with a zero balance
    Open {
        #[arg(long)]
        owner: OwnerId,
    },

    /// List an owner's accounts
    List {
        #[arg(long)]
        owner: OwnerId,
    },

    /// Show account details
    Show {
        /// Account ID
        id: AccountId,

        #[arg(long)]
        owner: OwnerId,
    },
}

#[derive(Subcommand)]
pub enum CreditCommands {
    /// Issue a credit and generate its repayment schedule
    Create {
        /// Principal (e.g., "120000.00")
        amount: String,

        #[arg(long)]
        owner: OwnerId,

        /// Account the credit is issued against
        #[arg(long)]
        account: AccountId,

        /// Annual rate in percent (omit to use the current key rate)
        #[arg(long)]
        rate: Option<String>,

        /// Term in months
        #[arg(long)]
        months: u32,
    },

    /// List credits of an owner, optionally for one account
    List {
        #[arg(long)]
        owner: OwnerId,

        #[arg(long)]
        account: Option<AccountId>,
    },

    /// Show the repayment schedule of a credit
    Schedule {
        /// Credit ID
        id: CreditId,

        #[arg(long)]
        owner: OwnerId,
    },

    /// Pay one installment from the credit's account
    Pay {
        /// Installment ID
        installment: InstallmentId,

        #[arg(long)]
        owner: OwnerId,
    },

    /// Mark an installment paid without moving money
    MarkPaid {
        /// Installment ID
        installment: InstallmentId,
    },
}

#[derive(Subcommand)]
pub enum OverdueCommands {
    /// Run one enforcement pass now
    Run,

    /// Show recent enforcement attempts
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum AnalyticsCommands {
    /// Project an account balance after scheduled credit payments
    Forecast {
        /// Account ID
        account: AccountId,

        #[arg(long)]
        owner: OwnerId,

        /// Number of days ahead
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Total principal of an owner's active credits
    Load {
        #[arg(long)]
        owner: OwnerId,

        #[arg(long)]
        json: bool,
    },

    /// Income and expenses of an owner for one month (defaults to the current month)
    Monthly {
        #[arg(long)]
        owner: OwnerId,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        month: Option<u32>,

        #[arg(long)]
        json: bool,
    },
}

/// Services wired against one repository
struct Services {
    ledger: Ledger,
    credits: CreditEngine,
    overdue: Arc<OverdueProcessor>,
    analytics: AnalyticsReader,
}

impl Services {
    fn build(repo: Repository, config: &AppConfig) -> Self {
        let ledger = Ledger::new(repo.clone());
        let credits = CreditEngine::new(
            repo.clone(),
            Arc::new(ledger.clone()),
            Arc::new(ConfiguredRateProvider::new(config.credit.key_rate_percent)),
            config.credit.clone(),
        );
        let overdue = Arc::new(OverdueProcessor::new(
            repo.clone(),
            Arc::new(LogNotifier),
            &config.overdue,
        ));
        let analytics = AnalyticsReader::new(repo, Arc::new(ledger.clone()));

        Self {
            ledger,
            credits,
            overdue,
            analytics,
        }
    }
}

impl Cli {
    pub async fn run(self, mut config: AppConfig) -> Result<()> {
        if let Some(path) = &self.database {
            config.database.url = if path.starts_with("sqlite:") {
                path.clone()
            } else {
                format!("sqlite:{}", path)
            };
        }

        if matches!(self.command, Commands::Init) {
            Repository::init(&config.database).await?;
            println!("Database initialized: {}", config.database.url);
            return Ok(());
        }

        let repo = Repository::connect(&config.database).await?;
        let services = Services::build(repo, &config);

        match self.command {
            Commands::Init => {}

            Commands::Account(cmd) => run_account_command(&services, cmd).await?,

            Commands::Deposit { amount, to } => {
                let amount =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
                let tx = services.ledger.deposit(to, amount).await?;
                println!(
                    "Deposited {} to account {} ({})",
                    format_amount(tx.amount),
                    to,
                    tx.id
                );
            }

            Commands::Transfer {
                amount,
                from,
                to,
                owner,
            } => {
                let amount =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
                // Only the owner of the source account may move money out of it
                services.ledger.get_account(from, owner).await?;
                let tx = services.ledger.transfer(from, to, amount).await?;
                let target = if to == HOUSE_ACCOUNT_ID {
                    "house".to_string()
                } else {
                    to.to_string()
                };
                println!(
                    "Transferred {} {} -> {} ({})",
                    format_amount(tx.amount),
                    from,
                    target,
                    tx.id
                );
            }

            Commands::Transactions { account, owner } => {
                let transactions = services.ledger.list_transactions(account, owner).await?;
                if transactions.is_empty() {
                    println!("No transactions found.");
                } else {
                    println!(
                        "{:<8} {:<20} {:>8} {:>8} {:>14}",
                        "ID", "DATE", "FROM", "TO", "AMOUNT"
                    );
                    println!("{}", "-".repeat(62));
                    for tx in transactions {
                        println!(
                            "{:<8} {:<20} {:>8} {:>8} {:>14}",
                            tx.id,
                            tx.created_at.format("%Y-%m-%d %H:%M:%S"),
                            tx.from_account
                                .map(|id| id.to_string())
                                .unwrap_or_else(|| "-".to_string()),
                            tx.to_account,
                            format_cents(tx.effect_on(account))
                        );
                    }
                }
            }

            Commands::Credit(cmd) => run_credit_command(&services, cmd).await?,

            Commands::Overdue(cmd) => run_overdue_command(&services, cmd).await?,

            Commands::Serve => {
                let scheduler = OverdueScheduler::new(
                    Arc::clone(&services.overdue),
                    config.overdue.interval(),
                    config.overdue.run_on_start,
                );
                let handle = scheduler.spawn();
                info!("scheduler running, press Ctrl-C to stop");

                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for shutdown signal")?;
                info!("shutdown requested");
                handle.stop().await;
            }

            Commands::Analytics(cmd) => run_analytics_command(&services, cmd).await?,

            Commands::Export {
                export_type,
                owner,
                id,
                output,
            } => {
                run_export_command(&services, &export_type, owner, id, output.as_deref()).await?
            }

            Commands::Check => run_check_command(&services).await?,
        }

        Ok(())
    }
}

async fn run_account_command(services: &Services, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Open { owner } => {
            let account = services.ledger.open_account(owner).await?;
            println!("Opened account {} for owner {}", account.id, owner);
        }

        AccountCommands::List { owner } => {
            let accounts = services.ledger.list_accounts(owner).await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<8} {:<8} {:>14}", "ID", "CURRENCY", "BALANCE");
                println!("{}", "-".repeat(32));
                for account in accounts {
                    println!(
                        "{:<8} {:<8} {:>14}",
                        account.id,
                        account.currency,
                        format_cents(account.balance)
                    );
                }
            }
        }

        AccountCommands::Show { id, owner } => {
            let account = services.ledger.get_account(id, owner).await?;
            println!("Account: {}", account.id);
            println!("  Owner:    {}", account.owner_id);
            println!("  Balance:  {}", format_amount(account.balance));
            println!(
                "  Created:  {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(())
}

async fn run_credit_command(services: &Services, cmd: CreditCommands) -> Result<()> {
    match cmd {
        CreditCommands::Create {
            amount,
            owner,
            account,
            rate,
            months,
        } => {
            let principal =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let rate = rate
                .map(|r| r.parse::<Decimal>())
                .transpose()
                .context("Invalid rate, expected a decimal percentage such as '12.5'")?;

            let created = services
                .credits
                .create_credit(owner, account, principal, rate, months)
                .await?;

            let source = match created.rate_source {
                RateSource::Requested => "requested",
                RateSource::Provider => "key rate",
                RateSource::Fallback => "default",
            };
            println!(
                "Issued credit {}: {} at {}% ({}) for {} months",
                created.credit.id,
                format_amount(created.credit.principal),
                created.credit.annual_rate_percent,
                source,
                created.credit.term_months
            );
            println!("Monthly payment: {}", format_amount(created.monthly_payment));
        }

        CreditCommands::List { owner, account } => {
            let credits = match account {
                Some(account) => services.credits.list_credits(owner, account).await?,
                None => services.credits.list_credits_for_owner(owner).await?,
            };
            if credits.is_empty() {
                println!("No credits found.");
            } else {
                println!(
                    "{:<8} {:<8} {:>14} {:>8} {:>7} {:<10}",
                    "ID", "ACCOUNT", "PRINCIPAL", "RATE", "MONTHS", "STATUS"
                );
                println!("{}", "-".repeat(60));
                for credit in credits {
                    println!(
                        "{:<8} {:<8} {:>14} {:>7}% {:>7} {:<10}",
                        credit.id,
                        credit.account_id,
                        format_cents(credit.principal),
                        credit.annual_rate_percent,
                        credit.term_months,
                        credit.status
                    );
                }
            }
        }

        CreditCommands::Schedule { id, owner } => {
            let schedule = services.credits.get_schedule(owner, id).await?;
            println!(
                "{:<4} {:<8} {:<12} {:>14} {:<5}",
                "#", "ID", "DUE", "AMOUNT", "PAID"
            );
            println!("{}", "-".repeat(47));
            for (index, installment) in schedule.iter().enumerate() {
                println!(
                    "{:<4} {:<8} {:<12} {:>14} {:<5}",
                    index + 1,
                    installment.id,
                    installment.due_date.format("%Y-%m-%d"),
                    format_cents(installment.amount),
                    if installment.paid { "yes" } else { "no" }
                );
            }
        }

        CreditCommands::Pay { installment, owner } => {
            match services.credits.pay_installment(owner, installment).await? {
                PaymentOutcome::Paid(tx) => println!(
                    "Paid installment {}: {} ({})",
                    installment,
                    format_amount(tx.amount),
                    tx.id
                ),
                PaymentOutcome::AlreadyPaid => {
                    println!("Installment {} was already paid.", installment)
                }
            }
        }

        CreditCommands::MarkPaid { installment } => {
            if services.credits.mark_installment_paid(installment).await? {
                println!("Marked installment {} as paid.", installment);
            } else {
                println!("Installment {} was already paid.", installment);
            }
        }
    }
    Ok(())
}

async fn run_overdue_command(services: &Services, cmd: OverdueCommands) -> Result<()> {
    match cmd {
        OverdueCommands::Run => match services.overdue.run_once(Utc::now()).await? {
            RunOutcome::Completed(report) => {
                println!("Run {}", report.run_id);
                println!("  Scanned:            {}", report.scanned);
                println!("  Paid:               {}", report.paid);
                println!("  Insufficient funds: {}", report.insufficient_funds);
                println!("  Failed:             {}", report.failed);
                println!("  Already settled:    {}", report.already_settled);
                println!("  Defaulted:          {}", report.defaulted);
                println!("  Collected:          {}", format_amount(report.collected));
            }
            RunOutcome::Skipped => println!("Another enforcement run is in progress; skipped."),
        },

        OverdueCommands::History { limit } => {
            let attempts = services.overdue.recent_attempts(limit).await?;
            if attempts.is_empty() {
                println!("No enforcement attempts recorded.");
            } else {
                println!(
                    "{:<20} {:<12} {:<20} {:>14}",
                    "DATE", "INSTALLMENT", "OUTCOME", "AMOUNT"
                );
                println!("{}", "-".repeat(69));
                for attempt in attempts {
                    println!(
                        "{:<20} {:<12} {:<20} {:>14}",
                        attempt.attempted_at.format("%Y-%m-%d %H:%M:%S"),
                        attempt.installment_id,
                        attempt.outcome,
                        format_cents(attempt.amount)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_analytics_command(services: &Services, cmd: AnalyticsCommands) -> Result<()> {
    match cmd {
        AnalyticsCommands::Forecast {
            account,
            owner,
            days,
            json,
        } => {
            let forecast = services
                .analytics
                .forecast_balance(account, owner, days, Utc::now())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&forecast)?);
                return Ok(());
            }

            println!(
                "Forecast for account {}: {} to {}",
                forecast.account_id,
                forecast.as_of.format("%Y-%m-%d"),
                forecast.horizon_end.format("%Y-%m-%d")
            );
            println!("  Current balance:    {}", format_amount(forecast.current_balance));
            for event in &forecast.events {
                println!(
                    "  {}  credit {:<6} -{:>12}  => {:>12}",
                    event.due_date.format("%Y-%m-%d"),
                    event.credit_id,
                    format_cents(event.amount),
                    format_cents(event.balance_after)
                );
            }
            println!("  Projected balance:  {}", format_amount(forecast.projected_balance));
        }

        AnalyticsCommands::Load { owner, json } => {
            let load = services.analytics.credit_load(owner).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&load)?);
                return Ok(());
            }
            println!("Credit load for owner {}", load.owner_id);
            println!("  Active credits:   {}", load.active_credits);
            println!("  Active principal: {}", format_amount(load.active_principal));
            println!("  Outstanding:      {}", format_amount(load.outstanding));
        }

        AnalyticsCommands::Monthly {
            owner,
            year,
            month,
            json,
        } => {
            let today = Utc::now();
            let summary = services
                .analytics
                .monthly_summary(
                    owner,
                    year.unwrap_or_else(|| today.year()),
                    month.unwrap_or_else(|| today.month()),
                )
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            println!(
                "Owner {} for {}",
                summary.owner_id,
                summary.period_start.format("%Y-%m")
            );
            println!("  Income:   {:>14}", format_cents(summary.income));
            println!("  Expenses: {:>14}", format_cents(summary.expenses));
            println!("  Net:      {:>14}", format_cents(summary.net));
        }
    }
    Ok(())
}

enum ExportKind {
    Schedule(CreditId),
    Transactions(AccountId),
    Owner,
}

impl ExportKind {
    fn parse(export_type: &str, id: Option<i64>) -> Result<Self> {
        match export_type {
            "schedule" => Ok(Self::Schedule(
                id.context("--id <CREDIT_ID> is required for schedule export")?,
            )),
            "transactions" => Ok(Self::Transactions(
                id.context("--id <ACCOUNT_ID> is required for transactions export")?,
            )),
            "owner" => Ok(Self::Owner),
            _ => anyhow::bail!(
                "Invalid export type '{}'. Valid types: schedule, transactions, owner",
                export_type
            ),
        }
    }
}

async fn run_export_command(
    services: &Services,
    export_type: &str,
    owner: OwnerId,
    id: Option<i64>,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let kind = ExportKind::parse(export_type, id)?;

    let exporter = Exporter::new(&services.ledger, &services.credits);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match kind {
        ExportKind::Schedule(credit_id) => {
            let count = exporter
                .export_schedule_csv(owner, credit_id, writer)
                .await?;
            if output.is_some() {
                eprintln!("Exported {} installments", count);
            }
        }
        ExportKind::Transactions(account_id) => {
            let count = exporter
                .export_transactions_csv(owner, account_id, writer)
                .await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        ExportKind::Owner => {
            let snapshot = exporter.export_owner_json(owner, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported owner {}: {} accounts, {} credits",
                    snapshot.owner_id,
                    snapshot.accounts.len(),
                    snapshot.credits.len()
                );
            }
        }
    }

    Ok(())
}

async fn run_check_command(services: &Services) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = services.ledger.check_integrity().await?;

    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!("House inflow: {}", format_amount(report.house_inflow));
    println!();

    if report.is_consistent() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for mismatch in &report.mismatches {
            println!(
                "  - account {}: stored {} but transactions imply {}",
                mismatch.account_id,
                format_cents(mismatch.stored),
                format_cents(mismatch.derived)
            );
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}
