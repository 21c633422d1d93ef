// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fenus::application::{
    AnalyticsReader, CreditEngine, Ledger, NotificationSender, NotifyError, OverdueProcessor,
    RateError, RateProvider,
};
use fenus::config::{CreditConfig, DatabaseConfig, OverdueConfig};
use fenus::domain::{Account, Cents, OwnerId};
use fenus::storage::Repository;
use rust_decimal::Decimal;
use tempfile::TempDir;

/// Services wired against a temporary database
pub struct TestEnv {
    pub repo: Repository,
    pub ledger: Ledger,
    pub credits: CreditEngine,
    pub overdue: Arc<OverdueProcessor>,
    pub analytics: AnalyticsReader,
    pub notifier: Arc<RecordingNotifier>,
    _temp_dir: TempDir,
}

impl TestEnv {
    /// Open an account for `owner` and fund it with `amount` (skipped when 0)
    pub async fn funded_account(&self, owner: OwnerId, amount: Cents) -> Result<Account> {
        let account = self.ledger.open_account(owner).await?;
        if amount > 0 {
            self.ledger.deposit(account.id, amount).await?;
        }
        Ok(self.ledger.find_account(account.id).await?)
    }

    pub async fn balance(&self, account: &Account) -> Result<Cents> {
        Ok(self.ledger.find_account(account.id).await?.balance)
    }
}

/// Helper to create a test environment with a failing rate source and
/// default enforcement settings
pub async fn test_env() -> Result<TestEnv> {
    test_env_with(Arc::new(FailingRateProvider), OverdueConfig::default()).await
}

pub async fn test_env_with(
    rates: Arc<dyn RateProvider>,
    overdue: OverdueConfig,
) -> Result<TestEnv> {
    test_env_full(rates, Arc::new(RecordingNotifier::default()), overdue).await
}

pub async fn test_env_full(
    rates: Arc<dyn RateProvider>,
    notifier: Arc<RecordingNotifier>,
    overdue: OverdueConfig,
) -> Result<TestEnv> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let settings = DatabaseConfig {
        url: format!("sqlite:{}", db_path.display()),
        ..DatabaseConfig::default()
    };
    let repo = Repository::init(&settings).await?;

    let ledger = Ledger::new(repo.clone());
    let credits = CreditEngine::new(
        repo.clone(),
        Arc::new(ledger.clone()),
        rates,
        CreditConfig::default(),
    );
    let overdue = Arc::new(OverdueProcessor::new(
        repo.clone(),
        notifier.clone(),
        &overdue,
    ));
    let analytics = AnalyticsReader::new(repo.clone(), Arc::new(ledger.clone()));

    Ok(TestEnv {
        repo,
        ledger,
        credits,
        overdue,
        analytics,
        notifier,
        _temp_dir: temp_dir,
    })
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Rate source that is always down
pub struct FailingRateProvider;

#[async_trait]
impl RateProvider for FailingRateProvider {
    async fn current_rate(&self) -> Result<Decimal, RateError> {
        Err(RateError::Unavailable("connection refused".to_string()))
    }
}

/// Rate source that always answers the same rate
pub struct FixedRateProvider(pub Decimal);

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn current_rate(&self) -> Result<Decimal, RateError> {
        Ok(self.0)
    }
}

/// Notifier that keeps every message; optionally reports delivery failure
/// after recording.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(OwnerId, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<(OwnerId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn notify(&self, owner_id: OwnerId, message: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((owner_id, message.to_string()));
        if self.fail {
            return Err(NotifyError::Delivery("smtp timeout".to_string()));
        }
        Ok(())
    }
}
