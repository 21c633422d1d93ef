//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then `config/default.toml`, then
//! `config/{RUN_MODE}.toml`, then `FENUS__SECTION__KEY` environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Storage settings.
    pub database: DatabaseConfig,
    /// Credit origination settings.
    pub credit: CreditConfig,
    /// Overdue enforcement settings.
    pub overdue: OverdueConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite:fenus.db`.
    pub url: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// How long a writer waits for a locked database before failing.
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:fenus.db".to_string(),
            max_connections: 5,
            busy_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

/// Credit origination configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CreditConfig {
    /// Annual rate (percent) used when no rate is given and the rate source fails.
    pub default_rate_percent: Decimal,
    /// Current key rate served by the configured rate provider. Unset means
    /// the provider reports itself unavailable.
    pub key_rate_percent: Option<Decimal>,
    /// Longest accepted term.
    pub max_term_months: u32,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            default_rate_percent: Decimal::TEN,
            key_rate_percent: None,
            max_term_months: 600,
        }
    }
}

/// Overdue enforcement configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverdueConfig {
    /// Seconds between enforcement runs.
    pub interval_secs: u64,
    /// Run once immediately when the scheduler starts instead of waiting a full interval.
    pub run_on_start: bool,
    /// Surcharge applied to an overdue installment before collection.
    pub penalty_percent: u32,
    /// Lifetime of the cross-process run lease; a crashed run frees it after this.
    pub lease_ttl_secs: u64,
    /// Mark a credit defaulted after this many shortfalls on one installment.
    /// Unset keeps credits active indefinitely.
    pub default_after_failed_attempts: Option<u32>,
}

impl Default for OverdueConfig {
    fn default() -> Self {
        Self {
            interval_secs: 12 * 60 * 60,
            run_on_start: false,
            penalty_percent: 10,
            lease_ttl_secs: 60 * 60,
            default_after_failed_attempts: None,
        }
    }
}

/// Upper bound for `interval_secs` and `lease_ttl_secs`: one year.
pub const MAX_PERIOD_SECS: u64 = 365 * 24 * 60 * 60;

impl OverdueConfig {
    /// Run interval, capped at `MAX_PERIOD_SECS`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.min(MAX_PERIOD_SECS))
    }

    /// Lease lifetime, capped at `MAX_PERIOD_SECS`.
    pub fn lease_ttl(&self) -> chrono::Duration {
        // The cap fits in i64
        chrono::Duration::seconds(self.lease_ttl_secs.min(MAX_PERIOD_SECS) as i64)
    }
}

impl AppConfig {
    /// Loads configuration from config files and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or a value has the wrong type.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("FENUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
