//! Collaborators the engine depends on only through these traits.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use crate::domain::{Account, AccountId, OwnerId};

use super::AppError;

#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Resolves accounts on behalf of an owner.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Fails with `AppError::AccountNotFound` if the account is absent or
    /// belongs to someone else.
    async fn get_account(&self, account_id: AccountId, owner_id: OwnerId)
    -> Result<Account, AppError>;
}

/// Source of the current annual interest rate, in percent.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn current_rate(&self) -> Result<Decimal, RateError>;
}

/// Outbound owner notifications. Callers treat delivery as fire-and-forget.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn notify(&self, owner_id: OwnerId, message: &str) -> Result<(), NotifyError>;
}

/// Serves a rate taken from configuration; unavailable when none is set.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredRateProvider {
    key_rate_percent: Option<Decimal>,
}

impl ConfiguredRateProvider {
    pub fn new(key_rate_percent: Option<Decimal>) -> Self {
        Self { key_rate_percent }
    }
}

#[async_trait]
impl RateProvider for ConfiguredRateProvider {
    async fn current_rate(&self) -> Result<Decimal, RateError> {
        self.key_rate_percent
            .ok_or_else(|| RateError::Unavailable("no key rate configured".to_string()))
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn notify(&self, owner_id: OwnerId, message: &str) -> Result<(), NotifyError> {
        info!(owner_id, body = message, "owner notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[tokio::test]
    async fn test_configured_rate_provider() {
        let provider = ConfiguredRateProvider::new(Some(dec!(16)));
        assert_eq!(provider.current_rate().await.unwrap(), dec!(16));

        let empty = ConfiguredRateProvider::default();
        assert!(matches!(
            empty.current_rate().await,
            Err(RateError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify(1, "hello").await.is_ok());
    }
}
