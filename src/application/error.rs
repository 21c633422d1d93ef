use thiserror::Error;

use crate::domain::{AccountId, CreditId, InstallmentId, ScheduleError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("Invalid credit parameters: {0}")]
    InvalidCreditParameters(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Credit not found: {0}")]
    CreditNotFound(CreditId),

    #[error("Installment not found: {0}")]
    InstallmentNotFound(InstallmentId),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Coarse classification callers map to their own responses
/// (bad request / not found / internal failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidAmount(_)
            | AppError::InvalidTransfer(_)
            | AppError::InvalidCreditParameters(_)
            | AppError::InvalidPeriod(_) => ErrorKind::Validation,
            AppError::AccountNotFound(_)
            | AppError::CreditNotFound(_)
            | AppError::InstallmentNotFound(_) => ErrorKind::NotFound,
            AppError::Database(_) => ErrorKind::Internal,
        }
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        AppError::InvalidCreditParameters(err.to_string())
    }
}
