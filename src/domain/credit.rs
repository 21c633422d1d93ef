use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, Cents, OwnerId};

pub type CreditId = i64;

/// Lifecycle status of a credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditStatus {
    Active,
    Closed,
    Defaulted,
}

impl CreditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditStatus::Active => "active",
            CreditStatus::Closed => "closed",
            CreditStatus::Defaulted => "defaulted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(CreditStatus::Active),
            "closed" => Some(CreditStatus::Closed),
            "defaulted" => Some(CreditStatus::Defaulted),
            _ => None,
        }
    }
}

impl std::fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An installment credit issued against an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub id: CreditId,
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub principal: Cents,
    /// Nominal annual rate in percent, e.g. `12` for 12% p.a.
    pub annual_rate_percent: Decimal,
    pub term_months: u32,
    pub status: CreditStatus,
    pub created_at: DateTime<Utc>,
}

impl Credit {
    /// A new active credit. The id is assigned by the repository on insert.
    pub fn new(
        owner_id: OwnerId,
        account_id: AccountId,
        principal: Cents,
        annual_rate_percent: Decimal,
        term_months: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            owner_id,
            account_id,
            principal,
            annual_rate_percent,
            term_months,
            status: CreditStatus::Active,
            created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CreditStatus::Active
    }
}
