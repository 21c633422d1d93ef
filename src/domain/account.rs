use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, SUPPORTED_CURRENCY};

pub type AccountId = i64;
pub type OwnerId = i64;

/// Reserved destination for money leaving the tracked ledger (e.g. collected
/// debt). It has no row in `accounts` and no balance, but transfers to it still
/// produce a transaction record.
pub const HOUSE_ACCOUNT_ID: AccountId = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: OwnerId,
    /// Balance in minor units. Only the ledger mutates it, and no overdraft
    /// check is applied, so it may go negative.
    pub balance: Cents,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// A fresh, empty account. The id is assigned by the repository on insert.
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            id: 0,
            owner_id,
            balance: 0,
            currency: SUPPORTED_CURRENCY.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, owner_id: OwnerId) -> bool {
        self.owner_id == owner_id
    }
}
