use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Cents, HOUSE_ACCOUNT_ID, SUPPORTED_CURRENCY};

pub type TransactionId = i64;

/// Append-only audit record of a single balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Source account; `None` when money enters from outside the ledger (deposits)
    pub from_account: Option<AccountId>,
    /// Destination account; `HOUSE_ACCOUNT_ID` when money leaves the ledger
    pub to_account: AccountId,
    /// Amount in minor units (always positive)
    pub amount: Cents,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Record for a movement between two accounts (or to the house account).
    pub fn transfer(from: AccountId, to: AccountId, amount: Cents) -> Self {
        Self::build(Some(from), to, amount)
    }

    /// Record for money entering an account from outside the ledger.
    pub fn deposit(to: AccountId, amount: Cents) -> Self {
        Self::build(None, to, amount)
    }

    fn build(from_account: Option<AccountId>, to_account: AccountId, amount: Cents) -> Self {
        debug_assert!(amount > 0, "transaction amount must be positive");
        Self {
            id: 0,
            from_account,
            to_account,
            amount,
            currency: SUPPORTED_CURRENCY.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_deposit(&self) -> bool {
        self.from_account.is_none()
    }

    pub fn is_to_house(&self) -> bool {
        self.to_account == HOUSE_ACCOUNT_ID
    }

    /// Signed effect of this transaction on the given account's balance.
    pub fn effect_on(&self, account_id: AccountId) -> Cents {
        let mut effect = 0;
        if self.to_account == account_id {
            effect += self.amount;
        }
        if self.from_account == Some(account_id) {
            effect -= self.amount;
        }
        effect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_has_no_source() {
        let tx = Transaction::deposit(3, 5000);
        assert!(tx.is_deposit());
        assert!(!tx.is_to_house());
        assert_eq!(tx.currency, "RUB");
    }

    #[test]
    fn test_transfer_to_house() {
        let tx = Transaction::transfer(3, HOUSE_ACCOUNT_ID, 11000);
        assert!(tx.is_to_house());
        assert_eq!(tx.from_account, Some(3));
    }

    #[test]
    fn test_effect_on_accounts() {
        let tx = Transaction::transfer(1, 2, 700);
        assert_eq!(tx.effect_on(1), -700);
        assert_eq!(tx.effect_on(2), 700);
        assert_eq!(tx.effect_on(3), 0);
    }
}
