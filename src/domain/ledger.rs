use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Account, AccountId, Cents, HOUSE_ACCOUNT_ID, Transaction};

/// Balance of one account implied by the transaction log.
/// Balance = sum of incoming amounts - sum of outgoing amounts
pub fn derived_balance(account_id: AccountId, transactions: &[Transaction]) -> Cents {
    transactions
        .iter()
        .map(|tx| tx.effect_on(account_id))
        .sum()
}

/// Implied balances of every tracked account touched by the log.
/// The house account is not tracked and never appears in the map.
pub fn derived_balances(transactions: &[Transaction]) -> HashMap<AccountId, Cents> {
    let mut balances: HashMap<AccountId, Cents> = HashMap::new();

    for tx in transactions {
        if let Some(from) = tx.from_account {
            *balances.entry(from).or_insert(0) -= tx.amount;
        }
        if tx.to_account != HOUSE_ACCOUNT_ID {
            *balances.entry(tx.to_account).or_insert(0) += tx.amount;
        }
    }

    balances
}

/// An account whose stored balance disagrees with its transaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    pub stored: Cents,
    pub derived: Cents,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: usize,
    /// Total collected into the house account
    pub house_inflow: Cents,
    pub mismatches: Vec<BalanceMismatch>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compare stored balances against the transaction log.
pub fn reconcile(accounts: &[Account], transactions: &[Transaction]) -> IntegrityReport {
    let derived = derived_balances(transactions);

    let mismatches = accounts
        .iter()
        .filter_map(|account| {
            let implied = derived.get(&account.id).copied().unwrap_or(0);
            (implied != account.balance).then(|| BalanceMismatch {
                account_id: account.id,
                stored: account.balance,
                derived: implied,
            })
        })
        .collect();

    let house_inflow = transactions
        .iter()
        .filter(|tx| tx.is_to_house())
        .map(|tx| tx.amount)
        .sum();

    IntegrityReport {
        account_count: accounts.len(),
        transaction_count: transactions.len(),
        house_inflow,
        mismatches,
    }
}
