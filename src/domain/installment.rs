use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, CreditId};

pub type InstallmentId = i64;

/// One scheduled payment of a credit. `paid` only ever flips from false to true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub credit_id: CreditId,
    pub due_date: DateTime<Utc>,
    pub amount: Cents,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

impl Installment {
    pub fn new(credit_id: CreditId, due_date: DateTime<Utc>, amount: Cents) -> Self {
        Self {
            id: 0,
            credit_id,
            due_date,
            amount,
            paid: false,
            created_at: Utc::now(),
        }
    }

    /// Due strictly before `now` and still unpaid.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.paid && self.due_date < now
    }
}
