use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, InstallmentId};

pub type RunId = Uuid;

/// What happened when the overdue processor looked at one installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Penalty-inclusive amount collected and installment settled
    Paid,
    /// Balance below the penalty-inclusive amount; owner notified
    InsufficientFunds,
    /// Lookup or transfer error
    Failed,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Paid => "paid",
            AttemptOutcome::InsufficientFunds => "insufficient_funds",
            AttemptOutcome::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(AttemptOutcome::Paid),
            "insufficient_funds" => Some(AttemptOutcome::InsufficientFunds),
            "failed" => Some(AttemptOutcome::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit row for one enforcement decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementAttempt {
    pub id: i64,
    pub installment_id: InstallmentId,
    pub run_id: RunId,
    pub outcome: AttemptOutcome,
    /// Penalty-inclusive amount that was (or would have been) collected
    pub amount: Cents,
    pub detail: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl EnforcementAttempt {
    pub fn new(
        installment_id: InstallmentId,
        run_id: RunId,
        outcome: AttemptOutcome,
        amount: Cents,
    ) -> Self {
        Self {
            id: 0,
            installment_id,
            run_id,
            outcome,
            amount,
            detail: None,
            attempted_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// When a credit with an unpayable installment is marked defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DefaultPolicy {
    /// Credits stay active however many shortfalls accumulate
    #[default]
    Never,
    /// Mark the credit defaulted once one of its installments has hit this many
    /// insufficient-funds attempts
    AfterFailedAttempts(u32),
}

impl DefaultPolicy {
    pub fn from_threshold(threshold: Option<u32>) -> Self {
        match threshold {
            Some(n) if n > 0 => DefaultPolicy::AfterFailedAttempts(n),
            _ => DefaultPolicy::Never,
        }
    }

    pub fn should_default(&self, shortfalls: u32) -> bool {
        match self {
            DefaultPolicy::Never => false,
            DefaultPolicy::AfterFailedAttempts(n) => shortfalls >= *n,
        }
    }
}
