//! Annuity schedule arithmetic.
//!
//! Payments are computed in `Decimal` and rounded half-up to whole minor units.
//! The last installment carries the same rounded amount as every other one: no
//! residual correction is applied, so the schedule total may drift from the
//! exact annuity total by up to half a minor unit per installment.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Cents, round_half_up};

const MONTHS_PER_YEAR: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("principal must be positive, got {0}")]
    NonPositivePrincipal(Cents),

    #[error("annual rate must be positive, got {0}%")]
    NonPositiveRate(Decimal),

    #[error("term must be at least one month")]
    ZeroTerm,

    #[error("due date out of range for month {0}")]
    DateOutOfRange(u32),

    #[error("payment computation overflowed")]
    Overflow,
}

/// One row of a computed (not yet persisted) repayment schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    /// 1-based position in the schedule
    pub number: u32,
    pub due_date: DateTime<Utc>,
    pub amount: Cents,
}

/// Monthly rate as a fraction: `annual% / 100 / 12`.
pub fn monthly_rate(annual_rate_percent: Decimal) -> Decimal {
    annual_rate_percent / Decimal::ONE_HUNDRED / Decimal::from(MONTHS_PER_YEAR)
}

/// Fixed monthly payment `A = P·r·(1+r)^n / ((1+r)^n − 1)`, rounded half-up
/// to whole minor units.
pub fn annuity_payment(
    principal: Cents,
    annual_rate_percent: Decimal,
    term_months: u32,
) -> Result<Cents, ScheduleError> {
    if principal <= 0 {
        return Err(ScheduleError::NonPositivePrincipal(principal));
    }
    if annual_rate_percent <= Decimal::ZERO {
        return Err(ScheduleError::NonPositiveRate(annual_rate_percent));
    }
    if term_months == 0 {
        return Err(ScheduleError::ZeroTerm);
    }

    let r = monthly_rate(annual_rate_percent);
    let growth = Decimal::ONE
        .checked_add(r)
        .ok_or(ScheduleError::Overflow)?;

    let mut factor = Decimal::ONE;
    for _ in 0..term_months {
        factor = factor.checked_mul(growth).ok_or(ScheduleError::Overflow)?;
    }

    let denominator = factor - Decimal::ONE;
    if denominator.is_zero() {
        // Rate too small to register at Decimal precision
        return Err(ScheduleError::Overflow);
    }

    let payment = Decimal::from(principal)
        .checked_mul(r)
        .and_then(|v| v.checked_mul(factor))
        .and_then(|v| v.checked_div(denominator))
        .ok_or(ScheduleError::Overflow)?;

    round_half_up(payment).ok_or(ScheduleError::Overflow)
}

/// Due date of the `month`-th installment: the same day-of-month `month`
/// calendar months after `start`, clamped to the month end.
pub fn due_date(start: DateTime<Utc>, month: u32) -> Result<DateTime<Utc>, ScheduleError> {
    start
        .checked_add_months(Months::new(month))
        .ok_or(ScheduleError::DateOutOfRange(month))
}

/// Build the full schedule: `term_months` payments of the annuity amount, due
/// 1, 2, …, n months after `start`.
pub fn build_schedule(
    principal: Cents,
    annual_rate_percent: Decimal,
    term_months: u32,
    start: DateTime<Utc>,
) -> Result<Vec<ScheduledPayment>, ScheduleError> {
    let amount = annuity_payment(principal, annual_rate_percent, term_months)?;

    (1..=term_months)
        .map(|number| {
            Ok(ScheduledPayment {
                number,
                due_date: due_date(start, number)?,
                amount,
            })
        })
        .collect()
}

/// Installment amount plus a percentage surcharge, rounded half-up.
/// `apply_penalty(10000, 10) == Some(11000)`; `None` if the result does not
/// fit in `Cents`.
pub fn apply_penalty(amount: Cents, penalty_percent: u32) -> Option<Cents> {
    let factor = i128::from(penalty_percent).checked_add(100)?;
    let scaled = i128::from(amount).checked_mul(factor)?;
    let rounded = if scaled >= 0 {
        scaled.checked_add(50)? / 100
    } else {
        scaled.checked_sub(50)? / 100
    };
    Cents::try_from(rounded).ok()
}

/// Sum of all scheduled payments.
pub fn schedule_total(payments: &[ScheduledPayment]) -> Cents {
    payments.iter().map(|p| p.amount).sum()
}
