use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Money is stored as integer minor units (kopecks for RUB) so that balance
/// arithmetic and schedule sums are exact. 1 RUB = 100 kopecks.
pub type Cents = i64;

/// The only currency the ledger accepts.
pub const SUPPORTED_CURRENCY: &str = "RUB";

/// Format cents as a decimal string.
/// Example: 1066185 -> "10661.85", -1 -> "-0.01"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Format cents together with the ledger currency, e.g. "110.00 RUB".
pub fn format_amount(cents: Cents) -> String {
    format!("{} {}", format_cents(cents), SUPPORTED_CURRENCY)
}

/// Parse a decimal string into cents.
///
/// Accepts at most two fractional digits; anything finer cannot be represented
/// in the ledger and is rejected rather than silently truncated.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }

    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, fraction_str) = match digits.split_once('.') {
        Some((units, fraction)) => (units, fraction),
        None => (digits, ""),
    };

    if units_str.is_empty() && fraction_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }
    if fraction_str.len() > 2 {
        return Err(ParseCentsError::TooPrecise);
    }
    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !fraction_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseCentsError::Overflow)?
    };

    // "5" after the point means 50 kopecks
    let fraction: i64 = match fraction_str.len() {
        0 => 0,
        1 => fraction_str.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        _ => fraction_str.parse().map_err(|_| ParseCentsError::InvalidFormat)?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or(ParseCentsError::Overflow)?;

    Ok(if negative { -cents } else { cents })
}

/// Round a fractional amount of cents half-up (away from zero) to whole cents.
pub fn round_half_up(cents: Decimal) -> Option<Cents> {
    cents
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("invalid money format")]
    InvalidFormat,
    #[error("amounts support at most two decimal places")]
    TooPrecise,
    #[error("amount is too large")]
    Overflow,
}
