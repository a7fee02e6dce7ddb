//! Money rounding helpers.
//!
//! Amounts are carried as `rust_decimal::Decimal` at full precision; only
//! persisted/display values are rounded to two decimal places. Summations must
//! always use the unrounded per-line values to avoid cumulative rounding
//! drift.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places persisted for monetary values.
pub const MONEY_SCALE: u32 = 2;

/// Round a monetary amount to two decimal places (half away from zero).
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}
