//! Amount conversion between two currencies of a [`RateMapping`]

use crate::core::rates::RateMapping;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Number of fraction digits shown for every amount.
pub const DISPLAY_SCALE: u32 = 2;

/// Which side of a currency pair drives the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `amount` is in the source currency, the result in the target currency.
    Forward,
    /// `amount` is in the target currency, the result in the source currency.
    Reverse,
}

/// Converts `amount` between `from` and `to` using `mapping`.
///
/// Returns `None` when either code is empty or unknown, or when the decimal
/// arithmetic overflows. Callers leave their previous output in place then.
pub fn convert(
    mapping: &RateMapping,
    from: &str,
    to: &str,
    amount: Decimal,
    direction: Direction,
) -> Option<Decimal> {
    if from.is_empty() || to.is_empty() {
        return None;
    }
    let source = mapping.get(from)?;
    let target = mapping.get(to)?;

    let (given, wanted) = match direction {
        Direction::Forward => (source, target),
        Direction::Reverse => (target, source),
    };
    wanted.from_base(given.to_base(amount)?)
}

/// Renders an amount with exactly two fraction digits, rounding half away from zero.
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded =
        amount.round_dp_with_strategy(DISPLAY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DISPLAY_SCALE);
    rounded.to_string()
}

/// Parses user-typed amount text. Accepts `,` as the decimal separator.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let normalized = text.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    Decimal::from_str(&normalized).ok()
}
