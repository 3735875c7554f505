//! Money arithmetic for invoices.
//!
//! Everything is computed as `Decimal` and rounded to two places with
//! midpoint-away-from-zero, so 0.005 becomes 0.01.

use rust_decimal::prelude::*;
use serde_json::Value;
use std::str::FromStr;

const DECIMAL_PLACES: u32 = 2;

/// Round to two decimal places and fix the scale at 2 (`15` becomes `15.00`).
#[inline]
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DECIMAL_PLACES);
    rounded
}

/// `percent`% of `amount`, rounded. `None` when the product overflows.
#[inline]
pub fn percent_of(amount: Decimal, percent: Decimal) -> Option<Decimal> {
    amount
        .checked_mul(percent)?
        .checked_div(Decimal::ONE_HUNDRED)
        .map(round2)
}

/// `unit_price × quantity`, `None` on overflow.
#[inline]
pub fn line_total(unit_price: Decimal, quantity: u32) -> Option<Decimal> {
    unit_price.checked_mul(Decimal::from(quantity))
}

#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    round2(value).to_f64().unwrap_or_default()
}

/// Lenient read of a client-supplied amount.
///
/// Accepts JSON numbers and numeric strings. Returns `None` for anything that
/// is missing, non-numeric, non-finite or negative so the caller can decide
/// how to coerce it.
pub fn parse_non_negative(value: &Value) -> Option<Decimal> {
    let parsed = match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Value::String(s) => {
            let trimmed = s.trim();
            Decimal::from_str(trimmed)
                .ok()
                .or_else(|| Decimal::from_scientific(trimmed).ok())
        }
        _ => None,
    }?;

    if parsed.is_sign_negative() && !parsed.is_zero() {
        return None;
    }
    Some(parsed)
}
