#![forbid(unsafe_code)]

//! Significant-digit normalization applied to every numeric result leaf
//! before it is persisted or compared.
//!
//! Rounding is half-away-from-zero on the value scaled by a power of ten, so
//! `2.5 -> 3`, `-2.5 -> -3` and `0.125 -> 0.13` (two digits). Non-finite
//! inputs are returned unchanged.

use serde_json::{Number, Value};

pub const DEFAULT_SIGNIFICANT_DIGITS: u32 = 3;

/// Rounds `value` to `digits` significant digits. `digits == 0` is treated as 1.
#[must_use]
pub fn signif(value: f64, digits: u32) -> f64 {
    if !value.is_finite() || value == 0.0 {
        return value;
    }

    let digits = i32::try_from(digits.max(1)).unwrap_or(i32::MAX);
    let magnitude = value.abs().log10().floor() as i32;
    let shift = digits.saturating_sub(1).saturating_sub(magnitude);
    scale_round(value, shift)
}

fn scale_round(value: f64, shift: i32) -> f64 {
    // Dividing by an exact power of ten keeps results such as 333 / 1000
    // identical to the literal 0.333.
    if shift >= 0 {
        let factor = 10f64.powi(shift);
        let scaled = value * factor;
        if !factor.is_finite() || !scaled.is_finite() {
            return value;
        }
        scaled.round() / factor
    } else {
        let factor = 10f64.powi(-shift);
        if !factor.is_finite() {
            return value;
        }
        (value / factor).round() * factor
    }
}

fn round_magnitude(abs: u128, digits: u32) -> u128 {
    let digits = digits.max(1);
    let width = abs.checked_ilog10().map_or(1, |log| log + 1);
    if width <= digits {
        return abs;
    }

    let factor = 10u128.pow(width - digits);
    let quotient = abs / factor;
    let remainder = abs % factor;
    let rounded = if remainder * 2 >= factor {
        quotient + 1
    } else {
        quotient
    };
    rounded * factor
}

/// Integer counterpart of [`signif`]: `123456 -> 123000`. Saturates at the
/// `i64` bounds.
#[must_use]
pub fn signif_i64(value: i64, digits: u32) -> i64 {
    let magnitude = round_magnitude(u128::from(value.unsigned_abs()), digits) as i128;
    let signed = if value < 0 { -magnitude } else { magnitude };
    i64::try_from(signed).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

#[must_use]
pub fn signif_u64(value: u64, digits: u32) -> u64 {
    u64::try_from(round_magnitude(u128::from(value), digits)).unwrap_or(u64::MAX)
}

fn normalize_number(number: &Number, digits: u32) -> Value {
    if let Some(value) = number.as_i64() {
        return Value::from(signif_i64(value, digits));
    }
    if let Some(value) = number.as_u64() {
        return Value::from(signif_u64(value, digits));
    }
    number
        .as_f64()
        .and_then(|value| Number::from_f64(signif(value, digits)))
        .map_or_else(|| Value::Number(number.clone()), Value::Number)
}

/// Deep copy of `value` with every numeric leaf rounded to `digits`
/// significant digits. Integers stay integers, key order is preserved.
#[must_use]
pub fn normalize_value(value: &Value, digits: u32) -> Value {
    match value {
        Value::Number(number) => normalize_number(number, digits),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| normalize_value(item, digits))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), normalize_value(item, digits)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Fixed scientific notation in the form used by the CSV fixtures:
/// `1.23450E+00`, `-4.00000E-03`.
#[must_use]
pub fn format_scientific(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }

    let raw = format!("{value:.decimals$e}");
    let Some((mantissa, exponent)) = raw.split_once('e') else {
        return raw;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}E{sign}{:02}", exponent.unsigned_abs())
}
