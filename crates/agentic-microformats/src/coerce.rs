//! Raw string to typed value coercion.
//!
//! Coercion is total: on any parse failure the raw string comes back
//! unchanged, so a caller can detect failure by checking for a string where a
//! non-textual hint was requested.

use serde_json::{Number, Value};

use crate::types::TypeHint;

/// Largest integer a JSON consumer can read back without precision loss.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Convert `raw` according to `hint`.
pub fn coerce_value(raw: &str, hint: TypeHint) -> Value {
    let coerced = match hint {
        TypeHint::Number => parse_float_prefix(raw).and_then(number_value),
        TypeHint::Integer => parse_integer(raw),
        TypeHint::Boolean => match raw {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        TypeHint::Currency => parse_currency(raw).and_then(number_value),
        TypeHint::Json => serde_json::from_str(raw).ok(),
        TypeHint::String
        | TypeHint::Enum
        | TypeHint::Url
        | TypeHint::Email
        | TypeHint::Date
        | TypeHint::DateTime => None,
    };
    coerced.unwrap_or_else(|| Value::String(raw.to_string()))
}

/// True when `value` is the raw fallback for a hint that should have produced
/// a typed value.
pub fn is_coercion_failure(value: &Value, hint: TypeHint) -> bool {
    !hint.is_textual() && hint != TypeHint::Json && value.is_string()
}

/// Parse the longest leading decimal number of `s`, ignoring leading
/// whitespace and any trailing garbage ("12px" reads as 12).
pub fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Whole-string parse that only accepts mathematical integers.
fn parse_integer(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let n = trimmed.parse::<f64>().ok().filter(|n| n.is_finite())?;
    if n.fract() != 0.0 {
        return None;
    }
    number_value(n)
}

/// Normalize locale-formatted money ("1.234,56 €", "$1,234.56") and parse it.
fn parse_currency(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    let comma_is_decimal = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(_), None) => true,
        (Some(comma), Some(period)) => comma > period,
        (None, _) => false,
    };

    let normalized = if comma_is_decimal {
        cleaned.replace('.', "").replacen(',', ".", 1)
    } else {
        cleaned.replace(',', "")
    };
    parse_float_prefix(&normalized)
}

/// JSON number for `n`, written as an integer when it is one.
pub(crate) fn number_value(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Some(Value::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number)
}
