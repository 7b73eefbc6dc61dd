//! Storage-class coercion.
//!
//! Every typed accessor ([`Value::get_int64`](crate::Value::get_int64),
//! [`Reader::get_text`](crate::Reader::get_text), ...) funnels through the
//! functions here so that reads behave like the engine's `sqlite3_column_*`
//! conversions:
//!
//! | from \ to | int64                     | double           | text            | blob          |
//! |-----------|---------------------------|------------------|-----------------|---------------|
//! | NULL      | 0                         | 0.0              | `""`            | empty         |
//! | INTEGER   | itself                    | exact conversion | decimal         | decimal bytes |
//! | FLOAT     | truncated, saturating     | itself           | `%!.15g`        | text bytes    |
//! | TEXT      | integer prefix, saturating| real prefix      | itself          | UTF-8 bytes   |
//! | BLOB      | as TEXT                   | as TEXT          | lossy UTF-8     | itself        |
//!
//! Coercion never fails; unparsable input yields zero.

use crate::value::Value;

/// Coerces `value` to a 64-bit integer.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_int64(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        // `as` saturates at the bounds and maps NaN to 0.
        Value::Float(f) => *f as i64,
        Value::Text(s) => parse_int_prefix(s.as_bytes()),
        Value::Blob(b) => parse_int_prefix(b),
        Value::Null => 0,
    }
}

/// Coerces `value` to a double.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_double(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        Value::Text(s) => parse_real_prefix(s.as_bytes()),
        Value::Blob(b) => parse_real_prefix(b),
        Value::Null => 0.0,
    }
}

/// Coerces `value` to text.
#[must_use]
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => format_double(*f),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Null => String::new(),
    }
}

/// Coerces `value` to raw bytes.
#[must_use]
pub fn to_blob(value: &Value) -> Vec<u8> {
    match value {
        Value::Blob(b) => b.clone(),
        Value::Text(s) => s.as_bytes().to_vec(),
        Value::Integer(_) | Value::Float(_) => to_text(value).into_bytes(),
        Value::Null => Vec::new(),
    }
}

/// Renders a double the way the engine's `%!.15g` format does: 15
/// significant digits, trailing zeros trimmed, and always a `.0` when the
/// result would otherwise look like an integer.
#[must_use]
pub fn format_double(f: f64) -> String {
    if f.is_nan() {
        return String::new();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Inf".into() } else { "-Inf".into() };
    }
    if f == 0.0 {
        return "0.0".into();
    }

    let scientific = format!("{f:.14e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..15).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        );
    }

    let decimals = usize::try_from(14 - exponent).unwrap_or(0);
    trim_fraction(&format!("{f:.decimals$}"))
}

fn trim_fraction(digits: &str) -> String {
    if !digits.contains('.') {
        return format!("{digits}.0");
    }
    let trimmed = digits.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}

const fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

fn skip_space(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().take_while(|b| is_space(**b)).count();
    &bytes[start..]
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Parses the longest integer prefix after optional whitespace and sign.
/// Out-of-range values saturate.
fn parse_int_prefix(bytes: &[u8]) -> i64 {
    let bytes = skip_space(bytes);
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    };

    let mut acc: i64 = 0;
    for b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        let digit = i64::from(b - b'0');
        // Accumulate towards the sign so that i64::MIN is reachable.
        let next = acc.checked_mul(10).and_then(|v| {
            if negative {
                v.checked_sub(digit)
            } else {
                v.checked_add(digit)
            }
        });
        match next {
            Some(v) => acc = v,
            None => return if negative { i64::MIN } else { i64::MAX },
        }
    }
    acc
}

/// Parses the longest real-number prefix after optional whitespace.
fn parse_real_prefix(bytes: &[u8]) -> f64 {
    let bytes = skip_space(bytes);
    let mut end = usize::from(matches!(bytes.first(), Some(b'-' | b'+')));

    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let exp_digits = count_digits(&bytes[exp_end..]);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }

    std::str::from_utf8(&bytes[..end])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}
