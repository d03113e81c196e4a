//! Syntax and range checks for numeric constants in actions.
//!
//! Numbers are never evaluated, but a constant is only accepted when it would
//! read as an unsigned or signed 64-bit integer, a finite 64-bit float, or an
//! imaginary or complex value built from those.

use crate::error::ParseErrorKind;

/// Checks that `text` is a well-formed numeric constant. `complex` marks a
/// `real+imagi` token.
///
/// # Errors
/// - `integer overflow` when the text reads as a float but is written as an
///   integer that does not fit 64 bits.
/// - `illegal number syntax` for anything else that is not a number.
pub(crate) fn check_number(text: &str, complex: bool) -> Result<(), ParseErrorKind> {
    let illegal = || ParseErrorKind::Message(format!("illegal number syntax: {text:?}"));

    if complex {
        let (real, imaginary) = split_complex(text).ok_or_else(illegal)?;
        return if is_float(real) && is_float(imaginary) {
            Ok(())
        } else {
            Err(illegal())
        };
    }

    if text.strip_suffix('i').is_some_and(is_float) {
        return Ok(());
    }
    if is_int(text) {
        return Ok(());
    }
    if is_float(text) {
        if !text.contains(['.', 'e', 'E', 'p', 'P']) {
            return Err(ParseErrorKind::Message(format!("integer overflow: {text:?}")));
        }
        return Ok(());
    }
    Err(illegal())
}

/// Splits `1+2i` into `1` and `+2`.
fn split_complex(text: &str) -> Option<(&str, &str)> {
    let body = text.strip_suffix('i')?;
    let bytes = body.as_bytes();
    // The sign of the imaginary part is the last one not owned by an exponent.
    let split = (1..bytes.len()).rev().find(|&i| {
        matches!(bytes.get(i), Some(b'+' | b'-'))
            && !matches!(bytes.get(i.wrapping_sub(1)), Some(b'e' | b'E' | b'p' | b'P'))
    })?;
    Some(body.split_at(split))
}

fn is_int(text: &str) -> bool {
    if let Some(digits) = text.strip_prefix('-') {
        return parse_uint(digits).is_some_and(|value| value <= i64::MIN.unsigned_abs());
    }
    if let Some(digits) = text.strip_prefix('+') {
        return parse_uint(digits).is_some_and(|value| i64::try_from(value).is_ok());
    }
    parse_uint(text).is_some()
}

/// Reads an unsigned integer, inferring the base from a `0x`, `0o`, `0b` or
/// bare `0` prefix. Underscores may separate digits.
fn parse_uint(text: &str) -> Option<u64> {
    let (radix, digits): (u32, &[u8]) = match text.as_bytes() {
        [b'0', b'x' | b'X', rest @ ..] if !rest.is_empty() => (16, rest),
        [b'0', b'o' | b'O', rest @ ..] if !rest.is_empty() => (8, rest),
        [b'0', b'b' | b'B', rest @ ..] if !rest.is_empty() => (2, rest),
        [b'0', rest @ ..] if !rest.is_empty() => (8, rest),
        [] => return None,
        all => (10, all),
    };

    let mut value: u64 = 0;
    let mut underscores = false;
    for &b in digits {
        if b == b'_' {
            underscores = true;
            continue;
        }
        let digit = char::from(b).to_digit(radix)?;
        value = value.checked_mul(u64::from(radix))?.checked_add(u64::from(digit))?;
    }
    if underscores && !underscores_ok(text) {
        return None;
    }
    Some(value)
}

fn is_float(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (hex, body) = match unsigned.as_bytes() {
        [b'0', b'x' | b'X', rest @ ..] if !rest.is_empty() => (true, rest),
        all => (false, all),
    };

    let mut rest = body;
    let mut underscores = false;
    let mut saw_dot = false;
    let mut saw_digits = false;
    let mut mantissa = 0f64;
    let mut fraction_digits: i64 = 0;
    while let Some((&b, tail)) = rest.split_first() {
        match b {
            b'_' => underscores = true,
            b'.' if !saw_dot => saw_dot = true,
            b if hex && b.is_ascii_hexdigit() => {
                saw_digits = true;
                let digit = char::from(b).to_digit(16).unwrap_or_default();
                mantissa = mantissa.mul_add(16.0, f64::from(digit));
                if saw_dot {
                    fraction_digits = fraction_digits.saturating_add(1);
                }
            }
            b if b.is_ascii_digit() => saw_digits = true,
            _ => break,
        }
        rest = tail;
    }
    if !saw_digits {
        return false;
    }

    let mut exponent = 0;
    match rest.split_first() {
        Some((&(b'e' | b'E'), tail)) if !hex => {
            let Some((tail, value)) = scan_exponent(tail, &mut underscores) else {
                return false;
            };
            rest = tail;
            exponent = value;
        }
        Some((&(b'p' | b'P'), tail)) if hex => {
            let Some((tail, value)) = scan_exponent(tail, &mut underscores) else {
                return false;
            };
            rest = tail;
            exponent = value;
        }
        // A hexadecimal mantissa needs a binary exponent.
        _ if hex => return false,
        _ => {}
    }
    if !rest.is_empty() || (underscores && !underscores_ok(text)) {
        return false;
    }

    if hex {
        if mantissa == 0.0 {
            return true;
        }
        let scale = exponent.saturating_sub(fraction_digits.saturating_mul(4));
        // Underflow rounds to zero, which is still a number.
        let Ok(scale) = i32::try_from(scale) else {
            return scale < 0;
        };
        return mantissa.log2() + f64::from(scale) < 1024.0;
    }
    text.replace('_', "").parse::<f64>().is_ok_and(f64::is_finite)
}

/// Reads an exponent with an optional sign and at least one decimal digit.
fn scan_exponent<'t>(bytes: &'t [u8], underscores: &mut bool) -> Option<(&'t [u8], i64)> {
    let (negative, mut rest) = match bytes {
        [b'-', tail @ ..] => (true, tail),
        [b'+', tail @ ..] => (false, tail),
        all => (false, all),
    };
    if !rest.first().is_some_and(u8::is_ascii_digit) {
        return None;
    }

    let mut value: i64 = 0;
    while let Some((&b, tail)) = rest.split_first() {
        match b {
            b'_' => *underscores = true,
            b'0'..=b'9' => {
                let digit = char::from(b).to_digit(10).unwrap_or_default();
                value = value.saturating_mul(10).saturating_add(i64::from(digit));
            }
            _ => break,
        }
        rest = tail;
    }
    Some((rest, if negative { value.saturating_neg() } else { value }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seen {
    Start,
    Digit,
    Underscore,
    Other,
}

/// Underscores must sit between digits, where a base prefix counts as a
/// digit.
fn underscores_ok(text: &str) -> bool {
    let text = text.strip_prefix(['+', '-']).unwrap_or(text);
    let bytes = text.as_bytes();
    let (hex, start, mut seen) = match bytes {
        [b'0', prefix, ..] if matches!(prefix.to_ascii_lowercase(), b'b' | b'o' | b'x') => {
            (prefix.eq_ignore_ascii_case(&b'x'), 2, Seen::Digit)
        }
        _ => (false, 0, Seen::Start),
    };

    for &b in bytes.iter().skip(start) {
        if b.is_ascii_digit() || (hex && b.is_ascii_hexdigit()) {
            seen = Seen::Digit;
        } else if b == b'_' {
            if seen != Seen::Digit {
                return false;
            }
            seen = Seen::Underscore;
        } else {
            if seen == Seen::Underscore {
                return false;
            }
            seen = Seen::Other;
        }
    }
    seen != Seen::Underscore
}
