//! Exact rational helpers shared by the term language and the backends.

use num::bigint::BigInt;
use num::rational::BigRational;
use num::traits::{Signed, ToPrimitive, Zero};

/// Exact rational value of a finite `f64`. Non-finite inputs have no
/// rational value.
pub fn from_f64(value: f64) -> Option<BigRational> {
    if !value.is_finite() {
        return None;
    }
    BigRational::from_float(value)
}

/// Nearest `f64` to a rational.
pub fn to_f64(value: &BigRational) -> f64 {
    if let Some(v) = value.to_f64() {
        return v;
    }
    match (value.numer().to_f64(), value.denom().to_f64()) {
        (Some(n), Some(d)) if d != 0.0 => n / d,
        _ => 0.0,
    }
}

pub fn from_integer(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

pub fn ratio(numer: i64, denom: i64) -> BigRational {
    BigRational::new(BigInt::from(numer), BigInt::from(denom))
}

/// Parse an SMT-LIB decimal or integer numeral (`3`, `0.25`, `12.0`).
pub fn parse_decimal(text: &str) -> Option<BigRational> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let mut numer_digits = String::with_capacity(int_part.len() + frac_part.len());
    numer_digits.push_str(int_part);
    numer_digits.push_str(frac_part);
    let numer: BigInt = if numer_digits.is_empty() {
        BigInt::zero()
    } else {
        numer_digits.parse().ok()?
    };
    let denom = num::pow(BigInt::from(10), frac_part.len());
    let value = BigRational::new(numer, denom);
    Some(if negative { -value } else { value })
}

/// Render a rational as an SMT-LIB real term.
pub fn to_smtlib(value: &BigRational) -> String {
    let magnitude = value.abs();
    let body = if magnitude.is_integer() {
        format!("{}.0", magnitude.numer())
    } else {
        format!("(/ {}.0 {}.0)", magnitude.numer(), magnitude.denom())
    };
    if value.is_negative() {
        format!("(- {body})")
    } else {
        body
    }
}
