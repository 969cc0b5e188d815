//! Decimal token amounts.
//!
//! Amounts travel as decimal strings ("12.5") and settle as integers in the
//! token's smallest unit. Extra fractional digits beyond the token precision
//! are rounded half-up on the first dropped digit, the same way wallet
//! tooling does it, so "0.0000005" at 6 decimals is 1 unit.

use alloy_primitives::U256;
use thiserror::Error;

/// Largest precision whose scale factor still fits in 256 bits.
pub const MAX_DECIMALS: u8 = 77;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitsError {
    #[error("amount is empty")]
    Empty,

    #[error("'{0}' is not a decimal amount")]
    Invalid(String),

    #[error("amount '{0}' does not fit in 256 bits")]
    Overflow(String),

    #[error("unsupported token precision: {0} decimals")]
    Precision(u8),
}

fn ten_pow(decimals: u8) -> U256 {
    (0..decimals).fold(U256::from(1u64), |acc, _| acc * U256::from(10u64))
}

/// Split "12.50" into ("12", "50"), checking the grammar `digits[.digits]`.
fn split_decimal(raw: &str) -> Result<(&str, &str), UnitsError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (int, frac) = match raw.split_once('.') {
        Some((i, f)) => (i, f),
        None => (raw, ""),
    };

    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (int.is_empty() && frac.is_empty()) || !digits_only(int) || !digits_only(frac) {
        return Err(UnitsError::Invalid(raw.to_string()));
    }

    Ok((int, frac))
}

/// True when `raw` is a well-formed decimal strictly greater than zero.
pub fn is_positive_decimal(raw: &str) -> bool {
    match split_decimal(raw) {
        Ok((int, frac)) => int.chars().chain(frac.chars()).any(|c| c != '0'),
        Err(_) => false,
    }
}

/// Convert a decimal string to the token's smallest unit.
pub fn parse_units(raw: &str, decimals: u8) -> Result<U256, UnitsError> {
    if decimals > MAX_DECIMALS {
        return Err(UnitsError::Precision(decimals));
    }
    let (int, frac) = split_decimal(raw)?;
    let overflow = || UnitsError::Overflow(raw.trim().to_string());

    let keep = frac.len().min(decimals as usize);
    let round_up = frac
        .as_bytes()
        .get(decimals as usize)
        .is_some_and(|d| *d >= b'5');

    let ten = U256::from(10u64);
    let mut value = U256::ZERO;
    for c in int.chars().chain(frac[..keep].chars()) {
        let digit = U256::from(c.to_digit(10).unwrap_or(0));
        value = value
            .checked_mul(ten)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(overflow)?;
    }

    let pad = ten_pow(decimals - keep as u8);
    value = value.checked_mul(pad).ok_or_else(overflow)?;
    if round_up {
        value = value.checked_add(U256::from(1u64)).ok_or_else(overflow)?;
    }
    Ok(value)
}

/// Exact decimal rendering of a smallest-unit amount ("12.5", "3").
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (int, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        int.to_string()
    } else {
        format!("{}.{}", int, frac)
    }
}

/// Two-decimal display form ("12.50"), rounded half-up.
pub fn format_display(value: U256, decimals: u8) -> String {
    let cents = if decimals >= 2 {
        let divisor = ten_pow(decimals - 2);
        let q = value / divisor;
        let r = value % divisor;
        if r * U256::from(2u64) >= divisor {
            q + U256::from(1u64)
        } else {
            q
        }
    } else {
        value * ten_pow(2 - decimals)
    };

    let hundred = U256::from(100u64);
    let frac = (cents % hundred).to_string();
    let frac = if frac.len() == 1 { format!("0{}", frac) } else { frac };
    format!("{}.{}", cents / hundred, frac)
}
