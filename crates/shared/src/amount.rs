//! Decimal monetary amounts carried as strings.
//!
//! Balances travel over the wire as decimal strings so that no hop ever
//! round-trips them through a float. Arithmetic, when needed, happens on
//! integer minor units derived from the string.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::currency::CurrencyCode;

/// A decimal amount as received from (or sent to) the wallet backend.
///
/// The string is kept verbatim; use [`MonetaryAmount::to_minor_units`] to get
/// a rounded integer view for a given number of fractional digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonetaryAmount(String);

impl MonetaryAmount {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Zero, written with the currency's fractional digits (e.g. `0.00`).
    pub fn zero(currency: CurrencyCode) -> Self {
        Self::from_minor_units(0, currency.decimals())
    }

    /// Builds the canonical string for `minor` units at `decimals` places.
    ///
    /// ```
    /// # use walletsync_shared::MonetaryAmount;
    /// assert_eq!(MonetaryAmount::from_minor_units(12345, 2).as_str(), "123.45");
    /// assert_eq!(MonetaryAmount::from_minor_units(-5, 2).as_str(), "-0.05");
    /// ```
    pub fn from_minor_units(minor: i128, decimals: u32) -> Self {
        if decimals == 0 {
            return Self(minor.to_string());
        }
        let divisor = 10_i128.pow(decimals);
        let sign = if minor < 0 { "-" } else { "" };
        let major = (minor / divisor).abs();
        let fraction = (minor % divisor).abs();
        Self(format!(
            "{sign}{major}.{fraction:0width$}",
            width = decimals as usize
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the string is a plain decimal number.
    pub fn is_numeric(&self) -> bool {
        parse_minor_units(&self.0, 0).is_some()
    }

    pub fn is_negative(&self) -> bool {
        parse_minor_units(&self.0, 8).is_some_and(|minor| minor < 0)
    }

    /// Rounds the amount half away from zero to `decimals` places and returns
    /// it as an integer count of minor units. `None` if the string is not a
    /// plain decimal number or overflows.
    pub fn to_minor_units(&self, decimals: u32) -> Option<i128> {
        parse_minor_units(&self.0, decimals)
    }
}

impl fmt::Display for MonetaryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MonetaryAmount {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MonetaryAmount {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for MonetaryAmount {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parses a decimal string (`"-12.345"`, `"+7"`, `".5"`) into minor units at
/// `decimals` places, rounding half away from zero.
pub fn parse_minor_units(input: &str, decimals: u32) -> Option<i128> {
    let s = input.trim();
    let (is_negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let mut parts = digits.split('.');
    let major_str = parts.next().unwrap_or("");
    let minor_str = parts.next().unwrap_or("");

    if parts.next().is_some() || (major_str.is_empty() && minor_str.is_empty()) {
        return None;
    }
    if !major_str.bytes().all(|b| b.is_ascii_digit())
        || !minor_str.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let places = decimals as usize;
    let (kept, dropped) = if minor_str.len() > places {
        minor_str.split_at(places)
    } else {
        (minor_str, "")
    };

    let major_units: i128 = if major_str.is_empty() {
        0
    } else {
        major_str.parse().ok()?
    };
    let kept_units: i128 = if kept.is_empty() { 0 } else { kept.parse().ok()? };

    let multiplier = 10_i128.checked_pow(decimals)?;
    let scaled_minor = kept_units.checked_mul(10_i128.checked_pow((places - kept.len()) as u32)?)?;
    let mut total = major_units
        .checked_mul(multiplier)?
        .checked_add(scaled_minor)?;

    if dropped.as_bytes().first().is_some_and(|b| *b >= b'5') {
        total = total.checked_add(1)?;
    }

    Some(if is_negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(parse_minor_units("1.005", 2), Some(101));
        assert_eq!(parse_minor_units("1.004", 2), Some(100));
        assert_eq!(parse_minor_units("-1.005", 2), Some(-101));
        assert_eq!(parse_minor_units("0.123456789", 8), Some(12_345_679));
    }

    #[test]
    fn pads_short_fractions() {
        assert_eq!(parse_minor_units("10", 8), Some(1_000_000_000));
        assert_eq!(parse_minor_units("10.5", 2), Some(1050));
        assert_eq!(parse_minor_units(".5", 2), Some(50));
        assert_eq!(parse_minor_units("+3.", 2), Some(300));
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "abc", "1.2.3", "1e5", "--1", "1,000.00", "."] {
            assert_eq!(parse_minor_units(input, 2), None, "{input:?}");
        }
    }

    #[test]
    fn minor_unit_round_trip_keeps_sign() {
        let amount = MonetaryAmount::from_minor_units(-1050, 2);
        assert_eq!(amount.as_str(), "-10.50");
        assert!(amount.is_negative());
        assert_eq!(amount.to_minor_units(2), Some(-1050));
        assert_eq!(MonetaryAmount::zero(CurrencyCode::BTC).as_str(), "0.00000000");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&MonetaryAmount::new("150.00")).unwrap();
        assert_eq!(json, "\"150.00\"");
    }
}
