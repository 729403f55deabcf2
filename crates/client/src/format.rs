//! Currency formatting and conversion. Pure functions, no I/O.

use walletsync_shared::{parse_minor_units, CurrencyCode, ExchangeRateTable};

/// Shown for codes outside the supported set.
pub const UNKNOWN_SYMBOL: &str = "¤";

/// Digit grouping and separators for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// `1,234,567.89`
    #[default]
    EnUs,
    /// `12,34,567.89`
    EnIn,
    /// `1.234.567,89`
    DeDe,
}

impl Locale {
    fn group_separator(self) -> char {
        match self {
            Locale::EnUs | Locale::EnIn => ',',
            Locale::DeDe => '.',
        }
    }

    fn decimal_separator(self) -> char {
        match self {
            Locale::EnUs | Locale::EnIn => '.',
            Locale::DeDe => ',',
        }
    }
}

/// Symbol for a currency code, case-insensitive.
pub fn symbol_for(code: &str) -> &'static str {
    code.trim()
        .parse::<CurrencyCode>()
        .map(|c| c.symbol())
        .unwrap_or(UNKNOWN_SYMBOL)
}

/// `amount` grouped for `en-US` with the currency's fixed fractional digits.
///
/// ```
/// # use walletsync_client::format::format;
/// # use walletsync_shared::CurrencyCode;
/// assert_eq!(format("1234.5", CurrencyCode::USD), "1,234.50");
/// assert_eq!(format("10", CurrencyCode::BTC), "10.00000000");
/// assert_eq!(format("oops", CurrencyCode::USD), "0.00");
/// ```
pub fn format(amount: &str, currency: CurrencyCode) -> String {
    format_with_locale(amount, currency, Locale::EnUs)
}

/// Like [`format`] with explicit grouping rules. Non-numeric and negative
/// amounts display as zero.
pub fn format_with_locale(amount: &str, currency: CurrencyCode, locale: Locale) -> String {
    let decimals = currency.decimals();
    let minor = parse_minor_units(amount, decimals).unwrap_or(0).max(0);

    let divisor = 10_u128.pow(decimals);
    let minor = minor as u128;
    let major = group_digits(&(minor / divisor).to_string(), locale);
    if decimals == 0 {
        return major;
    }
    let fraction = minor % divisor;
    format!(
        "{major}{sep}{fraction:0width$}",
        sep = locale.decimal_separator(),
        width = decimals as usize
    )
}

/// [`format`] prefixed with the currency symbol, e.g. `৳11,000.00`.
pub fn format_with_symbol(amount: &str, currency: CurrencyCode) -> String {
    format!("{}{}", currency.symbol(), format(amount, currency))
}

fn group_digits(digits: &str, locale: Locale) -> String {
    let sep = locale.group_separator();
    let len = digits.len();
    if len <= 3 {
        return digits.to_string();
    }

    let (head, tail) = digits.split_at(len - 3);
    let group = match locale {
        Locale::EnIn => 2,
        Locale::EnUs | Locale::DeDe => 3,
    };

    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(group);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();

    let mut out = groups.join(&sep.to_string());
    out.push(sep);
    out.push_str(tail);
    out
}

/// Converts `amount` from one currency to another through the table's base.
///
/// Same-currency conversion returns `amount` without consulting the table.
/// `None` means no conversion is available; a missing rate is never read as
/// zero.
pub fn convert(amount: f64, from: CurrencyCode, to: CurrencyCode, table: &ExchangeRateTable) -> Option<f64> {
    if from == to {
        return Some(amount);
    }
    let from_rate = table.rate(from)?;
    let to_rate = table.rate(to)?;
    Some(amount / from_rate * to_rate)
}

/// [`convert`] for a decimal string; `None` also for non-numeric input.
pub fn convert_str(amount: &str, from: CurrencyCode, to: CurrencyCode, table: &ExchangeRateTable) -> Option<f64> {
    let value: f64 = amount.trim().parse().ok().filter(|v: &f64| v.is_finite())?;
    convert(value, from, to, table)
}
