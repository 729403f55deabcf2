//! The closed set of currencies a wallet can be held in.

use serde::{Deserialize, Serialize};

/// A wallet currency.
///
/// The set is closed: any code outside it is rejected at parse time, and the
/// formatting layer falls back to a placeholder symbol for such codes.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Default,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
#[allow(clippy::upper_case_acronyms)]
pub enum CurrencyCode {
    #[default]
    USD, // United States Dollar
    EUR, // Euro
    GBP, // Great British Pound
    BDT, // Bangladeshi Taka
    INR, // Indian Rupee
    PKR, // Pakistani Rupee
    NPR, // Nepalese Rupee
    LKR, // Sri Lankan Rupee
    AED, // United Arab Emirates Dirham
    SAR, // Saudi Riyal
    MYR, // Malaysian Ringgit
    PHP, // Philippine Peso
    THB, // Thai Baht
    BRL, // Brazilian Real
    NGN, // Nigerian Naira
    BTC, // Bitcoin
}

impl CurrencyCode {
    /// Number of fractional digits carried by amounts in this currency.
    ///
    /// Bitcoin is tracked to the satoshi; every fiat currency uses two places.
    pub fn decimals(&self) -> u32 {
        match self {
            Self::BTC => 8,
            _ => 2,
        }
    }

    pub fn is_crypto(&self) -> bool {
        matches!(self, Self::BTC)
    }

    /// Returns the graphical symbol for the currency (e.g., '$').
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::USD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::BDT => "৳",
            Self::INR => "₹",
            Self::PKR => "₨",
            Self::NPR => "रु",
            Self::LKR => "Rs",
            Self::AED => "د.إ",
            Self::SAR => "﷼",
            Self::MYR => "RM",
            Self::PHP => "₱",
            Self::THB => "฿",
            Self::BRL => "R$",
            Self::NGN => "₦",
            Self::BTC => "₿",
        }
    }

    /// Returns the ISO 4217 style code (e.g., "USD").
    pub fn code(&self) -> &'static str {
        self.into()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::USD => "United States Dollar",
            Self::EUR => "Euro",
            Self::GBP => "Great British Pound",
            Self::BDT => "Bangladeshi Taka",
            Self::INR => "Indian Rupee",
            Self::PKR => "Pakistani Rupee",
            Self::NPR => "Nepalese Rupee",
            Self::LKR => "Sri Lankan Rupee",
            Self::AED => "United Arab Emirates Dirham",
            Self::SAR => "Saudi Riyal",
            Self::MYR => "Malaysian Ringgit",
            Self::PHP => "Philippine Peso",
            Self::THB => "Thai Baht",
            Self::BRL => "Brazilian Real",
            Self::NGN => "Nigerian Naira",
            Self::BTC => "Bitcoin",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!("bdt".parse::<CurrencyCode>().unwrap(), CurrencyCode::BDT);
        assert_eq!("BTC".parse::<CurrencyCode>().unwrap(), CurrencyCode::BTC);
        assert!("XYZ".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn only_bitcoin_carries_eight_places() {
        for currency in CurrencyCode::iter() {
            let expected = if currency == CurrencyCode::BTC { 8 } else { 2 };
            assert_eq!(currency.decimals(), expected, "{currency}");
        }
    }

    #[test]
    fn serializes_as_bare_code() {
        let json = serde_json::to_string(&CurrencyCode::INR).unwrap();
        assert_eq!(json, "\"INR\"");
        let back: CurrencyCode = serde_json::from_str("\"NGN\"").unwrap();
        assert_eq!(back, CurrencyCode::NGN);
    }
}
