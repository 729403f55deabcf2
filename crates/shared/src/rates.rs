//! Exchange-rate table fetched from the wallet backend.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::CurrencyCode;
use crate::models::ExchangeRatesResponse;

/// Units of each currency per one unit of `base`.
///
/// The base is implicitly priced at 1. A currency missing from `rates`
/// means "no conversion available", never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateTable {
    pub base: CurrencyCode,
    pub rates: HashMap<CurrencyCode, f64>,
    pub fetched_at: DateTime<Utc>,
}

impl ExchangeRateTable {
    pub fn new(base: CurrencyCode, fetched_at: DateTime<Utc>) -> Self {
        Self {
            base,
            rates: HashMap::new(),
            fetched_at,
        }
    }

    pub fn with_rate(mut self, currency: CurrencyCode, rate: f64) -> Self {
        self.rates.insert(currency, rate);
        self
    }

    /// Builds a table from the wire response, skipping codes outside the
    /// supported set.
    pub fn from_response(response: ExchangeRatesResponse, fetched_at: DateTime<Utc>) -> Self {
        let rates = response
            .rates
            .into_iter()
            .filter_map(|(code, rate)| code.parse::<CurrencyCode>().ok().map(|c| (c, rate)))
            .collect();
        Self {
            base: response.base,
            rates,
            fetched_at,
        }
    }

    /// Rate of `currency` against the base. Zero, negative and non-finite
    /// entries are treated as absent.
    pub fn rate(&self, currency: CurrencyCode) -> Option<f64> {
        if currency == self.base {
            return Some(1.0);
        }
        self.rates
            .get(&currency)
            .copied()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
    }

    /// Minutes elapsed since the table was fetched.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_minutes().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_is_implicitly_one() {
        let table = ExchangeRateTable::new(CurrencyCode::USD, Utc::now());
        assert_eq!(table.rate(CurrencyCode::USD), Some(1.0));
        assert_eq!(table.rate(CurrencyCode::BDT), None);
    }

    #[test]
    fn unusable_rates_are_absent() {
        let table = ExchangeRateTable::new(CurrencyCode::USD, Utc::now())
            .with_rate(CurrencyCode::BDT, 0.0)
            .with_rate(CurrencyCode::INR, f64::NAN)
            .with_rate(CurrencyCode::EUR, 0.92);
        assert_eq!(table.rate(CurrencyCode::BDT), None);
        assert_eq!(table.rate(CurrencyCode::INR), None);
        assert_eq!(table.rate(CurrencyCode::EUR), Some(0.92));
    }

    #[test]
    fn from_response_drops_unknown_codes() {
        let response: ExchangeRatesResponse = serde_json::from_str(
            r#"{"base":"USD","rates":{"BDT":110.0,"XYZ":3.0},"lastUpdated":null,"ageInMinutes":4}"#,
        )
        .unwrap();
        let table = ExchangeRateTable::from_response(response, Utc::now());
        assert_eq!(table.rates.len(), 1);
        assert_eq!(table.rate(CurrencyCode::BDT), Some(110.0));
    }
}
