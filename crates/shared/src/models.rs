//! Shared data models for the wallet HTTP API and the balance update stream.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::MonetaryAmount;
use crate::currency::CurrencyCode;

// --- Auth ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
}

/// Login result, doubling as the profile snapshot a session starts from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub balance: MonetaryAmount,
    pub currency: CurrencyCode,
}

impl LoginResponse {
    pub fn snapshot(&self) -> BalanceResponse {
        BalanceResponse {
            balance: self.balance.clone(),
            currency: self.currency,
        }
    }
}

// --- Wallet ---

/// `GET /wallet/balance`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub balance: MonetaryAmount,
    pub currency: CurrencyCode,
}

/// `POST /wallet/change-currency` request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCurrencyRequest {
    pub currency: CurrencyCode,
}

/// `POST /wallet/change-currency` response body.
///
/// A successful change carries the converted balance. `balance` is optional
/// on the wire so that a body without it can be recognised as malformed
/// rather than failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCurrencyResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<MonetaryAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `POST /wallet/adjust` (development server only): credit or debit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdjustBalanceRequest {
    pub delta: MonetaryAmount,
}

// --- Exchange rates ---

/// `GET /exchange-rates`
///
/// Rates are keyed by raw code so that a backend quoting a currency outside
/// the supported set does not poison the whole table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRatesResponse {
    pub base: CurrencyCode,
    pub rates: HashMap<String, f64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub age_in_minutes: Option<f64>,
}

// --- Balance updates ---

/// Where a balance update came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateSource {
    Push,
    Poll,
    Optimistic,
    ServerConfirmed,
}

/// The canonical update fanned out to every balance subscriber, in this tab
/// and in other tabs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdate {
    pub balance: MonetaryAmount,
    pub currency: CurrencyCode,
    pub source: UpdateSource,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_currency: Option<CurrencyCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_balance: Option<MonetaryAmount>,
}

impl BalanceUpdate {
    pub fn new(balance: MonetaryAmount, currency: CurrencyCode, source: UpdateSource) -> Self {
        Self {
            balance,
            currency,
            source,
            timestamp: Utc::now(),
            old_currency: None,
            old_balance: None,
        }
    }

    pub fn with_previous(mut self, currency: CurrencyCode, balance: MonetaryAmount) -> Self {
        self.old_currency = Some(currency);
        self.old_balance = Some(balance);
        self
    }

    pub fn from_balance(response: BalanceResponse, source: UpdateSource) -> Self {
        Self::new(response.balance, response.currency, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_source_uses_kebab_case() {
        let json = serde_json::to_string(&UpdateSource::ServerConfirmed).unwrap();
        assert_eq!(json, "\"server-confirmed\"");
    }

    #[test]
    fn change_response_without_balance_still_parses() {
        let parsed: ChangeCurrencyResponse =
            serde_json::from_str(r#"{"message":"ok"}"#).unwrap();
        assert_eq!(parsed.balance, None);
        assert_eq!(parsed.message.as_deref(), Some("ok"));
    }

    #[test]
    fn balance_update_omits_absent_previous_values() {
        let update = BalanceUpdate::new("1.00".into(), CurrencyCode::USD, UpdateSource::Push);
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("oldCurrency").is_none());
        assert_eq!(json["source"], "push");
    }
}
