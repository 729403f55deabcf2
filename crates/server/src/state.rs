//! Application state shared across request handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use walletsync_shared::{CurrencyCode, ExchangeRateTable, MonetaryAmount, ServerMessage};

use crate::config::{DevUser, ServerConfig};

const PUSH_CAPACITY: usize = 100;

/// Balance of a new wallet, in minor units of USD.
pub const NEW_WALLET_MINOR_UNITS: i128 = 100_000;

/// A single user's wallet. The balance is held in minor units of `currency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wallet {
    pub currency: CurrencyCode,
    pub minor_units: i128,
}

impl Wallet {
    pub fn balance(&self) -> MonetaryAmount {
        MonetaryAmount::from_minor_units(self.minor_units, self.currency.decimals())
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::USD,
            minor_units: NEW_WALLET_MINOR_UNITS,
        }
    }
}

/// A frame addressed to every push connection of one user.
#[derive(Debug, Clone)]
pub struct Push {
    pub username: String,
    pub message: ServerMessage,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub wallets: Arc<RwLock<HashMap<String, Wallet>>>,
    /// Bearer token to username.
    pub tokens: Arc<RwLock<HashMap<String, String>>>,
    pub rates: Arc<RwLock<ExchangeRateTable>>,
    pub pushes: broadcast::Sender<Push>,
    pub heartbeat_interval: Duration,
}

impl AppState {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self::with_rates(default_rates(), heartbeat_interval)
    }

    pub fn with_rates(rates: ExchangeRateTable, heartbeat_interval: Duration) -> Self {
        let (pushes, _rx) = broadcast::channel(PUSH_CAPACITY);
        Self {
            wallets: Arc::new(RwLock::new(HashMap::new())),
            tokens: Arc::new(RwLock::new(HashMap::new())),
            rates: Arc::new(RwLock::new(rates)),
            pushes,
            heartbeat_interval,
        }
    }

    pub async fn from_config(config: &ServerConfig) -> Self {
        let state = Self::new(config.heartbeat_interval);
        for user in &config.dev_users {
            state.seed(user).await;
        }
        state
    }

    pub async fn seed(&self, user: &DevUser) {
        tracing::info!("Seeding wallet for {}: {} minor units of {}", user.username, user.minor_units, user.currency);
        self.wallets.write().await.insert(
            user.username.clone(),
            Wallet {
                currency: user.currency,
                minor_units: user.minor_units,
            },
        );
    }

    /// Issue a fresh token for `username`, creating the wallet if needed.
    pub async fn sign_in(&self, username: &str) -> (String, Wallet) {
        let wallet = *self
            .wallets
            .write()
            .await
            .entry(username.to_string())
            .or_default();
        let token = uuid::Uuid::new_v4().to_string();
        self.tokens.write().await.insert(token.clone(), username.to_string());
        (token, wallet)
    }

    pub async fn user_for_token(&self, token: &str) -> Option<String> {
        self.tokens.read().await.get(token).cloned()
    }

    pub async fn wallet(&self, username: &str) -> Wallet {
        self.wallets.read().await.get(username).copied().unwrap_or_default()
    }

    /// Fan `message` out to every push connection of `username`.
    pub fn push(&self, username: &str, message: ServerMessage) {
        let receivers = self
            .pushes
            .send(Push {
                username: username.to_string(),
                message,
            })
            .unwrap_or(0);
        tracing::debug!("Pushed to {} ({} listeners)", username, receivers);
    }
}

/// Units per USD.
pub fn default_rates() -> ExchangeRateTable {
    [
        (CurrencyCode::EUR, 0.92),
        (CurrencyCode::GBP, 0.79),
        (CurrencyCode::BDT, 110.0),
        (CurrencyCode::INR, 83.0),
        (CurrencyCode::PKR, 278.0),
        (CurrencyCode::NPR, 133.0),
        (CurrencyCode::LKR, 300.0),
        (CurrencyCode::AED, 3.67),
        (CurrencyCode::SAR, 3.75),
        (CurrencyCode::MYR, 4.7),
        (CurrencyCode::PHP, 56.0),
        (CurrencyCode::THB, 36.0),
        (CurrencyCode::BRL, 5.0),
        (CurrencyCode::NGN, 1500.0),
        (CurrencyCode::BTC, 0.000016),
    ]
    .into_iter()
    .fold(ExchangeRateTable::new(CurrencyCode::USD, Utc::now()), |table, (code, rate)| {
        table.with_rate(code, rate)
    })
}
