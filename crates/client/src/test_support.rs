//! Scriptable `WalletApi` double for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use walletsync_shared::{
    ApiError, BalanceResponse, ChangeCurrencyResponse, CurrencyCode, ExchangeRatesResponse, MonetaryAmount,
};

use crate::api_client::WalletApi;

pub(crate) struct MockWallet {
    balance: Mutex<Result<BalanceResponse, ApiError>>,
    change: Mutex<Result<ChangeCurrencyResponse, ApiError>>,
    rates: Mutex<Result<ExchangeRatesResponse, ApiError>>,
    gate: Mutex<Option<Arc<Notify>>>,
    balance_gate: Mutex<Option<Arc<Notify>>>,
    balance_calls: AtomicUsize,
    change_calls: AtomicUsize,
    rate_calls: AtomicUsize,
}

impl MockWallet {
    pub(crate) fn usd(balance: &str) -> Arc<Self> {
        Arc::new(Self {
            balance: Mutex::new(Ok(BalanceResponse {
                balance: MonetaryAmount::from(balance),
                currency: CurrencyCode::USD,
            })),
            change: Mutex::new(Err(ApiError::Network("not scripted".into()))),
            rates: Mutex::new(Err(ApiError::Network("not scripted".into()))),
            gate: Mutex::new(None),
            balance_gate: Mutex::new(None),
            balance_calls: AtomicUsize::new(0),
            change_calls: AtomicUsize::new(0),
            rate_calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn set_balance(&self, result: Result<BalanceResponse, ApiError>) {
        *self.balance.lock().unwrap() = result;
    }

    pub(crate) fn set_change(&self, result: Result<ChangeCurrencyResponse, ApiError>) {
        *self.change.lock().unwrap() = result;
    }

    pub(crate) fn set_rates(&self, result: Result<ExchangeRatesResponse, ApiError>) {
        *self.rates.lock().unwrap() = result;
    }

    /// Currency changes block until the returned `Notify` is signalled.
    pub(crate) fn hold_changes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Balance fetches block until the returned `Notify` is signalled.
    pub(crate) fn hold_balances(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.balance_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn change_calls(&self) -> usize {
        self.change_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn rate_calls(&self) -> usize {
        self.rate_calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn confirmed(balance: &str) -> ChangeCurrencyResponse {
    ChangeCurrencyResponse {
        balance: Some(MonetaryAmount::from(balance)),
        success: Some(true),
        message: None,
    }
}

#[async_trait]
impl WalletApi for MockWallet {
    async fn fetch_balance(&self) -> Result<BalanceResponse, ApiError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.balance_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.balance.lock().unwrap().clone()
    }

    async fn change_currency(&self, _currency: CurrencyCode) -> Result<ChangeCurrencyResponse, ApiError> {
        self.change_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.change.lock().unwrap().clone()
    }

    async fn fetch_exchange_rates(&self) -> Result<ExchangeRatesResponse, ApiError> {
        self.rate_calls.fetch_add(1, Ordering::SeqCst);
        self.rates.lock().unwrap().clone()
    }
}
