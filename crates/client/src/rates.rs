//! Periodically refreshed exchange-rate table.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use walletsync_shared::{ApiError, CurrencyCode, ExchangeRateTable};

use crate::api_client::WalletApi;
use crate::format;

#[derive(Clone)]
pub struct ExchangeRateService {
    api: Arc<dyn WalletApi>,
    table: Arc<RwLock<Option<ExchangeRateTable>>>,
    refresh_interval: Duration,
    task: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl ExchangeRateService {
    pub fn new(api: Arc<dyn WalletApi>, refresh_interval: Duration) -> Self {
        Self {
            api,
            table: Arc::new(RwLock::new(None)),
            refresh_interval,
            task: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Fetch the table once. On failure the previous table is kept.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let response = self.api.fetch_exchange_rates().await?;
        let fetched_at = response
            .age_in_minutes
            .filter(|m| m.is_finite() && *m >= 0.0)
            .and_then(|m| chrono::Duration::try_seconds((m * 60.0) as i64))
            .map(|age| Utc::now() - age)
            .or(response.last_updated)
            .unwrap_or_else(Utc::now);
        let table = ExchangeRateTable::from_response(response, fetched_at);
        debug!(base = %table.base, rates = table.rates.len(), "exchange rates refreshed");
        *self.table.write().await = Some(table);
        Ok(())
    }

    /// Refresh now and then every refresh interval until [`stop`](Self::stop).
    pub fn start(&self) {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let service = self.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = service.refresh().await {
                    warn!(error = %e, "exchange rate refresh failed; keeping previous table");
                }
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }
    }

    pub async fn table(&self) -> Option<ExchangeRateTable> {
        self.table.read().await.clone()
    }

    /// Minutes since the cached table was fetched.
    pub async fn age_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.table.read().await.as_ref().map(|t| t.age_minutes(now))
    }

    /// No table yet, or it has missed at least one refresh.
    pub async fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let limit = (self.refresh_interval * 2).as_secs() as i64;
        match self.table.read().await.as_ref() {
            Some(table) => (now - table.fetched_at).num_seconds() > limit,
            None => true,
        }
    }

    pub async fn convert(&self, amount: f64, from: CurrencyCode, to: CurrencyCode) -> Option<f64> {
        if from == to {
            return Some(amount);
        }
        let table = self.table.read().await;
        format::convert(amount, from, to, table.as_ref()?)
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockWallet;
    use std::collections::HashMap;
    use walletsync_shared::ExchangeRatesResponse;

    fn rates_response() -> ExchangeRatesResponse {
        ExchangeRatesResponse {
            base: CurrencyCode::USD,
            rates: HashMap::from([("BDT".to_string(), 110.0), ("ZZZ".to_string(), 1.0)]),
            last_updated: None,
            age_in_minutes: Some(3.0),
        }
    }

    #[tokio::test]
    async fn refresh_populates_table_and_age() {
        let api = MockWallet::usd("100.00");
        api.set_rates(Ok(rates_response()));
        let service = ExchangeRateService::new(api.clone(), Duration::from_secs(300));

        assert!(service.is_stale(Utc::now()).await);
        assert_eq!(service.convert(1.0, CurrencyCode::USD, CurrencyCode::USD).await, Some(1.0));
        assert_eq!(service.convert(1.0, CurrencyCode::USD, CurrencyCode::BDT).await, None);

        service.refresh().await.unwrap();
        let table = service.table().await.unwrap();
        assert_eq!(table.rates.len(), 1);
        assert_eq!(service.age_minutes(Utc::now()).await, Some(3));
        assert!(!service.is_stale(Utc::now()).await);
        assert_eq!(service.convert(2.0, CurrencyCode::USD, CurrencyCode::BDT).await, Some(220.0));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_table() {
        let api = MockWallet::usd("100.00");
        api.set_rates(Ok(rates_response()));
        let service = ExchangeRateService::new(api.clone(), Duration::from_secs(300));
        service.refresh().await.unwrap();

        api.set_rates(Err(ApiError::Network("down".into())));
        assert!(service.refresh().await.is_err());
        assert!(service.table().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_runs_until_stopped() {
        let api = MockWallet::usd("100.00");
        api.set_rates(Ok(rates_response()));
        let service = ExchangeRateService::new(api.clone(), Duration::from_secs(300));

        service.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.rate_calls(), 1);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(api.rate_calls(), 3);

        service.stop();
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(api.rate_calls(), 3);
    }
}
