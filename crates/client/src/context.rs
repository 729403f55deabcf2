//! Everything one signed-in session needs, wired together.
//!
//! A [`SynchronizationContext`] is built at login and dropped (or shut down)
//! at logout. UI consumers receive it, or the pieces they need, explicitly.

use std::sync::Arc;

use tracing::{debug, info};
use walletsync_shared::{BalanceResponse, CurrencyCode, MonetaryAmount, UpdateSource};

use crate::api_client::{ApiClient, WalletApi};
use crate::auth_session::SessionHandle;
use crate::config::SyncConfig;
use crate::event_bus::EventBus;
use crate::format::Locale;
use crate::rates::ExchangeRateService;
use crate::shared_channel::SharedChannel;
use crate::storage::{self, FileStore, KeyValueStore, MemoryStore, PREFERRED_CURRENCY_KEY};
use crate::stores::{BalanceCurrencyStore, BalanceState};
use crate::ws::TransportChannel;

pub struct SynchronizationContextBuilder {
    config: SyncConfig,
    session: SessionHandle,
    storage: Option<Arc<dyn KeyValueStore>>,
    shared: Option<Arc<dyn SharedChannel>>,
    api: Option<Arc<dyn WalletApi>>,
    profile: Option<BalanceResponse>,
    locale: Locale,
}

impl SynchronizationContextBuilder {
    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Propagate balance updates to other contexts through `channel`.
    pub fn with_shared_channel(mut self, channel: Arc<dyn SharedChannel>) -> Self {
        self.shared = Some(channel);
        self
    }

    /// Replace the HTTP client, e.g. with a test double.
    pub fn with_api(mut self, api: Arc<dyn WalletApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// The authenticated user's balance snapshot from login.
    pub fn with_profile(mut self, profile: BalanceResponse) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn build(self) -> SynchronizationContext {
        let storage: Arc<dyn KeyValueStore> = match self.storage {
            Some(storage) => storage,
            None => match FileStore::in_config_dir() {
                Some(store) => Arc::new(store),
                None => Arc::new(MemoryStore::new()),
            },
        };

        let api: Arc<dyn WalletApi> = match self.api {
            Some(api) => api,
            None => Arc::new(
                ApiClient::new()
                    .with_timeout(self.config.request_timeout)
                    .with_base_url(self.config.api_base_url.clone())
                    .with_session(self.session.clone(), storage.clone()),
            ),
        };

        let bus = match self.shared {
            Some(channel) => EventBus::with_shared_channel(channel),
            None => EventBus::new(),
        };

        let (initial, needs_reconcile) = match self.profile {
            Some(profile) => (
                BalanceState::new(profile.currency, profile.balance, UpdateSource::ServerConfirmed),
                false,
            ),
            None => {
                let currency = storage::load::<CurrencyCode>(storage.as_ref(), PREFERRED_CURRENCY_KEY)
                    .unwrap_or_default();
                debug!(%currency, "no profile snapshot; starting from preferred currency");
                (
                    BalanceState::new(currency, MonetaryAmount::zero(currency), UpdateSource::Optimistic),
                    true,
                )
            }
        };

        let store = BalanceCurrencyStore::new(
            initial,
            api.clone(),
            self.session.clone(),
            storage.clone(),
            bus.clone(),
            self.locale,
        );
        let transport = TransportChannel::new(self.config.clone(), self.session.clone(), storage.clone(), bus.clone());
        let rates = ExchangeRateService::new(api, self.config.rates_refresh_interval);

        SynchronizationContext {
            config: self.config,
            session: self.session,
            storage,
            bus,
            transport,
            store,
            rates,
            needs_reconcile,
        }
    }
}

pub struct SynchronizationContext {
    config: SyncConfig,
    session: SessionHandle,
    storage: Arc<dyn KeyValueStore>,
    bus: EventBus,
    transport: TransportChannel,
    store: BalanceCurrencyStore,
    rates: ExchangeRateService,
    needs_reconcile: bool,
}

impl SynchronizationContext {
    pub fn builder(config: SyncConfig, session: SessionHandle) -> SynchronizationContextBuilder {
        SynchronizationContextBuilder {
            config,
            session,
            storage: None,
            shared: None,
            api: None,
            profile: None,
            locale: Locale::default(),
        }
    }

    /// Connect the push channel and start polling and rate refresh. Must be
    /// called from within a tokio runtime.
    pub fn start(&self) {
        info!(user = ?self.session.username(), "starting balance synchronization");
        self.transport.connect();
        self.store
            .attach_transport(self.transport.watch_state(), self.config.poll_interval);
        self.rates.start();

        if self.needs_reconcile {
            let store = self.store.clone();
            tokio::spawn(async move {
                store.reconcile().await;
            });
        }
    }

    /// Stop every background task and close the push channel cleanly.
    pub fn shutdown(&self) {
        self.transport.disconnect();
        self.store.detach_transport();
        self.rates.stop();
    }

    /// [`shutdown`](Self::shutdown) and forget the session.
    pub fn logout(&self) {
        self.session.logout(self.storage.as_ref());
        self.shutdown();
        info!("logged out");
    }

    pub fn store(&self) -> &BalanceCurrencyStore {
        &self.store
    }

    pub fn transport(&self) -> &TransportChannel {
        &self.transport
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn rates(&self) -> &ExchangeRateService {
        &self.rates
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl Drop for SynchronizationContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
