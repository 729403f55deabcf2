//! The authoritative client-side balance and currency.
//!
//! Inbound updates (push, poll, other contexts) and user-initiated currency
//! changes are the only writers. Observers read snapshots through
//! [`BalanceCurrencyStore::watch`].

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use walletsync_shared::{
    ApiError, BalanceUpdate, ChangeCurrencyResponse, CurrencyCode, MonetaryAmount, UpdateSource,
};

use crate::api_client::WalletApi;
use crate::auth_session::SessionHandle;
use crate::error::SyncError;
use crate::event_bus::{EventBus, Subscription};
use crate::format::{format_with_locale, Locale};
use crate::polling::PollingFallback;
use crate::storage::{self, KeyValueStore, PREFERRED_CURRENCY_KEY};
use crate::ws::ConnectionState;

const NOTIFICATION_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceState {
    pub currency: CurrencyCode,
    pub balance: MonetaryAmount,
    pub last_updated_at: DateTime<Utc>,
    pub last_update_source: UpdateSource,
}

impl BalanceState {
    pub fn new(currency: CurrencyCode, balance: MonetaryAmount, source: UpdateSource) -> Self {
        Self {
            currency,
            balance,
            last_updated_at: Utc::now(),
            last_update_source: source,
        }
    }

    fn from_update(update: &BalanceUpdate) -> Self {
        Self {
            currency: update.currency,
            balance: update.balance.clone(),
            last_updated_at: update.timestamp,
            last_update_source: update.source,
        }
    }
}

/// An in-flight currency switch.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub requested_currency: CurrencyCode,
    pub previous_state: BalanceState,
    pub requested_at: DateTime<Utc>,
}

/// What UI observers render.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshot {
    pub state: BalanceState,
    pub formatted_balance: String,
    pub is_changing: bool,
}

/// User-facing notices raised by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    CurrencyChangeFailed { requested: CurrencyCode, message: String },
}

struct Guarded {
    state: BalanceState,
    pending: Option<PendingChange>,
    /// Latest cross-currency inbound update seen while a change was pending.
    deferred: Option<BalanceUpdate>,
}

struct StoreInner {
    api: Arc<dyn WalletApi>,
    session: SessionHandle,
    storage: Arc<dyn KeyValueStore>,
    bus: EventBus,
    locale: Locale,
    guarded: Mutex<Guarded>,
    snapshots: watch::Sender<BalanceSnapshot>,
    notifications: broadcast::Sender<Notification>,
    subscription: Mutex<Option<Subscription>>,
    polling: Mutex<Option<PollingFallback>>,
}

#[derive(Clone)]
pub struct BalanceCurrencyStore {
    inner: Arc<StoreInner>,
}

impl BalanceCurrencyStore {
    /// Create the store with `initial` state and subscribe it to `bus`.
    pub fn new(
        initial: BalanceState,
        api: Arc<dyn WalletApi>,
        session: SessionHandle,
        storage: Arc<dyn KeyValueStore>,
        bus: EventBus,
        locale: Locale,
    ) -> Self {
        let snapshot = BalanceSnapshot {
            formatted_balance: format_with_locale(initial.balance.as_str(), initial.currency, locale),
            state: initial.clone(),
            is_changing: false,
        };
        let (snapshots, _) = watch::channel(snapshot);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let inner = Arc::new(StoreInner {
            api,
            session,
            storage,
            bus: bus.clone(),
            locale,
            guarded: Mutex::new(Guarded {
                state: initial,
                pending: None,
                deferred: None,
            }),
            snapshots,
            notifications,
            subscription: Mutex::new(None),
            polling: Mutex::new(None),
        });

        let weak: Weak<StoreInner> = Arc::downgrade(&inner);
        let subscription = bus.subscribe(move |update| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_update(update.clone());
            }
        });
        *lock(&inner.subscription) = Some(subscription);

        Self { inner }
    }

    pub fn get_state(&self) -> BalanceState {
        self.inner.guarded().state.clone()
    }

    /// Recomputed from the current state on every call.
    pub fn formatted_balance(&self) -> String {
        let state = self.get_state();
        format_with_locale(state.balance.as_str(), state.currency, self.inner.locale)
    }

    pub fn is_changing(&self) -> bool {
        self.inner.guarded().pending.is_some()
    }

    pub fn pending_change(&self) -> Option<PendingChange> {
        self.inner.guarded().pending.clone()
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<BalanceSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    /// Switch the active currency through the server.
    ///
    /// Resolves immediately when `target` is already active. The state is only
    /// replaced by a server-confirmed result; on failure it is left as it was
    /// and an authoritative fetch is attempted.
    pub async fn change_currency(&self, target: CurrencyCode) -> Result<(), SyncError> {
        let inner = &self.inner;
        let previous = {
            let mut guarded = inner.guarded();
            // A pending switch may still move away from the active currency.
            if guarded.pending.is_some() {
                return Err(SyncError::Busy);
            }
            if guarded.state.currency == target {
                return Ok(());
            }
            if !inner.session.is_authenticated() {
                return Err(SyncError::Unauthenticated);
            }

            storage::save(inner.storage.as_ref(), PREFERRED_CURRENCY_KEY, &target);
            guarded.pending = Some(PendingChange {
                requested_currency: target,
                previous_state: guarded.state.clone(),
                requested_at: Utc::now(),
            });
            inner.publish_snapshot(&guarded);
            guarded.state.clone()
        };

        info!(from = %previous.currency, to = %target, "requesting currency change");
        let outcome = confirmed_balance(inner.api.change_currency(target).await);

        match outcome {
            Ok(balance) => {
                let update = BalanceUpdate::new(balance, target, UpdateSource::ServerConfirmed)
                    .with_previous(previous.currency, previous.balance.clone());
                {
                    let mut guarded = inner.guarded();
                    guarded.state = BalanceState::from_update(&update);
                    guarded.pending = None;
                    guarded.deferred = None;
                    inner.publish_snapshot(&guarded);
                }
                info!(currency = %target, balance = %update.balance, "currency change confirmed");
                inner.bus.publish(update);
                Ok(())
            }
            Err(message) => {
                warn!(requested = %target, %message, "currency change failed");
                let deferred = {
                    let mut guarded = inner.guarded();
                    guarded.pending = None;
                    inner.publish_snapshot(&guarded);
                    guarded.deferred.take()
                };
                storage::save(inner.storage.as_ref(), PREFERRED_CURRENCY_KEY, &previous.currency);

                if !self.reconcile().await {
                    if let Some(update) = deferred {
                        inner.apply_update(update);
                    }
                }

                let _ = inner.notifications.send(Notification::CurrencyChangeFailed {
                    requested: target,
                    message: message.clone(),
                });
                Err(SyncError::Rejected { message })
            }
        }
    }

    /// Apply an inbound update from push, poll, or another context.
    pub fn apply_update(&self, update: BalanceUpdate) {
        self.inner.apply_update(update);
    }

    /// Best-effort fetch of the authoritative balance. Returns whether it
    /// succeeded.
    pub async fn reconcile(&self) -> bool {
        match self.inner.api.fetch_balance().await {
            Ok(response) => {
                self.inner
                    .apply_update(BalanceUpdate::from_balance(response, UpdateSource::Poll));
                true
            }
            Err(e) => {
                warn!(error = %e, "reconciling balance fetch failed");
                false
            }
        }
    }

    /// Start the owned polling fallback against `state`.
    pub fn attach_transport(&self, state: watch::Receiver<ConnectionState>, interval: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let poller = PollingFallback::spawn(self.inner.api.clone(), state, interval, move |response| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_update(BalanceUpdate::from_balance(response, UpdateSource::Poll));
            }
        });
        *lock(&self.inner.polling) = Some(poller);
    }

    pub fn detach_transport(&self) {
        lock(&self.inner.polling).take();
    }
}

impl StoreInner {
    fn guarded(&self) -> MutexGuard<'_, Guarded> {
        lock(&self.guarded)
    }

    fn publish_snapshot(&self, guarded: &Guarded) {
        self.snapshots.send_replace(BalanceSnapshot {
            formatted_balance: format_with_locale(
                guarded.state.balance.as_str(),
                guarded.state.currency,
                self.locale,
            ),
            state: guarded.state.clone(),
            is_changing: guarded.pending.is_some(),
        });
    }

    fn apply_update(&self, update: BalanceUpdate) {
        if !update.balance.is_numeric() {
            warn!(balance = %update.balance, source = ?update.source, "ignoring non-numeric balance update");
            return;
        }

        let mut guarded = self.guarded();
        if update.currency == guarded.state.currency {
            guarded.state.balance = update.balance;
            guarded.state.last_updated_at = update.timestamp;
            guarded.state.last_update_source = update.source;
        } else if guarded.pending.is_some() {
            debug!(
                currency = %update.currency,
                source = ?update.source,
                "holding cross-currency update until the pending change resolves"
            );
            guarded.deferred = Some(update);
            return;
        } else {
            info!(from = %guarded.state.currency, to = %update.currency, source = ?update.source, "currency changed externally");
            guarded.state = BalanceState::from_update(&update);
        }
        self.publish_snapshot(&guarded);
    }
}

/// The confirmed balance, or a user-facing reason the change failed.
fn confirmed_balance(result: Result<ChangeCurrencyResponse, ApiError>) -> Result<MonetaryAmount, String> {
    let response = result.map_err(|e| e.user_message())?;
    if response.success == Some(false) {
        return Err(response
            .message
            .unwrap_or_else(|| "Currency change was rejected".to_string()));
    }
    match response.balance {
        Some(balance) if balance.is_numeric() => Ok(balance),
        _ => Err("Unexpected response from the wallet service".to_string()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
