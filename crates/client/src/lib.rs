//! Walletsync client - realtime balance and currency synchronization
//!
//! Keeps a signed-in user's `{balance, currency}` consistent across every
//! consumer in the process, and across cooperating contexts, using a
//! WebSocket push channel with bounded reconnects, HTTP polling while the
//! push channel is down, and server-confirmed currency switches.

pub mod api_client;
pub mod auth_session;
pub mod config;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod format;
pub mod polling;
pub mod rates;
pub mod shared_channel;
pub mod storage;
pub mod stores;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;

pub use api_client::{ApiClient, WalletApi};
pub use auth_session::{AuthSession, SessionHandle};
pub use config::SyncConfig;
pub use context::{SynchronizationContext, SynchronizationContextBuilder};
pub use error::SyncError;
pub use event_bus::{EventBus, Subscription};
pub use polling::PollingFallback;
pub use rates::ExchangeRateService;
pub use shared_channel::{LocalSharedChannel, SharedChannel, SharedHub, WatchedSharedChannel};
pub use stores::{BalanceCurrencyStore, BalanceSnapshot, BalanceState, Notification};
pub use ws::{ConnectionState, TransportChannel};
