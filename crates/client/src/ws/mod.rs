//! Push channel for realtime balance updates.
//!
//! # Architecture
//!
//! ```text
//!   TransportChannel ──spawns──▶ WsConnection driver (tokio task)
//!         │                              │
//!         │ watch<ConnectionState>       │ inbound frames
//!         ▼                              ▼
//!   PollingFallback               dispatch_frame ──▶ EventBus ──▶ BalanceCurrencyStore
//!                                        │
//!                                        └──▶ passthrough (other kinds)
//! ```
//!
//! The store never talks to the socket directly; it observes the bus and the
//! connection state.

pub mod channel;
pub mod connection;

pub use channel::TransportChannel;
pub use connection::{
    classify_close, CloseKind, ConnectionState, ReconnectConfig, ReconnectPolicy, WsConnection, WsHandle,
};
