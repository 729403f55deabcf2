//! Client-side state stores.

pub mod balance;

pub use balance::{BalanceCurrencyStore, BalanceSnapshot, BalanceState, Notification, PendingChange};
