//! Push-channel connection state, reconnect policy and outbound handle.
//!
//! The socket driver itself lives in `connection_native`.

use std::time::Duration;

use futures_channel::mpsc::UnboundedSender;
use walletsync_shared::{ClientMessage, CLOSE_NORMAL};

/// Connection state for the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect and keep-alive behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed opens (0 = infinite)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_interval: Duration,
    /// Client ping interval; kept below the server's heartbeat interval
    pub keepalive_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_interval: Duration::from_secs(3),
            keepalive_interval: Duration::from_secs(25),
        }
    }
}

/// How a session on the push channel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Normal closure or a local `disconnect()`. Never retried.
    Clean,
    /// Anything else, including failed opens and streams that end without a
    /// close frame.
    Unclean,
}

/// Classify a received close code.
pub fn classify_close(code: Option<u16>) -> CloseKind {
    match code {
        Some(CLOSE_NORMAL) => CloseKind::Clean,
        _ => CloseKind::Unclean,
    }
}

/// Reconnect bookkeeping: a single attempt counter with a fixed retry delay.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// A session opened successfully.
    pub fn on_open(&mut self) {
        self.attempt = 0;
    }

    /// Records an unclean close or failed open. Returns the delay before the
    /// next attempt, or `None` once the retry budget is spent.
    pub fn on_unclean_close(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        if self.config.max_attempts > 0 && self.attempt >= self.config.max_attempts {
            return None;
        }
        Some(self.config.retry_interval)
    }
}

/// Handle for sending messages through the push channel
#[derive(Clone)]
pub struct WsHandle {
    sender: UnboundedSender<ClientMessage>,
}

impl WsHandle {
    pub(crate) fn new(sender: UnboundedSender<ClientMessage>) -> Self {
        Self { sender }
    }

    /// Queue a message for the current (or next) session.
    pub fn send(&self, message: ClientMessage) -> Result<(), String> {
        tracing::debug!(?message, "queueing push-channel message");
        self.sender
            .unbounded_send(message)
            .map_err(|e| format!("Failed to send: {}", e))
    }

    pub fn ping(&self) -> Result<(), String> {
        self.send(ClientMessage::ping_now())
    }
}

mod connection_native;
pub use connection_native::WsConnection;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_normal_closure_is_clean() {
        assert_eq!(classify_close(Some(1000)), CloseKind::Clean);
        assert_eq!(classify_close(Some(1001)), CloseKind::Unclean);
        assert_eq!(classify_close(Some(1006)), CloseKind::Unclean);
        assert_eq!(classify_close(None), CloseKind::Unclean);
    }

    #[test]
    fn five_consecutive_failures_exhaust_the_budget() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        for expected in 1..5 {
            assert_eq!(policy.on_unclean_close(), Some(Duration::from_secs(3)));
            assert_eq!(policy.attempt(), expected);
        }
        assert_eq!(policy.on_unclean_close(), None);
        assert_eq!(policy.attempt(), 5);
    }

    #[test]
    fn successful_open_resets_the_counter() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        policy.on_unclean_close();
        policy.on_unclean_close();
        policy.on_open();
        assert_eq!(policy.attempt(), 0);
        for _ in 1..5 {
            assert!(policy.on_unclean_close().is_some());
        }
        assert!(policy.on_unclean_close().is_none());
    }

    #[test]
    fn zero_max_attempts_retries_forever() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        });
        for _ in 0..100 {
            assert!(policy.on_unclean_close().is_some());
        }
    }
}
