//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use walletsync_shared::{parse_minor_units, CurrencyCode};

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// A wallet created at startup so clients have something to sign in to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevUser {
    pub username: String,
    pub currency: CurrencyCode,
    pub minor_units: i128,
}

impl FromStr for DevUser {
    type Err = String;

    /// `username:CURRENCY:balance`, e.g. `alice:EUR:250.00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let (Some(username), Some(currency), Some(balance)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected username:CURRENCY:balance, got {s:?}"));
        };
        if username.is_empty() {
            return Err(format!("empty username in {s:?}"));
        }
        let currency = currency
            .parse::<CurrencyCode>()
            .map_err(|_| format!("unsupported currency {currency:?}"))?;
        let minor_units = parse_minor_units(balance, currency.decimals())
            .ok_or_else(|| format!("invalid balance {balance:?}"))?;
        Ok(Self {
            username: username.to_string(),
            currency,
            minor_units,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub heartbeat_interval: Duration,
    pub dev_users: Vec<DevUser>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            dev_users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `WALLETSYNC_BIND`: listen address (default: "0.0.0.0:8080")
    /// - `WALLETSYNC_HEARTBEAT_SECS`: seconds between heartbeat frames (default: 30)
    /// - `WALLETSYNC_DEV_USERS`: comma separated `username:CURRENCY:balance` seeds
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind = std::env::var("WALLETSYNC_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .unwrap_or_else(|e| {
                tracing::warn!("Invalid WALLETSYNC_BIND ({e}), using {DEFAULT_BIND}");
                defaults.bind
            });

        let heartbeat_interval = std::env::var("WALLETSYNC_HEARTBEAT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.heartbeat_interval);

        let dev_users = std::env::var("WALLETSYNC_DEV_USERS")
            .map(|v| parse_dev_users(&v))
            .unwrap_or_default();

        Self {
            bind,
            heartbeat_interval,
            dev_users,
        }
    }
}

/// Entries that fail to parse are logged and skipped.
pub fn parse_dev_users(value: &str) -> Vec<DevUser> {
    value
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| match entry.parse::<DevUser>() {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!("Skipping dev user: {e}");
                None
            }
        })
        .collect()
}
