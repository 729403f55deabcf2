//! Client configuration.
//!
//! Every timing constant of the synchronization layer lives here so that
//! tests can shrink them and deployments can override them from the
//! environment.

use std::time::Duration;

use url::Url;

use crate::ws::connection::ReconnectConfig;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_WS_PATH: &str = "/ws";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RATES_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub ws_path: String,
    pub reconnect: ReconnectConfig,
    pub poll_interval: Duration,
    pub rates_refresh_interval: Duration,
    /// Upper bound on every HTTP request, including currency changes.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            reconnect: ReconnectConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            rates_refresh_interval: DEFAULT_RATES_REFRESH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `WALLETSYNC_*` environment variables. Values
    /// that are absent or fail to parse keep their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let reconnect = ReconnectConfig {
            max_attempts: env_parse("WALLETSYNC_MAX_RECONNECTS").unwrap_or(defaults.reconnect.max_attempts),
            retry_interval: env_secs("WALLETSYNC_RECONNECT_SECS").unwrap_or(defaults.reconnect.retry_interval),
            keepalive_interval: env_secs("WALLETSYNC_KEEPALIVE_SECS")
                .unwrap_or(defaults.reconnect.keepalive_interval),
        };

        Self {
            api_base_url: std::env::var("WALLETSYNC_API_URL").unwrap_or(defaults.api_base_url),
            ws_path: std::env::var("WALLETSYNC_WS_PATH").unwrap_or(defaults.ws_path),
            reconnect,
            poll_interval: env_secs("WALLETSYNC_POLL_SECS").unwrap_or(defaults.poll_interval),
            rates_refresh_interval: env_secs("WALLETSYNC_RATES_SECS")
                .unwrap_or(defaults.rates_refresh_interval),
            request_timeout: env_secs("WALLETSYNC_REQUEST_TIMEOUT_SECS").unwrap_or(defaults.request_timeout),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into();
        self
    }

    /// Push-channel URL, with the credential attached as `?token=` when one
    /// is available.
    pub fn ws_url(&self, token: Option<&str>) -> Option<Url> {
        let base = http_to_ws(self.api_base_url.trim_end_matches('/'));
        let path = self.ws_path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}")).ok()?;
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Some(url)
    }
}

/// Convert http(s) URL to ws(s) URL
pub fn http_to_ws(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let config = SyncConfig::default();
        assert_eq!(config.reconnect.keepalive_interval, Duration::from_secs(25));
        assert_eq!(config.reconnect.retry_interval, Duration::from_secs(3));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn ws_url_swaps_scheme_and_attaches_token() {
        let config = SyncConfig::default().with_base_url("https://wallet.example.com/");
        let url = config.ws_url(Some("abc def")).unwrap();
        assert_eq!(url.as_str(), "wss://wallet.example.com/ws?token=abc+def");

        let config = SyncConfig::default().with_base_url("http://localhost:9000");
        let url = config.ws_url(None).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:9000/ws");
    }

    #[test]
    fn keepalive_is_not_tied_to_the_server_heartbeat() {
        std::env::set_var("WALLETSYNC_HEARTBEAT_SECS", "30");
        std::env::set_var("WALLETSYNC_KEEPALIVE_SECS", "10");
        std::env::set_var("WALLETSYNC_REQUEST_TIMEOUT_SECS", "4");
        let config = SyncConfig::from_env();
        std::env::remove_var("WALLETSYNC_HEARTBEAT_SECS");
        std::env::remove_var("WALLETSYNC_KEEPALIVE_SECS");
        std::env::remove_var("WALLETSYNC_REQUEST_TIMEOUT_SECS");

        assert_eq!(config.reconnect.keepalive_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(4));
    }
}
