//! HTTP API client for the wallet backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use walletsync_shared::{
    ApiError, BalanceResponse, ChangeCurrencyRequest, ChangeCurrencyResponse, CurrencyCode,
    ExchangeRatesResponse, LoginRequest, LoginResponse,
};

use crate::auth_session::SessionHandle;
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::storage::KeyValueStore;

/// The wallet endpoints the synchronization core depends on.
#[async_trait]
pub trait WalletApi: Send + Sync {
    /// `GET /wallet/balance`
    async fn fetch_balance(&self) -> Result<BalanceResponse, ApiError>;
    /// `POST /wallet/change-currency`
    async fn change_currency(&self, currency: CurrencyCode) -> Result<ChangeCurrencyResponse, ApiError>;
    /// `GET /exchange-rates`
    async fn fetch_exchange_rates(&self) -> Result<ExchangeRatesResponse, ApiError>;
}

/// HTTP client for the wallet backend. Requests carry
/// `Authorization: Bearer <token>` whenever the session resolves a token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Option<SessionHandle>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl ApiClient {
    /// Create a new API client. Every request fails after
    /// [`DEFAULT_REQUEST_TIMEOUT`] unless overridden with
    /// [`with_timeout`](Self::with_timeout).
    pub fn new() -> Self {
        Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            base_url: String::new(),
            session: None,
            store: None,
        }
    }

    /// Bound every request (connect, send and body read) by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach the session used to resolve the bearer token per request.
    pub fn with_session(mut self, session: SessionHandle, store: Arc<dyn KeyValueStore>) -> Self {
        self.session = Some(session);
        self.store = Some(store);
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn token(&self) -> Option<String> {
        let session = self.session.as_ref()?;
        let store = self.store.as_deref()?;
        session.resolve_token(store)
    }

    fn authorize(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token() {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Make an authorized GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.get(self.url(path)));

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Make an authorized POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let body_bytes = serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;

        let resp = self
            .authorize(self.client.post(self.url(path)))
            .body(body_bytes)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp.text().await.map_err(|e| ApiError::Network(e.to_string()))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }

    /// `POST /auth/login`. Does not touch the session; the caller decides
    /// whether to persist the result.
    pub async fn login(&self, username: &str) -> Result<LoginResponse, ApiError> {
        self.post_json(
            "/auth/login",
            &LoginRequest {
                username: username.to_string(),
            },
        )
        .await
    }
}

fn http_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to build HTTP client with timeout; using defaults");
        Client::new()
    })
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletApi for ApiClient {
    async fn fetch_balance(&self) -> Result<BalanceResponse, ApiError> {
        self.get_json("/wallet/balance").await
    }

    async fn change_currency(&self, currency: CurrencyCode) -> Result<ChangeCurrencyResponse, ApiError> {
        self.post_json("/wallet/change-currency", &ChangeCurrencyRequest { currency })
            .await
    }

    async fn fetch_exchange_rates(&self) -> Result<ExchangeRatesResponse, ApiError> {
        self.get_json("/exchange-rates").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let client = ApiClient::new().with_base_url("http://localhost:8080/");
        assert_eq!(client.url("/wallet/balance"), "http://localhost:8080/wallet/balance");
        assert_eq!(client.url("wallet/balance"), "http://localhost:8080/wallet/balance");
        assert_eq!(client.url("https://other/x"), "https://other/x");
        assert_eq!(ApiClient::new().url("x"), "/x");
    }
}
