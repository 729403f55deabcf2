//! Walletsync development server
//!
//! An in-memory wallet backend for the walletsync client: username login,
//! balance and currency-switch endpoints, exchange rates and a WebSocket
//! push channel.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Auth
        .route("/auth/login", post(routes::auth::login))
        // Wallet
        .route("/wallet/balance", get(routes::wallet::get_balance))
        .route("/wallet/change-currency", post(routes::wallet::change_currency))
        .route("/wallet/adjust", post(routes::wallet::adjust_balance))
        // Rates
        .route("/exchange-rates", get(routes::rates::exchange_rates))
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{self, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::util::ServiceExt;
    use walletsync_shared::{
        BalanceResponse, ChangeCurrencyResponse, CurrencyCode, ExchangeRateTable, ExchangeRatesResponse,
        LoginResponse, ServerMessage,
    };

    fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(app: &Router, username: &str) -> LoginResponse {
        let response = app
            .clone()
            .oneshot(post("/auth/login", None, json!({ "username": username })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await
    }

    #[tokio::test]
    async fn login_creates_a_usd_wallet() {
        let app = app(AppState::new(Duration::from_secs(30)));
        let login = login(&app, "alice").await;
        assert_eq!(login.username, "alice");
        assert_eq!(login.currency, CurrencyCode::USD);
        assert_eq!(login.balance.as_str(), "1000.00");

        let response = app.clone().oneshot(get("/wallet/balance", &login.token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let balance: BalanceResponse = read_json(response).await;
        assert_eq!(balance.balance.as_str(), "1000.00");
    }

    #[tokio::test]
    async fn balance_requires_a_known_token() {
        let app = app(AppState::new(Duration::from_secs(30)));
        let response = app.clone().oneshot(get("/wallet/balance", "nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }

    #[tokio::test]
    async fn change_currency_converts_and_pushes() {
        let state = AppState::new(Duration::from_secs(30));
        let mut pushes = state.pushes.subscribe();
        let app = app(state);
        let login = login(&app, "alice").await;

        let response = app
            .clone()
            .oneshot(post("/wallet/change-currency", Some(&login.token), json!({ "currency": "BDT" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let changed: ChangeCurrencyResponse = read_json(response).await;
        assert_eq!(changed.success, Some(true));
        assert_eq!(changed.balance.unwrap().as_str(), "110000.00");

        let push = pushes.recv().await.unwrap();
        assert_eq!(push.username, "alice");
        match push.message {
            ServerMessage::CurrencyChanged(p) => {
                assert_eq!(p.new_currency, CurrencyCode::BDT);
                assert_eq!(p.old_currency, Some(CurrencyCode::USD));
                assert_eq!(p.old_balance.unwrap().as_str(), "1000.00");
            }
            other => panic!("unexpected push: {other:?}"),
        }
    }

    #[tokio::test]
    async fn change_currency_rejects_unsupported_and_unpriced() {
        let rates = ExchangeRateTable::new(CurrencyCode::USD, chrono::Utc::now()).with_rate(CurrencyCode::EUR, 0.9);
        let app = app(AppState::with_rates(rates, Duration::from_secs(30)));
        let login = login(&app, "alice").await;

        for currency in ["XYZ", "INR", "USD"] {
            let response = app
                .clone()
                .oneshot(post("/wallet/change-currency", Some(&login.token), json!({ "currency": currency })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{currency}");
        }

        let response = app.clone().oneshot(get("/wallet/balance", &login.token)).await.unwrap();
        let balance: BalanceResponse = read_json(response).await;
        assert_eq!(balance.currency, CurrencyCode::USD);
    }

    #[tokio::test]
    async fn adjust_credits_and_refuses_overdraft() {
        let app = app(AppState::new(Duration::from_secs(30)));
        let login = login(&app, "bob").await;

        let response = app
            .clone()
            .oneshot(post("/wallet/adjust", Some(&login.token), json!({ "delta": "25.50" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let balance: BalanceResponse = read_json(response).await;
        assert_eq!(balance.balance.as_str(), "1025.50");

        let response = app
            .clone()
            .oneshot(post("/wallet/adjust", Some(&login.token), json!({ "delta": "-5000" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app
            .clone()
            .oneshot(post("/wallet/adjust", Some(&login.token), json!({ "delta": "abc" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let huge = format!("{}.{:02}", i128::MAX / 100, i128::MAX % 100);
        let response = app
            .clone()
            .oneshot(post("/wallet/adjust", Some(&login.token), json!({ "delta": huge })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.clone().oneshot(get("/wallet/balance", &login.token)).await.unwrap();
        let balance: BalanceResponse = read_json(response).await;
        assert_eq!(balance.balance.as_str(), "1025.50");
    }

    #[tokio::test]
    async fn exchange_rates_report_age() {
        let app = app(AppState::new(Duration::from_secs(30)));
        let login = login(&app, "carol").await;
        let response = app.clone().oneshot(get("/exchange-rates", &login.token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rates: ExchangeRatesResponse = read_json(response).await;
        assert_eq!(rates.base, CurrencyCode::USD);
        assert_eq!(rates.rates.get("BDT"), Some(&110.0));
        assert_eq!(rates.age_in_minutes, Some(0.0));
        assert!(rates.last_updated.is_some());
    }
}
