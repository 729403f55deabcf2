//! Exchange rate routes.

use axum::{extract::State, Json};
use chrono::Utc;
use walletsync_shared::ExchangeRatesResponse;

use crate::state::AppState;

pub async fn exchange_rates(State(state): State<AppState>) -> Json<ExchangeRatesResponse> {
    let table = state.rates.read().await.clone();
    let age = table.age_minutes(Utc::now());

    Json(ExchangeRatesResponse {
        base: table.base,
        rates: table
            .rates
            .iter()
            .map(|(code, rate)| (code.code().to_string(), *rate))
            .collect(),
        last_updated: Some(table.fetched_at),
        age_in_minutes: Some(age as f64),
    })
}
