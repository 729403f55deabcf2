//! Wallet routes: balance, currency switch and balance adjustment.

use axum::{extract::State, Json};
use serde::Deserialize;
use walletsync_shared::{
    AdjustBalanceRequest, BalanceResponse, BalanceUpdatePayload, ChangeCurrencyResponse, CurrencyChangedPayload,
    CurrencyCode, ExchangeRateTable, ServerMessage,
};

use crate::error::ApiProblem;
use crate::middleware::bearer::AuthUser;
use crate::state::{AppState, Wallet};

/// The currency arrives as a plain string so unsupported codes get a
/// problem response rather than a deserialization error.
#[derive(Debug, Deserialize)]
pub struct ChangeCurrencyBody {
    pub currency: String,
}

pub async fn get_balance(State(state): State<AppState>, AuthUser(username): AuthUser) -> Json<BalanceResponse> {
    let wallet = state.wallet(&username).await;
    Json(BalanceResponse {
        balance: wallet.balance(),
        currency: wallet.currency,
    })
}

/// Convert the whole balance into another currency.
pub async fn change_currency(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Json(payload): Json<ChangeCurrencyBody>,
) -> Result<Json<ChangeCurrencyResponse>, ApiProblem> {
    let target = payload
        .currency
        .parse::<CurrencyCode>()
        .map_err(|_| ApiProblem::bad_request(format!("Unsupported currency: {}", payload.currency)))?;

    let rates = state.rates.read().await.clone();
    let (old, new) = {
        let mut wallets = state.wallets.write().await;
        let wallet = wallets.entry(username.clone()).or_default();
        if wallet.currency == target {
            return Err(ApiProblem::bad_request(format!("Balance is already held in {target}")));
        }
        let minor_units = convert_minor_units(wallet, target, &rates)
            .ok_or_else(|| ApiProblem::bad_request(format!("No exchange rate available for {target}")))?;

        let old = *wallet;
        *wallet = Wallet {
            currency: target,
            minor_units,
        };
        (old, *wallet)
    };

    tracing::info!(
        "{} switched {} {} -> {} {}",
        username,
        old.balance(),
        old.currency,
        new.balance(),
        new.currency
    );

    state.push(
        &username,
        ServerMessage::CurrencyChanged(CurrencyChangedPayload {
            new_currency: new.currency,
            new_balance: new.balance(),
            old_currency: Some(old.currency),
            old_balance: Some(old.balance()),
        }),
    );

    Ok(Json(ChangeCurrencyResponse {
        balance: Some(new.balance()),
        success: Some(true),
        message: None,
    }))
}

/// Credit (positive delta) or debit (negative delta) the wallet in its
/// current currency.
pub async fn adjust_balance(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Json(payload): Json<AdjustBalanceRequest>,
) -> Result<Json<BalanceResponse>, ApiProblem> {
    let wallet = {
        let mut wallets = state.wallets.write().await;
        let wallet = wallets.entry(username.clone()).or_default();
        let delta = payload
            .delta
            .to_minor_units(wallet.currency.decimals())
            .ok_or_else(|| ApiProblem::bad_request(format!("Invalid amount: {}", payload.delta)))?;
        let minor_units = wallet
            .minor_units
            .checked_add(delta)
            .ok_or_else(|| ApiProblem::bad_request(format!("Amount out of range: {}", payload.delta)))?;
        if minor_units < 0 {
            return Err(ApiProblem::unprocessable("Insufficient funds"));
        }
        wallet.minor_units = minor_units;
        *wallet
    };

    state.push(
        &username,
        ServerMessage::BalanceUpdate(BalanceUpdatePayload {
            balance: wallet.balance(),
            currency: wallet.currency,
        }),
    );

    Ok(Json(BalanceResponse {
        balance: wallet.balance(),
        currency: wallet.currency,
    }))
}

/// Rounds to the nearest minor unit of `target`. `None` when either side
/// has no usable rate.
fn convert_minor_units(wallet: &Wallet, target: CurrencyCode, rates: &ExchangeRateTable) -> Option<i128> {
    let from_rate = rates.rate(wallet.currency)?;
    let to_rate = rates.rate(target)?;
    let amount = wallet.minor_units as f64 / 10_f64.powi(wallet.currency.decimals() as i32);
    let converted = amount / from_rate * to_rate;
    let minor = (converted * 10_f64.powi(target.decimals() as i32)).round();
    minor.is_finite().then_some(minor as i128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn converts_through_the_base() {
        let rates = ExchangeRateTable::new(CurrencyCode::USD, Utc::now())
            .with_rate(CurrencyCode::BDT, 110.0)
            .with_rate(CurrencyCode::EUR, 0.5);
        let usd = Wallet {
            currency: CurrencyCode::USD,
            minor_units: 100_000,
        };
        assert_eq!(convert_minor_units(&usd, CurrencyCode::BDT, &rates), Some(11_000_000));

        let eur = Wallet {
            currency: CurrencyCode::EUR,
            minor_units: 1_000,
        };
        assert_eq!(convert_minor_units(&eur, CurrencyCode::BDT, &rates), Some(220_000));
        assert_eq!(convert_minor_units(&eur, CurrencyCode::INR, &rates), None);
    }
}
