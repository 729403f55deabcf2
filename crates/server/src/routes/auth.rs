//! Authentication routes.

use axum::{extract::State, Json};
use walletsync_shared::{LoginRequest, LoginResponse};

use crate::error::ApiProblem;
use crate::state::AppState;

/// Sign in by username. Unknown users get a fresh wallet.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiProblem> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(ApiProblem::bad_request("Username is required"));
    }

    let (token, wallet) = state.sign_in(username).await;
    tracing::info!("User logged in: {}", username);

    Ok(Json(LoginResponse {
        token,
        username: username.to_string(),
        balance: wallet.balance(),
        currency: wallet.currency,
    }))
}
