//! Bearer token authentication.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};

use crate::error::ApiProblem;
use crate::state::AppState;

/// The user behind a valid `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiProblem;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let app_state = AppState::from_ref(state);
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());

        async move {
            let token = token.ok_or_else(|| ApiProblem::unauthorized("Missing bearer token"))?;
            match app_state.user_for_token(&token).await {
                Some(username) => Ok(AuthUser(username)),
                None => {
                    tracing::warn!("Rejected unknown bearer token");
                    Err(ApiProblem::unauthorized("Invalid or expired token"))
                }
            }
        }
    }
}
