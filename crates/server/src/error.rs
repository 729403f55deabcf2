//! Problem Details responses.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use walletsync_shared::ProblemDetails;

/// Rejection and error type for every handler.
#[derive(Debug)]
pub struct ApiProblem(pub ProblemDetails);

impl ApiProblem {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::bad_request(detail))
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::unauthorized(detail))
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::unprocessable(detail))
    }
}

impl IntoResponse for ApiProblem {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_string(&self.0).unwrap_or_default();
        (status, [(header::CONTENT_TYPE, "application/problem+json")], body).into_response()
    }
}
