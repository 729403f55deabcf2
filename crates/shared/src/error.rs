//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RFC7807 Problem Details (application/problem+json)
///
/// The wallet backend uses this as its error envelope so that clients can
/// surface a meaningful rejection reason ("insufficient funds", "unsupported
/// currency") instead of a bare status code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A URI reference that identifies the specific occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    fn with(slug: &str, title: &str, status: u16, detail: String) -> Self {
        Self {
            type_url: format!("https://walletsync.dev/problems/{slug}"),
            title: title.to_string(),
            status,
            detail: Some(detail),
            instance: None,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::with("bad-request", "Bad Request", 400, detail.into())
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::with("unauthorized", "Unauthorized", 401, detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::with("not-found", "Not Found", 404, detail.into())
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::with("unprocessable", "Unprocessable Entity", 422, detail.into())
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::with("internal-error", "Internal Server Error", 500, detail.into())
    }
}

/// Legacy wallet endpoints answer `{ "success": false, "message": "..." }`.
#[derive(Deserialize)]
struct MessageBody {
    message: String,
}

/// Attempt to parse an error body into a user-facing message.
/// Prefers the RFC7807 `detail`, then `title`, then a bare `message` field.
pub fn try_problem_detail(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ProblemDetails>(body) {
        if let Some(detail) = parsed.detail {
            if !detail.trim().is_empty() {
                return Some(detail);
            }
        }
        if !parsed.title.trim().is_empty() {
            return Some(parsed.title);
        }
    }
    serde_json::from_str::<MessageBody>(body)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.trim().is_empty())
}

/// API error type for client-side use
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// A message fit for a notification toast.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Could not reach the wallet service".to_string(),
            ApiError::Http { status, body } => {
                try_problem_detail(body).unwrap_or_else(|| format!("Request failed (HTTP {status})"))
            }
            ApiError::Deserialize(_) => "Unexpected response from the wallet service".to_string(),
        }
    }
}
