//! Error types that cross the HTTP boundary, plus the LLM failures that
//! never do.

use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

use crate::rate_limit::Decision;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Caller exhausted its quota; recoverable after `decision.reset`.
    #[error("Too many requests")]
    RateLimited {
        decision: Decision,
        retry_after_secs: u64,
    },

    /// A required secret is not configured. The message stays generic.
    #[error("Server misconfigured")]
    Misconfigured,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Missing or invalid field: {field}")]
    InvalidInput { field: &'static str },

    #[error("Invalid JSON payload")]
    InvalidJson,

    #[error("Internal server error")]
    Internal(String),
}

impl GatewayError {
    pub fn rate_limited(decision: Decision, now_ms: u64) -> Self {
        GatewayError::RateLimited {
            decision,
            retry_after_secs: decision.retry_after_secs(now_ms),
        }
    }

    pub fn invalid_input(field: &'static str) -> Self {
        GatewayError::InvalidInput { field }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Misconfigured | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidInput { .. } | GatewayError::InvalidJson => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        if let GatewayError::RateLimited {
            decision,
            retry_after_secs,
        } = &self
        {
            let pairs = [
                ("retry-after", retry_after_secs.to_string()),
                ("x-ratelimit-limit", decision.limit.to_string()),
                ("x-ratelimit-remaining", decision.remaining.to_string()),
                ("x-ratelimit-reset", decision.reset.to_string()),
            ];
            for (name, value) in pairs {
                if let Ok(value) = HeaderValue::from_str(&value) {
                    headers.insert(name, value);
                }
            }
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), headers, body).into_response()
    }
}

/// Why an LLM call could not be used. Always recovered locally by a
/// fallback answer.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("no LLM credentials configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("response contained no text")]
    EmptyResponse,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("schema mismatch: {0}")]
    Schema(String),
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Malformed(err.to_string())
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
