//! Error types for the proxy.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use callgate_auth::AuthError;
use callgate_config::ConfigError;
use serde::Serialize;
use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The upstream API could not be reached.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream answered in a way the gateway cannot use.
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Request body exceeded the configured limit.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No usable session.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for ProxyError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::UpstreamUnavailable(msg) => ProxyError::UpstreamUnavailable(msg),
            AuthError::MalformedToken(msg) => {
                ProxyError::BadGateway(format!("upstream issued a malformed token: {}", msg))
            }
            AuthError::SessionExpired => ProxyError::Unauthorized(e.to_string()),
            AuthError::Config(msg) => ProxyError::Config(msg),
            other => ProxyError::BadGateway(other.to_string()),
        }
    }
}

impl From<ConfigError> for ProxyError {
    fn from(e: ConfigError) -> Self {
        ProxyError::Config(e.to_string())
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ProxyError {
    /// HTTP status and stable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ProxyError::UpstreamUnavailable(_) => (StatusCode::BAD_GATEWAY, "upstream_unavailable"),
            ProxyError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
            ProxyError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            ProxyError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ProxyError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ProxyError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            ProxyError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Proxy error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
