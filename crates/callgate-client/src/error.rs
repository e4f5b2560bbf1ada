//! Client error types.

use callgate_auth::AuthError;
use thiserror::Error;

/// Code for a dead session; the caller should send the user to sign in.
pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
/// Code for any other non-success response.
pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Upstream answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// `message` from a JSON body, the JSON text, or the plain body.
        message: String,
        /// Parsed JSON error body, when there was one.
        details: Option<serde_json::Value>,
    },

    /// The session is dead and has been signed out.
    #[error("Session expired. Please sign in again.")]
    SessionExpired {
        /// Parsed JSON error body, when there was one.
        details: Option<serde_json::Value>,
    },

    /// Upstream could not be reached.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::SessionExpired { .. } => SESSION_EXPIRED,
            Error::Api { .. } => REQUEST_FAILED,
            Error::Http(_) | Error::Unavailable(_) => "NETWORK_ERROR",
            Error::Json(_) => "INVALID_RESPONSE",
            Error::InvalidUrl(_) | Error::Config(_) => "CONFIG_ERROR",
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::SessionExpired { .. } => Some(401),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if the session has expired.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired { .. })
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::UpstreamUnavailable(msg) => Error::Unavailable(msg),
            AuthError::Config(msg) => Error::Config(msg),
            e if e.is_session_dead() => Error::SessionExpired { details: None },
            other => Error::Config(other.to_string()),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
