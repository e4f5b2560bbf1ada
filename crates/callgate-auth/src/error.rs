//! Error types for the credential refresh protocol.

use reqwest::StatusCode;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while forwarding or refreshing credentials.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The upstream API could not be reached.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The refresh endpoint could not be reached.
    #[error("Refresh request failed: {0}")]
    RefreshNetworkFailure(String),

    /// The refresh endpoint answered with a non-success status.
    #[error("Refresh rejected with status {status}")]
    RefreshRejected { status: StatusCode },

    /// The refresh endpoint answered 2xx without a usable access token.
    #[error("Refresh response did not contain an access token")]
    RefreshIncomplete,

    /// The session can no longer be refreshed; the user must sign in again.
    #[error("Session expired. Please sign in again.")]
    SessionExpired,

    /// A token could not be decoded into typed claims.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl AuthError {
    /// Whether this error means the session cannot be salvaged.
    pub fn is_session_dead(&self) -> bool {
        matches!(
            self,
            AuthError::RefreshNetworkFailure(_)
                | AuthError::RefreshRejected { .. }
                | AuthError::RefreshIncomplete
                | AuthError::SessionExpired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_failures_are_session_dead() {
        assert!(AuthError::RefreshNetworkFailure("down".into()).is_session_dead());
        assert!(
            AuthError::RefreshRejected {
                status: StatusCode::FORBIDDEN
            }
            .is_session_dead()
        );
        assert!(AuthError::RefreshIncomplete.is_session_dead());
        assert!(!AuthError::UpstreamUnavailable("down".into()).is_session_dead());
        assert!(!AuthError::MalformedToken("x".into()).is_session_dead());
    }
}
