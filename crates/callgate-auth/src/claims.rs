//! Typed access-token claims.
//!
//! Tokens are decoded without signature verification: the upstream API is
//! the party that verifies them. Decoding only gives the gateway typed
//! access to identity and expiry.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Fallback access-token lifetime when the token carries no `exp` (14 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL_MS: u64 = 14 * 60 * 1000;

/// Administrative role carried in the `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    BusinessAdmin,
}

/// Claims read from an access token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    /// Expiry, seconds since the epoch.
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Decode the payload segment of a JWT into [`TokenClaims`].
pub fn decode_claims(token: &str) -> Result<TokenClaims> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {}", e)))?;

    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("invalid claims: {}", e)))?;

    if claims.sub.is_empty() {
        return Err(AuthError::MalformedToken("empty subject".to_string()));
    }

    Ok(claims)
}

/// Access-token expiry in epoch milliseconds.
///
/// Uses `exp` when present, otherwise `now_ms` plus
/// [`DEFAULT_ACCESS_TOKEN_TTL_MS`].
pub fn access_token_expires_at(claims: &TokenClaims, now_ms: u64) -> u64 {
    match claims.exp {
        Some(exp) => exp.saturating_mul(1000),
        None => now_ms + DEFAULT_ACCESS_TOKEN_TTL_MS,
    }
}

/// Current time in epoch milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
