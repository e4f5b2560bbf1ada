//! Refresh endpoint client.
//!
//! Exchanges a refresh token for a new access token via
//! `POST <base>/auth/refresh`. Every way the call can go wrong collapses
//! into a [`RefreshOutcome`]; callers never see a transport error directly.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialPair;
use crate::error::AuthError;
use crate::upstream::UpstreamBase;

/// Default refresh endpoint path relative to the upstream base.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// JSON key carrying the refresh token in the request body.
///
/// A backend accepts exactly one of these; the deployment picks which.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshBodyKey {
    /// `{ "refresh_token": "..." }`
    #[default]
    Snake,
    /// `{ "refreshToken": "..." }`
    Camel,
}

impl RefreshBodyKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshBodyKey::Snake => "refresh_token",
            RefreshBodyKey::Camel => "refreshToken",
        }
    }

    fn body(&self, refresh_token: &str) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(
            self.as_str().to_string(),
            serde_json::Value::String(refresh_token.to_string()),
        );
        serde_json::Value::Object(map)
    }
}

impl std::str::FromStr for RefreshBodyKey {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snake" | "refresh_token" => Ok(RefreshBodyKey::Snake),
            "camel" | "refreshtoken" => Ok(RefreshBodyKey::Camel),
            other => Err(AuthError::Config(format!(
                "Unknown refresh body key '{}'; expected 'snake' or 'camel'",
                other
            ))),
        }
    }
}

/// Why a reachable refresh endpoint did not yield new credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// Non-2xx status.
    Rejected { status: StatusCode },
    /// 2xx status but no usable access token in the payload.
    Incomplete,
}

/// Result of one refresh attempt.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Rotated(CredentialPair),
    Failed(RefreshFailure),
    NetworkError(String),
}

impl RefreshOutcome {
    /// Map a non-rotated outcome onto the error taxonomy.
    ///
    /// Returns `None` for `Rotated`.
    pub fn into_error(self) -> Option<AuthError> {
        match self {
            RefreshOutcome::Rotated(_) => None,
            RefreshOutcome::Failed(RefreshFailure::Rejected { status }) => {
                Some(AuthError::RefreshRejected { status })
            }
            RefreshOutcome::Failed(RefreshFailure::Incomplete) => {
                Some(AuthError::RefreshIncomplete)
            }
            RefreshOutcome::NetworkError(msg) => Some(AuthError::RefreshNetworkFailure(msg)),
        }
    }
}

/// Anything able to trade a refresh token for a new credential pair.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> RefreshOutcome;
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// HTTP client for the upstream refresh endpoint.
#[derive(Debug, Clone)]
pub struct RefreshClient {
    http: reqwest::Client,
    url: String,
    body_key: RefreshBodyKey,
}

impl RefreshClient {
    /// Create a client for `<base>/auth/refresh`.
    pub fn new(http: reqwest::Client, base: &UpstreamBase) -> Self {
        Self {
            http,
            url: base.endpoint(DEFAULT_REFRESH_PATH),
            body_key: RefreshBodyKey::default(),
        }
    }

    /// Override the refresh endpoint path.
    pub fn with_path(mut self, base: &UpstreamBase, path: &str) -> Self {
        self.url = base.endpoint(path);
        self
    }

    /// Set the request body key.
    pub fn with_body_key(mut self, key: RefreshBodyKey) -> Self {
        self.body_key = key;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body_key(&self) -> RefreshBodyKey {
        self.body_key
    }

    /// Call the refresh endpoint once.
    pub async fn refresh(&self, refresh_token: &str) -> RefreshOutcome {
        tracing::debug!(url = %self.url, key = self.body_key.as_str(), "Refreshing access token");

        let response = match self
            .http
            .post(&self.url)
            .json(&self.body_key.body(refresh_token))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Refresh endpoint unreachable");
                return RefreshOutcome::NetworkError(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::info!(status = %status, "Refresh rejected");
            return RefreshOutcome::Failed(RefreshFailure::Rejected { status });
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read refresh response");
                return RefreshOutcome::NetworkError(e.to_string());
            }
        };

        parse_refresh_body(&body, refresh_token)
    }
}

#[async_trait]
impl Refresher for RefreshClient {
    async fn refresh(&self, refresh_token: &str) -> RefreshOutcome {
        RefreshClient::refresh(self, refresh_token).await
    }
}

/// Interpret a 2xx refresh payload.
fn parse_refresh_body(body: &str, previous_refresh: &str) -> RefreshOutcome {
    let parsed: RefreshResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "Refresh response is not valid JSON");
            return RefreshOutcome::Failed(RefreshFailure::Incomplete);
        }
    };

    let Some(access) = parsed.access_token.filter(|t| !t.is_empty()) else {
        tracing::warn!("Refresh response has no access token");
        return RefreshOutcome::Failed(RefreshFailure::Incomplete);
    };

    let refresh = parsed
        .refresh_token
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| previous_refresh.to_string());

    RefreshOutcome::Rotated(CredentialPair::new(access, refresh))
}
