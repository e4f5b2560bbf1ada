//! Client for the gateway's `/api/bff` proxy route.
//!
//! The gateway performs refresh itself and reports the result through
//! response headers. This client reads those headers on every response:
//! rotated tokens are proposed to the injected store, and a session-expired
//! signal signs the store out and fails the call.

use callgate_auth::{CredentialUpdate, SharedSessionStore};
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::response::read_body;

/// Rotated access token header set by the gateway.
pub const REFRESHED_ACCESS_TOKEN_HEADER: &str = "x-refreshed-access-token";
/// Rotated refresh token header set by the gateway.
pub const REFRESHED_REFRESH_TOKEN_HEADER: &str = "x-refreshed-refresh-token";
/// Session-death header set by the gateway.
pub const SESSION_EXPIRED_HEADER: &str = "x-session-expired";

/// Client for the gateway proxy.
#[derive(Debug, Clone)]
pub struct BffClient {
    http: reqwest::Client,
    origin: String,
    session: Option<SharedSessionStore>,
}

impl BffClient {
    /// Create a client for the gateway at `origin`, e.g. `http://localhost:3001`.
    pub fn new(origin: impl Into<String>) -> Result<Self> {
        Self::with_http(reqwest::Client::builder().build()?, origin)
    }

    /// Create a client that reuses an existing HTTP client (and its cookies).
    pub fn with_http(http: reqwest::Client, origin: impl Into<String>) -> Result<Self> {
        let origin = origin.into();
        let parsed = url::Url::parse(&origin)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "gateway origin must be http or https, got '{}'",
                parsed.scheme()
            )));
        }
        Ok(Self {
            http,
            origin: origin.trim_end_matches('/').to_string(),
            session: None,
        })
    }

    /// Store receiving rotated credentials and sign-out signals.
    pub fn with_session(mut self, session: SharedSessionStore) -> Self {
        self.session = Some(session);
        self
    }

    /// Gateway URL for an upstream path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/bff/{}", self.origin, path.trim_start_matches('/'))
    }

    /// Send one request through the gateway. `204` and empty bodies yield `None`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self
            .http
            .request(method, self.url(path))
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let session_expired = self.apply_signals(response.headers()).await;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let details = serde_json::from_str::<serde_json::Value>(&text).ok();

            if session_expired {
                return Err(Error::SessionExpired { details });
            }
            let message = details
                .as_ref()
                .and_then(|d| d.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("Request failed")
                .to_string();
            return Err(Error::Api {
                status,
                message,
                details,
            });
        }

        read_body(response).await
    }

    /// Propose rotated tokens and handle the session-expired signal.
    ///
    /// Returns whether the session expired.
    async fn apply_signals(&self, headers: &HeaderMap) -> bool {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let update = CredentialUpdate {
            access_token: header(REFRESHED_ACCESS_TOKEN_HEADER),
            refresh_token: header(REFRESHED_REFRESH_TOKEN_HEADER),
        };
        let session_expired = header(SESSION_EXPIRED_HEADER).as_deref() == Some("true");

        if let Some(session) = &self.session {
            if !update.is_empty() {
                session.propose_rotation(update).await;
            }
            if session_expired {
                tracing::info!("Gateway reported an expired session, signing out");
                session.sign_out().await;
            }
        }

        session_expired
    }

    /// Make a GET request.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    /// Make a POST request.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Make a PATCH request.
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// Make a PUT request.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// Make a DELETE request.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request::<serde_json::Value, ()>(Method::DELETE, path, None)
            .await
            .map(|_| ())
    }
}
