//! Direct upstream client with transparent refresh.
//!
//! Reads the access token from an injected [`SessionStore`], and on a 401
//! asks the store to refresh once before retrying once. Rotated
//! credentials are proposed back to the store before the call returns.

use std::time::Duration;

use async_trait::async_trait;
use callgate_auth::{
    AuthError, CredentialUpdate, ExchangeOutcome, SharedSessionStore, StoreRefresher, Upstream,
    UpstreamBase, orchestrate,
};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::response::{api_error, read_body};

/// Default longest pause between response reads.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Attach the session's bearer token and refresh on 401.
    pub auth: bool,
    /// Extra request headers.
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            auth: true,
            headers: HeaderMap::new(),
        }
    }
}

impl RequestOptions {
    /// Options for an unauthenticated call.
    pub fn anonymous() -> Self {
        Self {
            auth: false,
            ..Default::default()
        }
    }
}

/// Direct-fetch API client.
///
/// # Example
///
/// ```no_run
/// use callgate_auth::create_memory_session_store;
/// use callgate_client::ApiClient;
///
/// # async fn example() -> callgate_client::Result<()> {
/// let client = ApiClient::builder()
///     .base_url("https://api.example.com")
///     .session(create_memory_session_store(None))
///     .build()?;
///
/// let businesses: Option<serde_json::Value> = client.get("/businesses").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: UpstreamBase,
    session: Option<SharedSessionStore>,
}

struct ApiRequest<'a> {
    client: &'a ApiClient,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

#[async_trait]
impl Upstream for ApiRequest<'_> {
    type Response = reqwest::Response;

    async fn send(&self, access_token: Option<&str>) -> callgate_auth::Result<reqwest::Response> {
        let mut headers = self.headers.clone();
        if let Some(token) = access_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| AuthError::MalformedToken("not a valid header value".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut request = self
            .client
            .http
            .request(self.method.clone(), &self.url)
            .headers(headers);
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }

        request
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))
    }

    fn status(response: &reqwest::Response) -> StatusCode {
        response.status()
    }
}

impl ApiClient {
    /// Create a new client builder.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Send one request. `204` and empty bodies yield `None`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut headers = options.headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = ApiRequest {
            client: self,
            method,
            url: self.base.endpoint(path),
            headers,
            body: body.map(serde_json::to_vec).transpose()?,
        };

        let session = match (&self.session, options.auth) {
            (Some(session), true) => session,
            _ => {
                let response = request.send(None).await?;
                return finish(response).await;
            }
        };

        let credentials = session.current_credentials().await;
        let exchange = orchestrate(
            &request,
            &StoreRefresher(session.as_ref()),
            credentials.as_ref(),
        )
        .await?;

        if let Some(rotated) = exchange.rotated() {
            session
                .propose_rotation(CredentialUpdate::from(rotated.clone()))
                .await;
        }

        let (response, outcome) = exchange.into_parts();
        match outcome {
            ExchangeOutcome::SessionDead { cause } => {
                tracing::info!(cause = %cause, "Refresh failed, signing out");
                session.sign_out().await;
                Err(Error::SessionExpired { details: None })
            }
            ExchangeOutcome::Retried {
                still_unauthorized: true,
                ..
            } => {
                tracing::info!("Still unauthorized after refresh, signing out");
                session.sign_out().await;
                Err(Error::SessionExpired { details: None })
            }
            ExchangeOutcome::RetryUnavailable { error, .. } => Err(error.into()),
            _ => finish(response).await,
        }
    }

    /// Make a GET request.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.request::<T, ()>(Method::GET, path, None, RequestOptions::default())
            .await
    }

    /// Make a POST request.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    /// Make a PATCH request.
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(body), RequestOptions::default())
            .await
    }

    /// Make a PUT request.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    /// Make a DELETE request.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request::<serde_json::Value, ()>(
            Method::DELETE,
            path,
            None,
            RequestOptions::default(),
        )
        .await
        .map(|_| ())
    }
}

async fn finish<T: DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>> {
    if response.status().is_success() {
        read_body(response).await
    } else {
        Err(api_error(response).await)
    }
}

/// Builder for [`ApiClient`].
#[derive(Debug)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    session: Option<SharedSessionStore>,
    read_timeout: Duration,
    user_agent: Option<String>,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            session: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            user_agent: None,
        }
    }

    /// Set the upstream base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the session store supplying credentials.
    pub fn session(mut self, session: SharedSessionStore) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the longest pause allowed between response reads.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ApiClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;
        let base = UpstreamBase::parse(&base_url)?;

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("callgate-client/{}", env!("CARGO_PKG_VERSION")));
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .read_timeout(self.read_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(ApiClient {
            http,
            base,
            session: self.session,
        })
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        let result = ApiClientBuilder::new().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_rejects_relative_base() {
        let result = ApiClient::builder().base_url("/api").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = ApiClient::builder()
            .base_url("https://api.example.com/v1/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "https://api.example.com/v1");
    }
}
