//! Upstream request forwarding.
//!
//! Turns an inbound request into an upstream request and an upstream
//! response into an outbound response. Only a fixed allow-list of
//! response headers crosses back to the browser.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{
    HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    header::{
        ACCEPT_ENCODING, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, COOKIE, HOST,
        TRANSFER_ENCODING,
    },
};
use axum::response::Response;
use callgate_auth::{AuthError, Exchange, Upstream};
use futures::StreamExt;

use crate::cookie::without_cookie;

/// Rotated access token issued during this request.
pub const REFRESHED_ACCESS_TOKEN_HEADER: &str = "x-refreshed-access-token";
/// Rotated refresh token issued during this request.
pub const REFRESHED_REFRESH_TOKEN_HEADER: &str = "x-refreshed-refresh-token";
/// Set to `true` when the session can no longer be refreshed.
pub const SESSION_EXPIRED_HEADER: &str = "x-session-expired";

/// Upstream response headers passed through to the caller.
pub const RESPONSE_HEADER_ALLOW_LIST: &[&str] = &[
    "content-type",
    "content-length",
    "content-disposition",
    "etag",
    "last-modified",
    "cache-control",
    "pragma",
    "expires",
    "accept-ranges",
    "vary",
    "x-powered-by",
];

/// Inbound headers never forwarded upstream.
///
/// `accept-encoding` is dropped because `content-encoding` is not on the
/// response allow-list.
fn stripped_request_headers() -> [HeaderName; 5] {
    [HOST, CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION, ACCEPT_ENCODING]
}

/// Decode a raw wildcard path into segments.
///
/// Segments are percent-decoded so they can be re-encoded one by one;
/// an encoded `/` inside a segment stays inside that segment.
pub fn path_segments(raw: &str) -> Vec<String> {
    raw.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect()
}

/// Headers for the upstream request.
///
/// The gateway's own session cookie is removed from `Cookie`.
pub fn outbound_headers(inbound: &HeaderMap, session_cookie: &str) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in stripped_request_headers() {
        headers.remove(name);
    }

    let cookies: Vec<String> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| without_cookie(v, session_cookie))
        .collect();
    headers.remove(COOKIE);
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(COOKIE, value);
        }
    }

    headers
}

/// Keep only allow-listed upstream response headers.
pub fn filter_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in upstream {
        if RESPONSE_HEADER_ALLOW_LIST.contains(&name.as_str()) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// One inbound request, ready to be sent upstream any number of times.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    http: reqwest::Client,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl ForwardRequest {
    pub fn new(http: reqwest::Client, method: Method, url: String, headers: HeaderMap) -> Self {
        Self {
            http,
            method,
            url,
            headers,
            body: None,
        }
    }

    /// Attach a body. Ignored for `GET` and `HEAD`.
    pub fn with_body(mut self, body: Bytes) -> Self {
        if !matches!(self.method, Method::GET | Method::HEAD) {
            self.body = Some(body);
        }
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Upstream for ForwardRequest {
    type Response = reqwest::Response;

    async fn send(&self, access_token: Option<&str>) -> callgate_auth::Result<reqwest::Response> {
        let mut headers = self.headers.clone();
        if let Some(token) = access_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| AuthError::MalformedToken("not a valid header value".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut request = self
            .http
            .request(self.method.clone(), &self.url)
            .headers(headers);
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }

        tracing::debug!(method = %self.method, url = %self.url, "Forwarding upstream");
        request
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))
    }

    fn status(response: &reqwest::Response) -> StatusCode {
        response.status()
    }
}

/// Build the outbound response for a finished exchange.
///
/// The body streams straight from upstream. Signal headers are added on
/// top of the filtered upstream headers, each at most once.
pub fn into_response(exchange: Exchange<reqwest::Response>) -> Response {
    let rotated = exchange.rotated().cloned();
    let session_dead = exchange.session_dead();
    let (upstream, _) = exchange.into_parts();

    let status = upstream.status();
    let mut headers = filter_response_headers(upstream.headers());

    if let Some(pair) = rotated {
        if let Ok(value) = HeaderValue::from_str(&pair.access_token) {
            headers.insert(REFRESHED_ACCESS_TOKEN_HEADER, value);
        }
        if let Some(refresh) = pair.refresh()
            && let Ok(value) = HeaderValue::from_str(refresh)
        {
            headers.insert(REFRESHED_REFRESH_TOKEN_HEADER, value);
        }
    }
    if session_dead && status == StatusCode::UNAUTHORIZED {
        headers.insert(SESSION_EXPIRED_HEADER, HeaderValue::from_static("true"));
    }

    let stream = upstream
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
