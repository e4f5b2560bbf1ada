//! Transparent upstream proxy route.

use axum::{
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::Response,
};
use callgate_auth::orchestrate;

use crate::error::{ProxyError, Result};
use crate::forward::{ForwardRequest, into_response, outbound_headers, path_segments};
use crate::middleware::MaybeSession;
use crate::state::AppState;

/// Path prefix of the proxy route.
pub const BFF_PREFIX: &str = "/api/bff/";

/// Forward `/api/bff/{*path}` to the upstream API.
///
/// Attaches the session's access token and, on a 401, refreshes once and
/// retries once. Rotation and session-death are reported through signal
/// headers on the response.
pub async fn bff_handler(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ProxyError::PayloadTooLarge {
                limit: state.config.max_body_bytes,
            }
        } else {
            ProxyError::BadRequest(rejection.body_text())
        }
    })?;

    let raw_path = uri.path().strip_prefix(BFF_PREFIX).unwrap_or_default();
    let segments = path_segments(raw_path);
    let url = state.upstream().join_segments(&segments, uri.query());

    let request = ForwardRequest::new(
        state.http.clone(),
        method,
        url,
        outbound_headers(&headers, &state.config.cookie.name),
    )
    .with_body(body);

    let credentials = session.map(|s| s.record.credentials);
    let exchange = orchestrate(&request, state.refresher.as_ref(), credentials.as_ref()).await?;

    tracing::debug!(
        url = %request.url(),
        status = %exchange.response.status(),
        forwards = exchange.forwards(),
        refreshes = exchange.refreshes(),
        "Proxied request"
    );

    Ok(into_response(exchange))
}
