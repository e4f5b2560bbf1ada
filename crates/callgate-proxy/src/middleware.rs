//! Session and request-logging middleware.
//!
//! The session layer resolves the session cookie before the handler runs
//! and consumes the credential signal headers after it returns:
//!
//! - `x-refreshed-access-token` / `x-refreshed-refresh-token` are stored
//!   in the registry, and the refresh-token header is removed so it never
//!   reaches browser JavaScript
//! - `x-session-expired: true` removes the session and expires the cookie,
//!   unless another request rotated the session in the meantime; the
//!   signal is then dropped and the session kept

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, request::Parts, header::SET_COOKIE},
    middleware::Next,
    response::Response,
};
use callgate_auth::CredentialUpdate;

use crate::cookie::{expired_cookie, read_cookie};
use crate::forward::{
    REFRESHED_ACCESS_TOKEN_HEADER, REFRESHED_REFRESH_TOKEN_HEADER, SESSION_EXPIRED_HEADER,
};
use crate::registry::SessionRecord;
use crate::state::AppState;

/// Session resolved from the request cookie.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub id: String,
    pub record: SessionRecord,
}

/// Extractor for the session resolved by [`session_layer`], if any.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<ActiveSession>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<ActiveSession>().cloned()))
    }
}

/// Resolve the session cookie and apply credential signals from the response.
pub async fn session_layer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let cookie_name = &state.config.cookie.name;
    let active = match read_cookie(request.headers(), cookie_name) {
        Some(id) => state
            .sessions
            .get(&id)
            .await
            .map(|record| ActiveSession { id, record }),
        None => None,
    };
    if let Some(session) = &active {
        request.extensions_mut().insert(session.clone());
    }

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    let refreshed_refresh = headers
        .remove(REFRESHED_REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok().map(str::to_string));
    let refreshed_access = headers
        .get(REFRESHED_ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let session_expired = headers
        .get(SESSION_EXPIRED_HEADER)
        .is_some_and(|v| v.as_bytes() == b"true");

    let Some(session) = active else {
        return response;
    };

    if session_expired {
        let used = &session.record.credentials.refresh_token;
        if state.sessions.expire(&session.id, used).await {
            if let Ok(value) = HeaderValue::from_str(&expired_cookie(&state.config.cookie)) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        } else {
            // A concurrent request already rotated this session.
            response.headers_mut().remove(SESSION_EXPIRED_HEADER);
        }
        return response;
    }

    let update = CredentialUpdate {
        access_token: refreshed_access,
        refresh_token: refreshed_refresh,
    };
    if !update.is_empty() {
        state.sessions.propose(&session.id, update).await;
    }

    response
}

/// Log each request with its status and latency.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.request_logging {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}
