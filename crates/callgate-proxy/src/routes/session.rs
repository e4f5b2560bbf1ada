//! Login, logout and session introspection.

use axum::{
    Json,
    extract::State,
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use callgate_auth::{CredentialPair, decode_claims};
use serde::{Deserialize, Serialize};

use crate::cookie::{expired_cookie, parse_remember, session_cookie};
use crate::error::{ProxyError, Result};
use crate::middleware::MaybeSession;
use crate::registry::{SessionRecord, SessionUser};
use crate::state::AppState;

/// Sign-in form.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Boolean or checkbox-style string.
    #[serde(default)]
    pub remember_me: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct UpstreamTokens {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
}

/// Current session as seen by the browser.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: SessionUser,
    /// Access-token expiry in epoch milliseconds.
    pub access_token_expires: u64,
}

impl From<&SessionRecord> for SessionResponse {
    fn from(record: &SessionRecord) -> Self {
        Self {
            user: record.user.clone(),
            access_token_expires: record.access_token_expires,
        }
    }
}

/// `POST /api/session/login`
///
/// Exchanges email and password for upstream tokens, stores them in a new
/// server-side session and hands the browser only the session cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ProxyError::BadRequest(
            "email and password are required".to_string(),
        ));
    }
    let remember = parse_remember(&req.remember_me);

    let response = state
        .http
        .post(state.config.login_url())
        .json(&serde_json::json!({
            "email": req.email,
            "password": req.password,
            "rememberMe": remember,
        }))
        .send()
        .await
        .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;

    if !response.status().is_success() {
        tracing::info!(status = %response.status(), "Login rejected by upstream");
        return Err(ProxyError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let tokens: UpstreamTokens = response
        .json()
        .await
        .map_err(|e| ProxyError::BadGateway(format!("Invalid login response: {}", e)))?;
    if tokens.access_token.is_empty() {
        return Err(ProxyError::BadGateway(
            "Login response did not contain an access token".to_string(),
        ));
    }

    let claims = decode_claims(&tokens.access_token)?;
    let record = SessionRecord::new(
        CredentialPair::new(tokens.access_token, tokens.refresh_token),
        &claims,
        remember,
    );
    let body = SessionResponse::from(&record);
    let id = state.sessions.create(record).await;

    let cookie = HeaderValue::from_str(&session_cookie(&state.config.cookie, &id, remember))
        .map_err(|e| ProxyError::Internal(format!("Invalid session cookie: {}", e)))?;

    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}

/// `POST /api/session/logout`
pub async fn logout_handler(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Result<Response> {
    if let Some(session) = session {
        state.sessions.revoke(&session.id).await;
    }

    let cookie = HeaderValue::from_str(&expired_cookie(&state.config.cookie))
        .map_err(|e| ProxyError::Internal(format!("Invalid session cookie: {}", e)))?;

    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response())
}

/// `GET /api/session`
pub async fn session_handler(MaybeSession(session): MaybeSession) -> Result<Json<SessionResponse>> {
    let session = session.ok_or_else(|| ProxyError::Unauthorized("No active session".to_string()))?;
    Ok(Json(SessionResponse::from(&session.record)))
}
