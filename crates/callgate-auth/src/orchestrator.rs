//! Single-retry refresh orchestration.
//!
//! One logical request moves through a fixed, forward-only state machine:
//!
//! ```text
//! Initial ──non-401──────────────────────────────▶ Done
//!    │ 401, no refresh token ───────────────────▶ Done (401 passed through)
//!    │ 401 + refresh token
//!    ▼
//! Refreshing ──rejected / incomplete / network──▶ SessionDead ─▶ Done (first 401)
//!    │ rotated
//!    ▼
//! Rotated ──retry once──────────────────────────▶ Done (second response)
//! ```
//!
//! No state is ever re-entered, so a request performs at most one refresh
//! call and at most two upstream forwards.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::credentials::CredentialPair;
use crate::error::{AuthError, Result};
use crate::refresh::{RefreshFailure, RefreshOutcome, Refresher};

/// One way of sending the same logical request upstream.
///
/// Implementations must be able to send the request more than once.
#[async_trait]
pub trait Upstream: Send + Sync {
    type Response: Send;

    /// Send the request, attaching `access_token` as a bearer token if given.
    async fn send(&self, access_token: Option<&str>) -> Result<Self::Response>;

    /// Status code of a response produced by [`Upstream::send`].
    fn status(response: &Self::Response) -> StatusCode;
}

/// How the request reached its final response.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    /// The first response is final; no refresh was attempted.
    PassedThrough,
    /// Credentials were rotated and the request was sent a second time.
    Retried {
        rotated: CredentialPair,
        /// The retried forward also answered 401.
        still_unauthorized: bool,
    },
    /// Credentials were rotated but the retried forward never reached upstream.
    /// The response is the first 401.
    RetryUnavailable {
        rotated: CredentialPair,
        error: AuthError,
    },
    /// The refresh attempt failed; the response is the first 401.
    SessionDead { cause: AuthError },
}

/// Final response of one orchestrated request plus what happened on the way.
#[derive(Debug)]
pub struct Exchange<R> {
    pub response: R,
    pub outcome: ExchangeOutcome,
    forwards: u8,
    refreshes: u8,
}

impl<R> Exchange<R> {
    /// Credentials issued by the refresh call, if one succeeded.
    pub fn rotated(&self) -> Option<&CredentialPair> {
        match &self.outcome {
            ExchangeOutcome::Retried { rotated, .. }
            | ExchangeOutcome::RetryUnavailable { rotated, .. } => Some(rotated),
            _ => None,
        }
    }

    /// Whether the session can no longer be refreshed.
    pub fn session_dead(&self) -> bool {
        matches!(self.outcome, ExchangeOutcome::SessionDead { .. })
    }

    /// Whether a retried forward still came back 401.
    pub fn retry_unauthorized(&self) -> bool {
        matches!(
            self.outcome,
            ExchangeOutcome::Retried {
                still_unauthorized: true,
                ..
            }
        )
    }

    /// Number of upstream forwards performed (1 or 2).
    pub fn forwards(&self) -> u8 {
        self.forwards
    }

    /// Number of refresh calls performed (0 or 1).
    pub fn refreshes(&self) -> u8 {
        self.refreshes
    }

    /// Split into the response and the outcome.
    pub fn into_parts(self) -> (R, ExchangeOutcome) {
        (self.response, self.outcome)
    }
}

enum State<R> {
    Initial,
    Refreshing { first: R, refresh_token: String },
    Rotated { first: R, rotated: CredentialPair },
    SessionDead { first: R, cause: AuthError },
}

/// Run one request through the refresh-and-retry-once protocol.
///
/// Fails only when the first forward cannot reach upstream.
pub async fn orchestrate<U, F>(
    upstream: &U,
    refresher: &F,
    credentials: Option<&CredentialPair>,
) -> Result<Exchange<U::Response>>
where
    U: Upstream + ?Sized,
    F: Refresher + ?Sized,
{
    let mut forwards = 0u8;
    let mut refreshes = 0u8;
    let mut state = State::Initial;

    loop {
        state = match state {
            State::Initial => {
                forwards += 1;
                let first = upstream
                    .send(credentials.and_then(CredentialPair::access))
                    .await?;

                if U::status(&first) != StatusCode::UNAUTHORIZED {
                    return Ok(Exchange {
                        response: first,
                        outcome: ExchangeOutcome::PassedThrough,
                        forwards,
                        refreshes,
                    });
                }

                match credentials.and_then(CredentialPair::refresh) {
                    Some(token) => State::Refreshing {
                        first,
                        refresh_token: token.to_string(),
                    },
                    None => {
                        tracing::debug!("Upstream returned 401 and no refresh token is available");
                        return Ok(Exchange {
                            response: first,
                            outcome: ExchangeOutcome::PassedThrough,
                            forwards,
                            refreshes,
                        });
                    }
                }
            }

            State::Refreshing {
                first,
                refresh_token,
            } => {
                refreshes += 1;
                match refresher.refresh(&refresh_token).await {
                    RefreshOutcome::Rotated(rotated) => State::Rotated { first, rotated },
                    RefreshOutcome::Failed(RefreshFailure::Rejected { status }) => {
                        State::SessionDead {
                            first,
                            cause: AuthError::RefreshRejected { status },
                        }
                    }
                    RefreshOutcome::Failed(RefreshFailure::Incomplete) => State::SessionDead {
                        first,
                        cause: AuthError::RefreshIncomplete,
                    },
                    RefreshOutcome::NetworkError(msg) => State::SessionDead {
                        first,
                        cause: AuthError::RefreshNetworkFailure(msg),
                    },
                }
            }

            State::Rotated { first, rotated } => {
                tracing::info!("Access token rotated, retrying request once");
                forwards += 1;
                return Ok(match upstream.send(Some(&rotated.access_token)).await {
                    Ok(second) => {
                        let still_unauthorized = U::status(&second) == StatusCode::UNAUTHORIZED;
                        if still_unauthorized {
                            tracing::warn!("Retried request still unauthorized");
                        }
                        Exchange {
                            response: second,
                            outcome: ExchangeOutcome::Retried {
                                rotated,
                                still_unauthorized,
                            },
                            forwards,
                            refreshes,
                        }
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "Retried request could not reach upstream");
                        Exchange {
                            response: first,
                            outcome: ExchangeOutcome::RetryUnavailable { rotated, error },
                            forwards,
                            refreshes,
                        }
                    }
                });
            }

            State::SessionDead { first, cause } => {
                tracing::warn!(cause = %cause, "Session can no longer be refreshed");
                return Ok(Exchange {
                    response: first,
                    outcome: ExchangeOutcome::SessionDead { cause },
                    forwards,
                    refreshes,
                });
            }
        };
    }
}
