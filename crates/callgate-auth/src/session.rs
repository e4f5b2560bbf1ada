//! Session store abstraction.
//!
//! The store owns the long-lived credential pair. Request-level code reads
//! the current pair, asks the store to refresh, and proposes rotated
//! credentials back; it never mutates stored credentials in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::RwLock;

use crate::credentials::{CredentialPair, CredentialUpdate};
use crate::error::{AuthError, Result};
use crate::refresh::{RefreshClient, RefreshFailure, RefreshOutcome, Refresher};

// ============================================================================
// SessionStore Trait
// ============================================================================

/// Owner of one login session's credentials.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// The current credential pair, or `None` when signed out.
    async fn current_credentials(&self) -> Option<CredentialPair>;

    /// Obtain freshly issued credentials.
    ///
    /// Does not store them; callers propose them via
    /// [`SessionStore::propose_rotation`]. Fails when the session is dead.
    async fn force_refresh(&self) -> Result<CredentialPair>;

    /// Propose rotated credentials. The store decides how to merge them.
    async fn propose_rotation(&self, update: CredentialUpdate);

    /// End the session.
    async fn sign_out(&self);
}

/// Shared session store for use across async contexts.
pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Adapts a [`SessionStore`] to the [`Refresher`] seam of the orchestrator.
///
/// The refresh token argument is ignored; the store refreshes its own pair.
pub struct StoreRefresher<'a>(pub &'a dyn SessionStore);

#[async_trait]
impl Refresher for StoreRefresher<'_> {
    async fn refresh(&self, _refresh_token: &str) -> RefreshOutcome {
        match self.0.force_refresh().await {
            Ok(pair) if pair.access().is_some() => RefreshOutcome::Rotated(pair),
            Ok(_) | Err(AuthError::RefreshIncomplete) => {
                RefreshOutcome::Failed(RefreshFailure::Incomplete)
            }
            Err(AuthError::RefreshRejected { status }) => {
                RefreshOutcome::Failed(RefreshFailure::Rejected { status })
            }
            Err(AuthError::RefreshNetworkFailure(msg)) => RefreshOutcome::NetworkError(msg),
            Err(e) => {
                tracing::debug!(error = %e, "Session store refused to refresh");
                RefreshOutcome::Failed(RefreshFailure::Rejected {
                    status: StatusCode::UNAUTHORIZED,
                })
            }
        }
    }
}

// ============================================================================
// InMemorySessionStore
// ============================================================================

/// Session store holding credentials in memory.
///
/// Refreshes through an optional [`RefreshClient`]; without one every
/// refresh fails with `SessionExpired`.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    credentials: RwLock<Option<CredentialPair>>,
    refresher: Option<RefreshClient>,
    refresh_count: AtomicU32,
    rotation_count: AtomicU32,
    sign_out_count: AtomicU32,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: CredentialPair) -> Self {
        Self {
            credentials: RwLock::new(Some(credentials)),
            ..Default::default()
        }
    }

    /// Use `client` for [`SessionStore::force_refresh`].
    pub fn with_refresh_client(mut self, client: RefreshClient) -> Self {
        self.refresher = Some(client);
        self
    }

    /// Replace the stored credentials (e.g. after login).
    pub async fn set_credentials(&self, credentials: CredentialPair) {
        *self.credentials.write().await = Some(credentials);
    }

    pub fn refresh_count(&self) -> u32 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    pub fn rotation_count(&self) -> u32 {
        self.rotation_count.load(Ordering::SeqCst)
    }

    pub fn sign_out_count(&self) -> u32 {
        self.sign_out_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn current_credentials(&self) -> Option<CredentialPair> {
        self.credentials.read().await.clone()
    }

    async fn force_refresh(&self) -> Result<CredentialPair> {
        let refresh_token = {
            let guard = self.credentials.read().await;
            guard
                .as_ref()
                .and_then(|c| c.refresh().map(str::to_string))
                .ok_or(AuthError::SessionExpired)?
        };

        let client = self
            .refresher
            .as_ref()
            .ok_or(AuthError::SessionExpired)?;

        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        match client.refresh(&refresh_token).await {
            RefreshOutcome::Rotated(pair) => Ok(pair),
            other => Err(other.into_error().unwrap_or(AuthError::RefreshIncomplete)),
        }
    }

    async fn propose_rotation(&self, update: CredentialUpdate) {
        if update.is_empty() {
            return;
        }
        let mut guard = self.credentials.write().await;
        match guard.as_mut() {
            Some(current) => {
                current.apply(&update);
                self.rotation_count.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("Applied rotated credentials");
            }
            None => tracing::debug!("Ignoring rotation for signed-out session"),
        }
    }

    async fn sign_out(&self) {
        *self.credentials.write().await = None;
        self.sign_out_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Session signed out");
    }
}

/// Create a shared in-memory session store.
pub fn create_memory_session_store(credentials: Option<CredentialPair>) -> SharedSessionStore {
    match credentials {
        Some(c) => Arc::new(InMemorySessionStore::with_credentials(c)),
        None => Arc::new(InMemorySessionStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamBase;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_propose_rotation_merges() {
        let store = InMemorySessionStore::with_credentials(CredentialPair::new("a1", "r1"));
        store
            .propose_rotation(CredentialUpdate {
                access_token: Some("a2".into()),
                refresh_token: None,
            })
            .await;

        let current = store.current_credentials().await.unwrap();
        assert_eq!(current, CredentialPair::new("a2", "r1"));
        assert_eq!(store.rotation_count(), 1);
    }

    #[tokio::test]
    async fn test_rotation_after_sign_out_is_ignored() {
        let store = InMemorySessionStore::with_credentials(CredentialPair::new("a1", "r1"));
        store.sign_out().await;
        store
            .propose_rotation(CredentialPair::new("a2", "r2").into())
            .await;

        assert!(store.current_credentials().await.is_none());
        assert_eq!(store.rotation_count(), 0);
        assert_eq!(store.sign_out_count(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_without_client_is_session_expired() {
        let store = InMemorySessionStore::with_credentials(CredentialPair::new("a1", "r1"));
        assert!(matches!(
            store.force_refresh().await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_force_refresh_does_not_store() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a2",
                "refresh_token": "r2"
            })))
            .mount(&server)
            .await;

        let base = UpstreamBase::parse(&server.uri()).unwrap();
        let store = InMemorySessionStore::with_credentials(CredentialPair::new("a1", "r1"))
            .with_refresh_client(RefreshClient::new(reqwest::Client::new(), &base));

        let fresh = store.force_refresh().await.unwrap();
        assert_eq!(fresh, CredentialPair::new("a2", "r2"));
        assert_eq!(
            store.current_credentials().await.unwrap(),
            CredentialPair::new("a1", "r1")
        );
        assert_eq!(store.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_store_refresher_maps_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let base = UpstreamBase::parse(&server.uri()).unwrap();
        let store = InMemorySessionStore::with_credentials(CredentialPair::new("a1", "r1"))
            .with_refresh_client(RefreshClient::new(reqwest::Client::new(), &base));

        let outcome = StoreRefresher(&store).refresh("ignored").await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Failed(RefreshFailure::Rejected { status })
                if status == StatusCode::UNAUTHORIZED
        ));
    }
}
