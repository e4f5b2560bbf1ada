//! Server-side session registry.
//!
//! Maps the opaque session id carried in the browser cookie to the
//! credential pair and user identity for that login. Credentials never
//! leave the server; the browser only ever holds the id.
//!
//! Every session ends `max_age` after login. Sessions created without
//! remember-me also end after `idle_timeout` without a lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callgate_auth::claims::DEFAULT_ACCESS_TOKEN_TTL_MS;
use callgate_auth::{
    CredentialPair, CredentialUpdate, Role, TokenClaims, access_token_expires_at, decode_claims,
    now_ms,
};
use callgate_config::defaults;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Option<Role>,
}

impl From<&TokenClaims> for SessionUser {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            id: claims.sub.clone(),
            name: claims.name.clone().unwrap_or_default(),
            email: claims.email.clone().unwrap_or_default(),
            role: claims.role,
        }
    }
}

/// One login session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub credentials: CredentialPair,
    pub user: SessionUser,
    /// Access-token expiry in epoch milliseconds.
    pub access_token_expires: u64,
    /// Whether the cookie outlives the browser session.
    pub persistent: bool,
    pub created_at: DateTime<Utc>,
    /// Last successful lookup.
    pub last_seen: DateTime<Utc>,
}

impl SessionRecord {
    /// Build a record from freshly issued credentials and their claims.
    pub fn new(credentials: CredentialPair, claims: &TokenClaims, persistent: bool) -> Self {
        let now = Utc::now();
        Self {
            user: SessionUser::from(claims),
            access_token_expires: access_token_expires_at(claims, now_ms()),
            credentials,
            persistent,
            created_at: now,
            last_seen: now,
        }
    }

    /// Whether the session has outlived `max_age`, or `idle_timeout` when
    /// it is not persistent.
    pub fn is_expired(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
        idle_timeout: Duration,
    ) -> bool {
        let elapsed = |since: DateTime<Utc>| (now - since).to_std().unwrap_or_default();
        elapsed(self.created_at) >= max_age
            || (!self.persistent && elapsed(self.last_seen) >= idle_timeout)
    }

    /// Merge rotated credentials, recomputing the access-token expiry.
    pub fn apply(&mut self, update: &CredentialUpdate) {
        self.credentials.apply(update);
        if let Some(access) = &update.access_token {
            self.access_token_expires = match decode_claims(access) {
                Ok(claims) => access_token_expires_at(&claims, now_ms()),
                Err(_) => now_ms() + DEFAULT_ACCESS_TOKEN_TTL_MS,
            };
        }
    }
}

/// Storage for login sessions.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Store a new session and return its id.
    async fn create(&self, record: SessionRecord) -> String;

    /// Look up a live session, marking it as used.
    ///
    /// Expired sessions are removed and reported as absent.
    async fn get(&self, id: &str) -> Option<SessionRecord>;

    /// Merge rotated credentials. Returns `false` if the session is gone.
    async fn propose(&self, id: &str, update: CredentialUpdate) -> bool;

    /// Remove a session. Returns `false` if it did not exist.
    async fn revoke(&self, id: &str) -> bool;

    /// Remove a session whose refresh token was rejected.
    ///
    /// Only removes it while the stored refresh token is still
    /// `refresh_token`; a session rotated by a concurrent request stays.
    async fn expire(&self, id: &str, refresh_token: &str) -> bool;

    /// Number of live sessions.
    async fn len(&self) -> usize;
}

/// Shared session registry.
pub type SharedSessionRegistry = Arc<dyn SessionRegistry>;

/// Session registry held in process memory.
#[derive(Debug)]
pub struct InMemorySessionRegistry {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    max_age: Duration,
    idle_timeout: Duration,
}

impl Default for InMemorySessionRegistry {
    fn default() -> Self {
        Self::with_lifetimes(
            Duration::from_secs(defaults::SESSION_MAX_AGE_SECS),
            Duration::from_secs(defaults::SESSION_IDLE_TIMEOUT_SECS),
        )
    }
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with explicit absolute and idle session lifetimes.
    pub fn with_lifetimes(max_age: Duration, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_age,
            idle_timeout,
        }
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired(now, self.max_age, self.idle_timeout));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "Swept expired sessions");
        }
        removed
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn create(&self, record: SessionRecord) -> String {
        self.sweep().await;
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session_id = %id, user = %record.user.id, "Session created");
        self.sessions.write().await.insert(id.clone(), record);
        id
    }

    async fn get(&self, id: &str) -> Option<SessionRecord> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let record = sessions.get_mut(id)?;
        if record.is_expired(now, self.max_age, self.idle_timeout) {
            sessions.remove(id);
            tracing::info!(session_id = %id, "Session expired");
            return None;
        }
        record.last_seen = now;
        Some(record.clone())
    }

    async fn propose(&self, id: &str, update: CredentialUpdate) -> bool {
        if update.is_empty() {
            return self.sessions.read().await.contains_key(id);
        }
        match self.sessions.write().await.get_mut(id) {
            Some(record) => {
                record.apply(&update);
                tracing::debug!(session_id = %id, "Stored rotated credentials");
                true
            }
            None => {
                tracing::debug!(session_id = %id, "Ignoring rotation for revoked session");
                false
            }
        }
    }

    async fn revoke(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Session revoked");
        }
        removed
    }

    async fn expire(&self, id: &str, refresh_token: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(record) if record.credentials.refresh_token == refresh_token => {
                sessions.remove(id);
                tracing::info!(session_id = %id, "Session expired by upstream");
                true
            }
            Some(_) => {
                tracing::debug!(session_id = %id, "Ignoring expiry for rotated session");
                false
            }
            None => false,
        }
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
