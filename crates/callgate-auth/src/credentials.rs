//! Access/refresh credential pairs and rotation proposals.

use serde::{Deserialize, Serialize};

/// An access token and the refresh token that can renew it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// The access token, if non-empty.
    pub fn access(&self) -> Option<&str> {
        Some(self.access_token.as_str()).filter(|t| !t.is_empty())
    }

    /// The refresh token, if non-empty.
    pub fn refresh(&self) -> Option<&str> {
        Some(self.refresh_token.as_str()).filter(|t| !t.is_empty())
    }

    /// Apply a rotation proposal, keeping fields the proposal leaves out.
    pub fn apply(&mut self, update: &CredentialUpdate) {
        if let Some(access) = update.access_token.as_deref().filter(|t| !t.is_empty()) {
            self.access_token = access.to_string();
        }
        if let Some(refresh) = update.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            self.refresh_token = refresh.to_string();
        }
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .finish()
    }
}

/// Replacement credentials proposed to the owner of the session.
///
/// Either field may be absent; the store decides how to merge.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl CredentialUpdate {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl From<CredentialPair> for CredentialUpdate {
    fn from(pair: CredentialPair) -> Self {
        Self {
            access_token: Some(pair.access_token),
            refresh_token: Some(pair.refresh_token),
        }
    }
}

impl std::fmt::Debug for CredentialUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialUpdate")
            .field("access_token", &self.access_token.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}
