//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use callgate_auth::{RefreshClient, UpstreamBase};

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::registry::{InMemorySessionRegistry, SharedSessionRegistry};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Proxy configuration.
    pub config: Arc<ProxyConfig>,

    /// HTTP client for all upstream calls.
    pub http: reqwest::Client,

    /// Refresh endpoint client.
    pub refresher: Arc<RefreshClient>,

    /// Login sessions keyed by cookie id.
    pub sessions: SharedSessionRegistry,
}

impl AppState {
    /// Create state with an in-memory session registry.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let sessions = InMemorySessionRegistry::with_lifetimes(
            Duration::from_secs(config.cookie.max_age_secs),
            Duration::from_secs(config.cookie.idle_timeout_secs),
        );
        Self::with_sessions(config, Arc::new(sessions))
    }

    /// Create state with the given session registry.
    pub fn with_sessions(config: ProxyConfig, sessions: SharedSessionRegistry) -> Result<Self> {
        let http = reqwest::Client::builder()
            .read_timeout(config.read_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let refresher = RefreshClient::new(http.clone(), &config.upstream)
            .with_path(&config.upstream, &config.refresh_path)
            .with_body_key(config.refresh_body_key);

        Ok(Self {
            config: Arc::new(config),
            http,
            refresher: Arc::new(refresher),
            sessions,
        })
    }

    pub fn upstream(&self) -> &UpstreamBase {
        &self.config.upstream
    }
}
