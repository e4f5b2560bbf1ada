//! Proxy configuration.

use std::net::SocketAddr;
use std::time::Duration;

use callgate_auth::{DEFAULT_REFRESH_PATH, RefreshBodyKey, UpstreamBase};
use callgate_config::{CallgateConfig, RefreshKeyStyle, defaults};

use crate::error::{ProxyError, Result};

/// Session cookie attributes.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    /// Absolute session lifetime, sent as `Max-Age` when the user asks to
    /// be remembered.
    pub max_age_secs: u64,
    /// Idle lifetime of sessions that are not remembered.
    pub idle_timeout_secs: u64,
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: defaults::COOKIE_NAME.to_string(),
            max_age_secs: defaults::SESSION_MAX_AGE_SECS,
            idle_timeout_secs: defaults::SESSION_IDLE_TIMEOUT_SECS,
            secure: false,
        }
    }
}

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    pub upstream: UpstreamBase,
    pub refresh_path: String,
    pub login_path: String,
    pub refresh_body_key: RefreshBodyKey,
    /// Longest pause between reads of an upstream response.
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_body_bytes: usize,
    pub enable_cors: bool,
    pub request_logging: bool,
    pub cookie: CookieSettings,
}

impl ProxyConfig {
    /// Defaults for everything except the upstream.
    pub fn new(upstream: UpstreamBase) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], defaults::PORT)),
            upstream,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_path: defaults::LOGIN_PATH.to_string(),
            refresh_body_key: RefreshBodyKey::default(),
            read_timeout: Duration::from_secs(defaults::TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            max_body_bytes: defaults::MAX_BODY_BYTES,
            enable_cors: false,
            request_logging: true,
            cookie: CookieSettings::default(),
        }
    }

    /// Build from a validated [`CallgateConfig`].
    pub fn from_config(config: &CallgateConfig) -> Result<Self> {
        config.validate()?;

        let upstream_cfg = config.upstream();
        let server = config.server();
        let session = config.session();

        let base = upstream_cfg
            .base_url
            .as_deref()
            .ok_or_else(|| ProxyError::Config("upstream.base_url is not set".to_string()))?;
        let upstream = UpstreamBase::parse(base)?;

        let bind_addr: SocketAddr = format!("{}:{}", server.bind, server.port)
            .parse()
            .map_err(|e| ProxyError::Config(format!("Invalid bind address: {}", e)))?;

        Ok(Self {
            bind_addr,
            upstream,
            refresh_path: upstream_cfg.refresh_path.clone(),
            login_path: upstream_cfg.login_path.clone(),
            refresh_body_key: match upstream_cfg.refresh_body_key {
                RefreshKeyStyle::Snake => RefreshBodyKey::Snake,
                RefreshKeyStyle::Camel => RefreshBodyKey::Camel,
            },
            read_timeout: upstream_cfg.timeout(),
            connect_timeout: upstream_cfg.connect_timeout(),
            max_body_bytes: server.max_body_bytes,
            enable_cors: server.enable_cors,
            request_logging: server.request_logging,
            cookie: CookieSettings {
                name: session.cookie_name,
                max_age_secs: session.max_age_secs,
                idle_timeout_secs: session.idle_timeout_secs,
                secure: session.secure_cookie,
            },
        })
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn with_request_logging(mut self, enable: bool) -> Self {
        self.request_logging = enable;
        self
    }

    /// Absolute URL of the login endpoint.
    pub fn login_url(&self) -> String {
        self.upstream.endpoint(&self.login_path)
    }
}
