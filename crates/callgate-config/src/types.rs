//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [upstream]   # backend API the gateway fronts
//! [server]     # listener settings
//! [session]    # browser session cookie
//! [logging]    # log file settings
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Environment variable overriding `upstream.base_url`.
pub const API_BASE_ENV: &str = "CALLGATE_API_BASE";
/// Environment variable overriding `server.bind`.
pub const BIND_ENV: &str = "CALLGATE_BIND";
/// Environment variable overriding `server.port`.
pub const PORT_ENV: &str = "CALLGATE_PORT";

pub mod defaults {
    pub const REFRESH_PATH: &str = "/auth/refresh";
    pub const LOGIN_PATH: &str = "/auth/login";
    pub const TIMEOUT_SECS: u64 = 30;
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const BIND: &str = "127.0.0.1";
    pub const PORT: u16 = 3001;
    pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
    pub const COOKIE_NAME: &str = "callgate_session";
    pub const SESSION_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;
    pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 24 * 60 * 60;
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so partial configs can be layered and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallgateConfig {
    pub upstream: Option<UpstreamConfig>,
    pub server: Option<ServerConfig>,
    pub session: Option<SessionConfig>,
    pub logging: Option<LoggingConfig>,
}

impl CallgateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: CallgateConfig) {
        if other.upstream.is_some() {
            self.upstream = other.upstream;
        }
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Apply `CALLGATE_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(API_BASE_ENV).filter(|v| !v.is_empty()) {
            self.upstream.get_or_insert_with(UpstreamConfig::default).base_url = Some(base);
        }
        if let Some(bind) = lookup(BIND_ENV).filter(|v| !v.is_empty()) {
            self.server.get_or_insert_with(ServerConfig::default).bind = bind;
        }
        if let Some(port) = lookup(PORT_ENV).filter(|v| !v.is_empty()) {
            let port = port.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                field: PORT_ENV.to_string(),
                message: e.to_string(),
            })?;
            self.server.get_or_insert_with(ServerConfig::default).port = port;
        }
        Ok(())
    }

    /// Upstream settings, or defaults.
    pub fn upstream(&self) -> UpstreamConfig {
        self.upstream.clone().unwrap_or_default()
    }

    /// Server settings, or defaults.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Session settings, or defaults.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Logging settings, or defaults.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check that the config is usable for serving.
    pub fn validate(&self) -> Result<()> {
        let upstream = self.upstream();
        let base = upstream
            .base_url
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "upstream.base_url".to_string(),
                hint: format!("set it in callgate.toml or via {}", API_BASE_ENV),
            })?;
        validate_base_url(base)?;

        for (field, path) in [
            ("upstream.refresh_path", &upstream.refresh_path),
            ("upstream.login_path", &upstream.login_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("'{}' must start with '/'", path),
                });
            }
        }

        if upstream.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upstream.timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if upstream.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upstream.connect_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let server = self.server();
        if server.max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_body_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if format!("{}:{}", server.bind, server.port)
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::InvalidValue {
                field: "server.bind".to_string(),
                message: format!("'{}' is not an IP address", server.bind),
            });
        }

        let session = self.session();
        if session.cookie_name.is_empty()
            || !session
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidValue {
                field: "session.cookie_name".to_string(),
                message: format!(
                    "'{}' must be non-empty and contain only letters, digits, '_' or '-'",
                    session.cookie_name
                ),
            });
        }
        for (field, secs) in [
            ("session.max_age_secs", session.max_age_secs),
            ("session.idle_timeout_secs", session.idle_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Check that a base URL is absolute http(s).
pub fn validate_base_url(base: &str) -> Result<()> {
    let parsed = url::Url::parse(base.trim()).map_err(|e| ConfigError::InvalidValue {
        field: "upstream.base_url".to_string(),
        message: format!("'{}' is not an absolute URL: {}", base, e),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            field: "upstream.base_url".to_string(),
            message: format!("scheme '{}' is not http or https", parsed.scheme()),
        });
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstream Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Which JSON key the refresh endpoint expects for the refresh token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshKeyStyle {
    /// `refresh_token`
    #[default]
    Snake,
    /// `refreshToken`
    Camel,
}

/// Upstream API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Absolute base URL of the backend API.
    pub base_url: Option<String>,
    /// Refresh endpoint path.
    pub refresh_path: String,
    /// Login endpoint path.
    pub login_path: String,
    /// Refresh request body key.
    pub refresh_body_key: RefreshKeyStyle,
    /// Longest pause between reads of an upstream response.
    ///
    /// Applies per read, so long streamed downloads are not cut off.
    pub timeout_secs: u64,
    /// Connect timeout for upstream calls.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            refresh_path: defaults::REFRESH_PATH.to_string(),
            login_path: defaults::LOGIN_PATH.to_string(),
            refresh_body_key: RefreshKeyStyle::default(),
            timeout_secs: defaults::TIMEOUT_SECS,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Largest request body accepted for forwarding.
    pub max_body_bytes: usize,
    /// Allow cross-origin requests.
    pub enable_cors: bool,
    /// Log every request.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::BIND.to_string(),
            port: defaults::PORT,
            max_body_bytes: defaults::MAX_BODY_BYTES,
            enable_cors: false,
            request_logging: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Browser session cookie settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the opaque session cookie.
    pub cookie_name: String,
    /// Absolute session lifetime, also the cookie `Max-Age` when the
    /// user asks to be remembered.
    pub max_age_secs: u64,
    /// Sessions that are not remembered end after this long unused.
    pub idle_timeout_secs: u64,
    /// Add the `Secure` attribute.
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: defaults::COOKIE_NAME.to_string(),
            max_age_secs: defaults::SESSION_MAX_AGE_SECS,
            idle_timeout_secs: defaults::SESSION_IDLE_TIMEOUT_SECS,
            secure_cookie: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Log file settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write JSON logs to rolling files.
    pub file: bool,
    /// Directory for log files (defaults to `<config dir>/logs`).
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: true,
            directory: None,
        }
    }
}
