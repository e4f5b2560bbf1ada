//! Backend-for-frontend proxy for the callgate gateway.
//!
//! Sits between the browser and the upstream API. The browser holds only
//! an opaque session cookie; the gateway keeps the bearer credentials,
//! attaches them to proxied calls, and refreshes them once when upstream
//! answers 401.
//!
//! # Routes
//!
//! - `GET /health`
//! - `/api/bff/{*path}`: any of GET, HEAD, POST, PATCH, PUT, DELETE, OPTIONS
//! - `POST /api/session/login`, `POST /api/session/logout`, `GET /api/session`

pub mod config;
pub mod cookie;
pub mod error;
pub mod forward;
pub mod middleware;
pub mod registry;
pub mod routes;
pub mod state;

pub use config::{CookieSettings, ProxyConfig};
pub use error::{ErrorResponse, ProxyError, Result};
pub use forward::{
    REFRESHED_ACCESS_TOKEN_HEADER, REFRESHED_REFRESH_TOKEN_HEADER, RESPONSE_HEADER_ALLOW_LIST,
    SESSION_EXPIRED_HEADER,
};
pub use middleware::{ActiveSession, MaybeSession, request_logging_middleware, session_layer};
pub use registry::{
    InMemorySessionRegistry, SessionRecord, SessionRegistry, SessionUser, SharedSessionRegistry,
};
pub use state::AppState;

use std::net::SocketAddr;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// The callgate proxy server.
pub struct ProxyServer {
    state: AppState,
}

impl ProxyServer {
    /// Create a server with an in-memory session registry.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        Ok(Self {
            state: AppState::new(config)?,
        })
    }

    /// Create a server backed by the given session registry.
    pub fn with_sessions(config: ProxyConfig, sessions: SharedSessionRegistry) -> Result<Self> {
        Ok(Self {
            state: AppState::with_sessions(config, sessions)?,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let bff = get(routes::bff_handler)
            .post(routes::bff_handler)
            .patch(routes::bff_handler)
            .put(routes::bff_handler)
            .delete(routes::bff_handler)
            .options(routes::bff_handler)
            .layer(DefaultBodyLimit::max(state.config.max_body_bytes));

        let api = Router::new()
            .route("/api/bff/{*path}", bff)
            .route("/api/session/login", post(routes::login_handler))
            .route("/api/session/logout", post(routes::logout_handler))
            .route("/api/session", get(routes::session_handler))
            .layer(axum_middleware::from_fn_with_state(
                state.clone(),
                middleware::session_layer,
            ));

        let mut router = Router::new()
            .merge(routes::health_routes())
            .merge(api)
            .layer(axum_middleware::from_fn_with_state(
                state.clone(),
                middleware::request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http());

        if state.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .expose_headers(Any),
            );
        }

        router.with_state(state)
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_addr
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_address()).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            upstream = %self.state.config.upstream,
            "Starting callgate proxy"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use callgate_auth::UpstreamBase;
    use tower::ServiceExt;

    fn server() -> ProxyServer {
        let config = ProxyConfig::new(UpstreamBase::parse("http://127.0.0.1:9").unwrap())
            .with_request_logging(false);
        ProxyServer::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_server_health_endpoint() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_session_without_cookie_is_unauthorized() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bff_rejects_unsupported_method() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .method("TRACE")
                    .uri("/api/bff/items")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_run_returns_after_shutdown() {
        let mut config = ProxyConfig::new(UpstreamBase::parse("http://127.0.0.1:9").unwrap());
        config.bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = ProxyServer::new(config).unwrap();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            server.run_with_shutdown(async {}),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
    }
}
