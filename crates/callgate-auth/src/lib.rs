//! Bearer credential refresh protocol for the callgate BFF gateway.
//!
//! Attaches access tokens to upstream calls and, when upstream answers 401,
//! refreshes once and retries once. Shared by the server-side proxy and the
//! direct client wrapper.
//!
//! # Components
//!
//! - [`credentials`]: credential pairs and rotation proposals
//! - [`upstream`]: validated base URL and target URL construction
//! - [`refresh`]: refresh endpoint client and outcome taxonomy
//! - [`orchestrator`]: the single-retry state machine
//! - [`session`]: session store trait and in-memory store
//! - [`claims`]: typed access-token claims

pub mod claims;
pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod refresh;
pub mod session;
pub mod upstream;

pub use claims::{Role, TokenClaims, access_token_expires_at, decode_claims, now_ms};
pub use credentials::{CredentialPair, CredentialUpdate};
pub use error::{AuthError, Result};
pub use orchestrator::{Exchange, ExchangeOutcome, Upstream, orchestrate};
pub use refresh::{
    DEFAULT_REFRESH_PATH, RefreshBodyKey, RefreshClient, RefreshFailure, RefreshOutcome, Refresher,
};
pub use session::{
    InMemorySessionStore, SessionStore, SharedSessionStore, StoreRefresher,
    create_memory_session_store,
};
pub use upstream::UpstreamBase;
