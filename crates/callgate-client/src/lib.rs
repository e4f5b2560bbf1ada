//! HTTP clients for upstream APIs fronted by callgate.
//!
//! - [`ApiClient`] calls the upstream directly, runs the single-retry
//!   refresh protocol itself and signs the injected session store out when
//!   the session dies.
//! - [`BffClient`] calls through the gateway's `/api/bff` route and applies
//!   the rotation and session-expired headers the gateway returns.
//!
//! Both report a dead session as [`Error::SessionExpired`], code
//! `SESSION_EXPIRED`.

pub mod api;
pub mod bff;
pub mod error;
mod response;

pub use api::{ApiClient, ApiClientBuilder, RequestOptions};
pub use bff::BffClient;
pub use error::{Error, REQUEST_FAILED, Result, SESSION_EXPIRED};
