//! HTTP routes.

pub mod bff;
pub mod health;
pub mod session;

pub use bff::{BFF_PREFIX, bff_handler};
pub use health::{HealthResponse, health, health_routes};
pub use session::{
    LoginRequest, SessionResponse, login_handler, logout_handler, session_handler,
};
