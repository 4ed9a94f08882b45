//! HTTP API module.
//!
//! Auth relay endpoints plus the authenticated resource proxy.

mod error;
mod handlers;
mod proxy;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorEnvelope, X_ERROR};
pub use handlers::{HealthResponse, SessionResponse, TestTokenResponse};
pub use proxy::{MAX_BODY_BYTES, ResourceRoute};
pub use routes::create_router;
pub use state::{AppState, CookieSettings};
