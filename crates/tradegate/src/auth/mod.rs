//! Authentication module.
//!
//! Provides session credential extraction and HS256 token verification:
//! - `Authorization: Bearer <token>` header or session cookie
//! - expiry and signature checks against the shared backend secret

mod claims;
mod config;
mod credential;
mod error;
mod verifier;

pub use claims::Claims;
pub use config::{AuthConfig, ConfigValidationError, INSECURE_DEFAULT_SECRET};
pub use credential::{
    Credential, CredentialSource, bearer_token_from_header, token_from_cookie_header,
};
pub use error::AuthError;
pub use verifier::{Rejection, TokenVerifier, Verification};
